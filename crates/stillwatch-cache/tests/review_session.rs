//! Integration test: drive a full review session over a synthetic
//! three-record capture sequence, exercising positioning, both
//! difference cycles, dark-frame classification, and invalidation
//! through the public API only.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use stillwatch_cache::{
    Bitmap, CacheConfig, DiffOutcome, DifferenceState, ImageCache, PixelFormat, RecordId,
    VecSequence,
};

/// Build a decode callback over a fixed frame table, counting calls.
fn table_decoder(
    frames: HashMap<RecordId, Bitmap>,
    calls: Rc<Cell<usize>>,
) -> impl FnMut(RecordId) -> Result<Bitmap, Box<dyn std::error::Error + Send + Sync>> {
    move |id| {
        calls.set(calls.get() + 1);
        frames
            .get(&id)
            .cloned()
            .ok_or_else(|| format!("no frame for record {id}").into())
    }
}

fn solid(rgb: [u8; 3]) -> Bitmap {
    Bitmap::solid(40, 30, PixelFormat::RGBA8, rgb)
}

#[test]
fn combined_cycle_over_a_three_record_selection() {
    // Selection [A, B, C], all displayable, positioned at B.
    let (a, b, c) = (RecordId::new(1), RecordId::new(2), RecordId::new(3));
    let frames = HashMap::from([
        (a, solid([10, 10, 10])),
        (b, solid([200, 180, 60])),
        (c, solid([12, 12, 12])),
    ]);
    let calls = Rc::new(Cell::new(0));
    let sequence = VecSequence::new(vec![a, b, c]);
    let decoder = table_decoder(frames, Rc::clone(&calls));

    let mut cache = ImageCache::new(sequence, decoder, CacheConfig::default()).unwrap();
    cache.move_to(1).unwrap();
    assert_eq!(cache.current_record(), Some(b));

    // One combined gesture lands in Combined mode; with matching
    // dimensions the calculation succeeds.
    assert_eq!(cache.advance_combined(), DifferenceState::Combined);
    let threshold = cache.config().combined_threshold;
    assert_eq!(
        cache.try_calculate_combined_difference(threshold),
        DiffOutcome::Success
    );

    // B differs strongly from both dark neighbors, so the highlight is
    // nonzero and monochrome.
    let highlight = cache.difference().expect("combined result must be cached");
    let format = highlight.format();
    let px = &highlight.data()[..format.bytes_per_pixel];
    assert!(px[format.red] > 0);
    assert_eq!(px[format.red], px[format.green]);
    assert_eq!(px[format.green], px[format.blue]);

    // A second gesture returns to the unaltered view.
    assert_eq!(cache.advance_combined(), DifferenceState::Unaltered);
    assert_eq!(cache.display_bitmap().unwrap(), cache.unaltered().unwrap());
}

#[test]
fn combined_difference_with_mismatched_neighbor_is_not_calculable() {
    let (a, b, c) = (RecordId::new(1), RecordId::new(2), RecordId::new(3));
    let frames = HashMap::from([
        (a, solid([10, 10, 10])),
        (b, solid([200, 180, 60])),
        // C was captured at a different resolution.
        (c, Bitmap::solid(64, 48, PixelFormat::RGBA8, [12, 12, 12])),
    ]);
    let calls = Rc::new(Cell::new(0));
    let mut cache = ImageCache::new(
        VecSequence::new(vec![a, b, c]),
        table_decoder(frames, calls),
        CacheConfig::default(),
    )
    .unwrap();
    cache.move_to(1).unwrap();

    cache.advance_combined();
    assert_eq!(
        cache.try_calculate_combined_difference(38),
        DiffOutcome::NotCalculable
    );
    // The display layer falls back to the unaltered frame.
    assert_eq!(cache.display_bitmap().unwrap(), cache.unaltered().unwrap());
}

#[test]
fn stepping_a_long_sequence_stays_within_capacity() {
    let ids: Vec<RecordId> = (0..30).map(RecordId::new).collect();
    let frames: HashMap<RecordId, Bitmap> = ids
        .iter()
        .map(|&id| {
            #[allow(clippy::cast_possible_truncation)]
            let shade = (id.value() * 8 % 256) as u8;
            (id, solid([shade, shade, shade]))
        })
        .collect();
    let calls = Rc::new(Cell::new(0));
    let config = CacheConfig {
        capacity: 3,
        ..CacheConfig::default()
    };
    let mut cache = ImageCache::new(
        VecSequence::new(ids),
        table_decoder(frames, Rc::clone(&calls)),
        config,
    )
    .unwrap();

    // Walk forward computing a previous-difference at every stop.
    let mut steps = 1;
    while cache.move_next().unwrap() {
        steps += 1;
        assert_eq!(cache.advance_difference(), DifferenceState::Previous);
        assert_eq!(cache.try_calculate_difference(), DiffOutcome::Success);
    }
    assert_eq!(steps, 30);

    // Walking forward, the previous neighbor is always still cached:
    // one decode per record despite the tiny capacity.
    assert_eq!(calls.get(), 30);
}

#[test]
fn dark_frames_are_flagged_and_invalidation_rereads_them() {
    let (night, day) = (RecordId::new(1), RecordId::new(2));
    let frames = HashMap::from([(night, solid([5, 5, 5])), (day, solid([180, 140, 40]))]);
    let calls = Rc::new(Cell::new(0));
    let mut cache = ImageCache::new(
        VecSequence::new(vec![night, day]),
        table_decoder(frames, Rc::clone(&calls)),
        CacheConfig::default(),
    )
    .unwrap();

    let verdict = cache.classify_current().unwrap();
    assert!(verdict.is_dark);
    assert!(!verdict.is_color);

    cache.move_next().unwrap();
    let verdict = cache.classify_current().unwrap();
    assert!(verdict.is_color);
    assert!(!verdict.is_dark);

    // The reviewer re-exports record 2's file: invalidate and re-read.
    let before = calls.get();
    assert!(cache.try_invalidate(day).unwrap());
    assert_eq!(calls.get(), before + 1);
    assert_eq!(cache.state(), DifferenceState::Unaltered);
}
