//! Memoized, capacity-bounded bitmap decode cache.
//!
//! Pairs an id-to-bitmap map with the [`RecencyIndex`]; the two form
//! one logical unit and every mutation keeps them in step. Eviction and
//! insertion happen together within a single call, so the store never
//! holds more than `capacity` decoded bitmaps.

use std::collections::HashMap;
use std::rc::Rc;

use crate::recency::RecencyIndex;
use crate::types::{Bitmap, CacheError, RecordId};

/// Capacity-bounded cache of decoded bitmaps with LRU eviction.
///
/// Bitmaps are handed out as [`Rc`] so the caller can hold the current
/// record and a neighbor at the same time while differencing; the store
/// drops its own strong reference on eviction or invalidation. The
/// store is not internally thread-safe — wrap the owning cache in an
/// external mutual-exclusion boundary for multi-threaded use.
#[derive(Debug)]
pub struct BitmapStore {
    recency: RecencyIndex,
    bitmaps: HashMap<RecordId, Rc<Bitmap>>,
}

impl BitmapStore {
    /// Create a store holding at most `capacity` decoded bitmaps.
    ///
    /// # Panics
    ///
    /// Asserts `capacity >= 1` (see [`RecencyIndex::new`]).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            recency: RecencyIndex::new(capacity),
            bitmaps: HashMap::with_capacity(capacity),
        }
    }

    /// Fetch the bitmap for `id`, decoding on a miss.
    ///
    /// A hit promotes `id` to most-recent and returns the cached
    /// bitmap; `decode` is not called. On a miss the least-recently
    /// used bitmap is evicted first when the store is full, then
    /// `decode(id)` runs — a blocking call that may perform disk I/O
    /// and runs to completion.
    ///
    /// # Errors
    ///
    /// A decode failure propagates as [`CacheError::Decode`] naming
    /// `id`. Failures are never cached: the next call for the same id
    /// retries the decode.
    pub fn get_or_load<F>(&mut self, id: RecordId, decode: F) -> Result<Rc<Bitmap>, CacheError>
    where
        F: FnOnce(RecordId) -> Result<Bitmap, Box<dyn std::error::Error + Send + Sync>>,
    {
        if let Some(bitmap) = self.bitmaps.get(&id) {
            let bitmap = Rc::clone(bitmap);
            self.recency.set_most_recent(id);
            return Ok(bitmap);
        }

        // Evict before decoding so a failed decode leaves the store no
        // fuller than before and a successful one fits without the
        // recency index displacing anything on its own.
        if self.recency.is_full() {
            if let Some(lru) = self.recency.least_recent() {
                self.bitmaps.remove(&lru);
                self.recency.remove(lru);
            }
        }

        let bitmap = decode(id).map_err(|source| CacheError::Decode { id, source })?;
        let bitmap = Rc::new(bitmap);
        self.bitmaps.insert(id, Rc::clone(&bitmap));
        self.recency.set_most_recent(id);
        Ok(bitmap)
    }

    /// Drop the cached bitmap and recency entry for `id`; returns
    /// whether anything existed.
    ///
    /// Used when the caller knows the underlying content for `id`
    /// changed on disk.
    pub fn invalidate(&mut self, id: RecordId) -> bool {
        let existed = self.bitmaps.remove(&id).is_some();
        self.recency.remove(id);
        existed
    }

    /// `true` when a bitmap for `id` is currently cached.
    #[must_use]
    pub fn contains(&self, id: RecordId) -> bool {
        self.bitmaps.contains_key(&id)
    }

    /// Number of cached bitmaps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bitmaps.len()
    }

    /// `true` when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bitmaps.is_empty()
    }

    /// Maximum number of simultaneously cached bitmaps.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.recency.capacity()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::types::PixelFormat;

    fn id(value: u64) -> RecordId {
        RecordId::new(value)
    }

    /// Decode callback that counts invocations and yields a 1x1 bitmap
    /// whose red channel encodes the record id.
    fn counting_decoder(
        calls: &Cell<usize>,
    ) -> impl Fn(RecordId) -> Result<Bitmap, Box<dyn std::error::Error + Send + Sync>> + '_ {
        move |record| {
            calls.set(calls.get() + 1);
            #[allow(clippy::cast_possible_truncation)]
            let red = (record.value() & 0xFF) as u8;
            Ok(Bitmap::solid(1, 1, PixelFormat::RGBA8, [red, 0, 0]))
        }
    }

    #[test]
    fn miss_decodes_then_hit_does_not() {
        let calls = Cell::new(0);
        let mut store = BitmapStore::new(2);

        let first = store.get_or_load(id(1), counting_decoder(&calls)).unwrap();
        assert_eq!(calls.get(), 1);

        let second = store.get_or_load(id(1), counting_decoder(&calls)).unwrap();
        assert_eq!(calls.get(), 1, "cached id must not decode again");
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn one_decode_per_distinct_miss() {
        let calls = Cell::new(0);
        let mut store = BitmapStore::new(4);
        for k in 1..=4 {
            store.get_or_load(id(k), counting_decoder(&calls)).unwrap();
        }
        assert_eq!(calls.get(), 4);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn eviction_frees_least_recently_used() {
        let calls = Cell::new(0);
        let mut store = BitmapStore::new(2);
        store.get_or_load(id(1), counting_decoder(&calls)).unwrap();
        store.get_or_load(id(2), counting_decoder(&calls)).unwrap();

        // Touch 1 so that 2 becomes least recent.
        store.get_or_load(id(1), counting_decoder(&calls)).unwrap();
        store.get_or_load(id(3), counting_decoder(&calls)).unwrap();

        assert!(store.contains(id(1)));
        assert!(!store.contains(id(2)));
        assert!(store.contains(id(3)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn exactly_one_eviction_per_insertion_when_full() {
        let calls = Cell::new(0);
        let mut store = BitmapStore::new(3);
        for k in 1..=10 {
            store.get_or_load(id(k), counting_decoder(&calls)).unwrap();
            assert!(store.len() <= 3);
        }
        assert_eq!(store.len(), 3);
        assert_eq!(calls.get(), 10);
    }

    #[test]
    fn decode_failure_propagates_and_is_not_cached() {
        let mut store = BitmapStore::new(2);
        let result = store.get_or_load(id(7), |_| Err("corrupt frame".into()));
        assert!(
            matches!(result, Err(CacheError::Decode { id: failed, .. }) if failed == id(7)),
            "expected decode error naming record 7",
        );
        assert!(!store.contains(id(7)));

        // The next access retries and can succeed.
        let calls = Cell::new(0);
        store.get_or_load(id(7), counting_decoder(&calls)).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(store.contains(id(7)));
    }

    #[test]
    fn decode_failure_does_not_shrink_below_prior_contents() {
        let calls = Cell::new(0);
        let mut store = BitmapStore::new(2);
        store.get_or_load(id(1), counting_decoder(&calls)).unwrap();

        let _ = store.get_or_load(id(2), |_| Err("unreadable".into()));
        assert!(store.contains(id(1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn invalidate_forces_redecode() {
        let calls = Cell::new(0);
        let mut store = BitmapStore::new(2);
        store.get_or_load(id(5), counting_decoder(&calls)).unwrap();
        assert!(store.invalidate(id(5)));
        assert!(!store.invalidate(id(5)));

        store.get_or_load(id(5), counting_decoder(&calls)).unwrap();
        assert_eq!(calls.get(), 2, "invalidated id must decode again");
    }

    #[test]
    fn evicted_bitmap_survives_through_existing_rc() {
        let calls = Cell::new(0);
        let mut store = BitmapStore::new(1);
        let held = store.get_or_load(id(1), counting_decoder(&calls)).unwrap();
        store.get_or_load(id(2), counting_decoder(&calls)).unwrap();

        assert!(!store.contains(id(1)));
        // The caller's handle stays valid even though the slot was freed.
        assert_eq!(held.data()[0], 1);
    }
}
