//! The image cache: composition root wiring the bitmap store, the
//! difference state machine, and the pixel algorithms to an external
//! record positioner and decode callback.
//!
//! One cache per open dataset; all state is instance-owned. The cache
//! is not internally thread-safe — decode calls block, and concurrent
//! use requires an external mutual-exclusion boundary around the whole
//! cache.

use std::collections::HashSet;
use std::rc::Rc;

use crate::classify::{Classification, classify};
use crate::diff;
use crate::state::{DifferenceState, DifferenceStateMachine, NeighborUsability};
use crate::store::BitmapStore;
use crate::types::{Bitmap, CacheConfig, CacheError, DiffOutcome, RecordId};

/// External sequential positioner over the active selection.
///
/// The cache only reacts to position changes; ordering and selection
/// semantics belong to the implementor. Implementations also answer
/// the displayability question for records flagged corrupt or
/// unsupported by the storage layer.
pub trait RecordSequence {
    /// Number of records in the selection.
    fn len(&self) -> usize;

    /// `true` when the selection holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the currently positioned record. Meaningful only for a
    /// non-empty selection.
    fn position(&self) -> usize;

    /// The record at `index`, or `None` past either end.
    fn record_at(&self, index: usize) -> Option<RecordId>;

    /// The currently positioned record, or `None` for an empty
    /// selection.
    fn current(&self) -> Option<RecordId> {
        self.record_at(self.position())
    }

    /// Step forward; returns whether the position changed.
    fn move_next(&mut self) -> bool;

    /// Step backward; returns whether the position changed.
    fn move_previous(&mut self) -> bool;

    /// Jump to `index`; returns whether the move was possible.
    fn try_move_to(&mut self, index: usize) -> bool;

    /// Whether the record's file decoded/rendered successfully the
    /// last time the storage layer looked. Non-displayable records are
    /// skipped as difference operands.
    fn is_displayable(&self, _id: RecordId) -> bool {
        true
    }
}

/// External decode callback supplied by the storage/decoding layer.
///
/// `decode` is a blocking operation that may perform disk I/O; it runs
/// to completion with no cancellation.
pub trait BitmapDecoder {
    /// Decode the bitmap for `id`.
    ///
    /// # Errors
    ///
    /// Any decoder failure, boxed; the cache wraps it in
    /// [`CacheError::Decode`] naming the record.
    fn decode(&mut self, id: RecordId)
    -> Result<Bitmap, Box<dyn std::error::Error + Send + Sync>>;
}

impl<F> BitmapDecoder for F
where
    F: FnMut(RecordId) -> Result<Bitmap, Box<dyn std::error::Error + Send + Sync>>,
{
    fn decode(
        &mut self,
        id: RecordId,
    ) -> Result<Bitmap, Box<dyn std::error::Error + Send + Sync>> {
        self(id)
    }
}

/// In-memory [`RecordSequence`] over an ordered id list, with
/// per-record displayability flags.
///
/// Suitable for tests and for drivers that materialize their selection
/// up front (the CLI does); database-backed review tools implement
/// [`RecordSequence`] over their own row enumerator instead.
#[derive(Debug, Clone, Default)]
pub struct VecSequence {
    ids: Vec<RecordId>,
    position: usize,
    not_displayable: HashSet<RecordId>,
}

impl VecSequence {
    /// A sequence over `ids` positioned at the first record.
    #[must_use]
    pub fn new(ids: Vec<RecordId>) -> Self {
        Self {
            ids,
            position: 0,
            not_displayable: HashSet::new(),
        }
    }

    /// Flag or unflag a record as displayable.
    pub fn set_displayable(&mut self, id: RecordId, displayable: bool) {
        if displayable {
            self.not_displayable.remove(&id);
        } else {
            self.not_displayable.insert(id);
        }
    }
}

impl RecordSequence for VecSequence {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn position(&self) -> usize {
        self.position
    }

    fn record_at(&self, index: usize) -> Option<RecordId> {
        self.ids.get(index).copied()
    }

    fn move_next(&mut self) -> bool {
        if self.position + 1 < self.ids.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn move_previous(&mut self) -> bool {
        if self.position > 0 {
            self.position -= 1;
            true
        } else {
            false
        }
    }

    fn try_move_to(&mut self, index: usize) -> bool {
        if index < self.ids.len() {
            self.position = index;
            true
        } else {
            false
        }
    }

    fn is_displayable(&self, id: RecordId) -> bool {
        !self.not_displayable.contains(&id)
    }
}

/// Lazily computed difference bitmaps, keyed by difference mode.
///
/// Cleared on every position change — a cheap reset, independent of
/// store eviction.
#[derive(Debug, Default)]
struct ResultSlots {
    previous: Option<Bitmap>,
    next: Option<Bitmap>,
    combined: Option<Bitmap>,
}

impl ResultSlots {
    fn clear(&mut self) {
        self.previous = None;
        self.next = None;
        self.combined = None;
    }
}

/// Sequential image cache and differencing engine.
///
/// Wraps an external [`RecordSequence`] and [`BitmapDecoder`]; exposes
/// the composed bitmap for the current position and difference mode.
/// The unaltered slot always holds the bitmap of the currently
/// positioned record and is reloaded on every position change;
/// difference results are computed on demand and cached until the
/// position moves.
#[derive(Debug)]
pub struct ImageCache<S, D> {
    sequence: S,
    decoder: D,
    config: CacheConfig,
    store: BitmapStore,
    machine: DifferenceStateMachine,
    unaltered: Option<Rc<Bitmap>>,
    results: ResultSlots,
}

impl<S: RecordSequence, D: BitmapDecoder> ImageCache<S, D> {
    /// Build a cache over `sequence` and `decoder`, loading the
    /// bitmap for the initial position when the selection is
    /// non-empty.
    ///
    /// # Errors
    ///
    /// Propagates [`CacheError::Decode`] when the initial record fails
    /// to decode.
    ///
    /// # Panics
    ///
    /// Asserts `config.capacity >= 1`.
    pub fn new(sequence: S, decoder: D, config: CacheConfig) -> Result<Self, CacheError> {
        let store = BitmapStore::new(config.capacity);
        let mut cache = Self {
            sequence,
            decoder,
            config,
            store,
            machine: DifferenceStateMachine::new(),
            unaltered: None,
            results: ResultSlots::default(),
        };
        cache.reload_unaltered()?;
        Ok(cache)
    }

    /// The current difference mode.
    #[must_use]
    pub const fn state(&self) -> DifferenceState {
        self.machine.state()
    }

    /// The wrapped positioner.
    #[must_use]
    pub const fn sequence(&self) -> &S {
        &self.sequence
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The currently positioned record.
    #[must_use]
    pub fn current_record(&self) -> Option<RecordId> {
        self.sequence.current()
    }

    /// The unaltered bitmap of the current record, if decoded.
    #[must_use]
    pub fn unaltered(&self) -> Option<&Bitmap> {
        self.unaltered.as_deref()
    }

    /// The computed difference bitmap for the current mode, if any.
    /// Always `None` in [`DifferenceState::Unaltered`].
    #[must_use]
    pub fn difference(&self) -> Option<&Bitmap> {
        match self.machine.state() {
            DifferenceState::Unaltered => None,
            DifferenceState::Previous => self.results.previous.as_ref(),
            DifferenceState::Next => self.results.next.as_ref(),
            DifferenceState::Combined => self.results.combined.as_ref(),
        }
    }

    /// The bitmap the display layer should show: the computed
    /// difference for the current mode when available, otherwise the
    /// unaltered image.
    #[must_use]
    pub fn display_bitmap(&self) -> Option<&Bitmap> {
        self.difference().or_else(|| self.unaltered.as_deref())
    }

    /// Step to the next record; returns whether the position changed.
    ///
    /// # Errors
    ///
    /// Propagates [`CacheError::Decode`] when the new record fails to
    /// decode. The position still changes; the caller decides whether
    /// to skip onward or mark the record non-displayable.
    pub fn move_next(&mut self) -> Result<bool, CacheError> {
        if self.sequence.move_next() {
            self.on_position_changed()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Step to the previous record; returns whether the position
    /// changed.
    ///
    /// # Errors
    ///
    /// As [`move_next`](Self::move_next).
    pub fn move_previous(&mut self) -> Result<bool, CacheError> {
        if self.sequence.move_previous() {
            self.on_position_changed()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Jump to `index`; returns whether the move was possible.
    ///
    /// # Errors
    ///
    /// As [`move_next`](Self::move_next).
    pub fn move_to(&mut self, index: usize) -> Result<bool, CacheError> {
        if self.sequence.try_move_to(index) {
            self.on_position_changed()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Advance the previous/next difference cycle, skipping modes
    /// whose neighbor is missing or non-displayable.
    pub fn advance_difference(&mut self) -> DifferenceState {
        let neighbors = self.neighbor_usability();
        self.machine.advance_difference(neighbors)
    }

    /// Advance the combined difference cycle.
    pub fn advance_combined(&mut self) -> DifferenceState {
        self.machine.advance_combined()
    }

    /// Compute (or reuse) the difference against the neighbor selected
    /// by the current mode.
    ///
    /// Valid only in [`DifferenceState::Previous`] or
    /// [`DifferenceState::Next`]; any other mode yields
    /// [`DiffOutcome::NotCalculable`]. A neighbor that is absent,
    /// non-displayable, or fails to decode yields the matching
    /// not-available outcome. The result is cached until the position
    /// changes, so repeated calls in the same mode do not recompute.
    pub fn try_calculate_difference(&mut self) -> DiffOutcome {
        let state = self.machine.state();
        let towards_previous = match state {
            DifferenceState::Previous => true,
            DifferenceState::Next => false,
            DifferenceState::Unaltered | DifferenceState::Combined => {
                return DiffOutcome::NotCalculable;
            }
        };

        let slot_filled = if towards_previous {
            self.results.previous.is_some()
        } else {
            self.results.next.is_some()
        };
        if slot_filled {
            return DiffOutcome::Success;
        }

        let Some(unaltered) = self.unaltered.clone() else {
            return DiffOutcome::CurrentImageNotAvailable;
        };

        let missing = if towards_previous {
            DiffOutcome::PreviousImageNotAvailable
        } else {
            DiffOutcome::NextImageNotAvailable
        };
        let Some(neighbor) = self.load_neighbor(towards_previous) else {
            return missing;
        };

        match diff::subtract(&unaltered, &neighbor) {
            Some(result) => {
                if towards_previous {
                    self.results.previous = Some(result);
                } else {
                    self.results.next = Some(result);
                }
                DiffOutcome::Success
            }
            None => DiffOutcome::NotCalculable,
        }
    }

    /// Compute (or reuse) the threshold-gated difference against both
    /// neighbors.
    ///
    /// Valid only in [`DifferenceState::Combined`]; any other mode
    /// yields [`DiffOutcome::NotCalculable`]. Both neighbors must be
    /// loadable; a size or format mismatch among the three frames
    /// yields [`DiffOutcome::NotCalculable`].
    pub fn try_calculate_combined_difference(&mut self, threshold: u8) -> DiffOutcome {
        if self.machine.state() != DifferenceState::Combined {
            return DiffOutcome::NotCalculable;
        }
        if self.results.combined.is_some() {
            return DiffOutcome::Success;
        }

        let Some(unaltered) = self.unaltered.clone() else {
            return DiffOutcome::CurrentImageNotAvailable;
        };
        let Some(previous) = self.load_neighbor(true) else {
            return DiffOutcome::PreviousImageNotAvailable;
        };
        let Some(next) = self.load_neighbor(false) else {
            return DiffOutcome::NextImageNotAvailable;
        };

        match diff::combined_difference(&unaltered, &previous, &next, threshold) {
            Some(result) => {
                self.results.combined = Some(result);
                DiffOutcome::Success
            }
            None => DiffOutcome::NotCalculable,
        }
    }

    /// Classify the current frame as dark/color using the configured
    /// thresholds. `None` when no bitmap is loaded.
    #[must_use]
    pub fn classify_current(&self) -> Option<Classification> {
        self.unaltered.as_deref().map(|bitmap| {
            classify(bitmap, self.config.dark_luminosity, self.config.dark_fraction)
        })
    }

    /// Drop the cached bitmap for `id` (the caller knows the on-disk
    /// content changed); returns whether anything was cached.
    ///
    /// Invalidating the currently positioned record additionally
    /// forces a full reset, as a position change would: the mode
    /// returns to unaltered and the record is re-decoded.
    ///
    /// # Errors
    ///
    /// Propagates [`CacheError::Decode`] when re-decoding the current
    /// record fails.
    pub fn try_invalidate(&mut self, id: RecordId) -> Result<bool, CacheError> {
        let existed = self.store.invalidate(id);
        if self.sequence.current() == Some(id) {
            self.on_position_changed()?;
        }
        Ok(existed)
    }

    /// Reset after the position (or current record content) changed:
    /// back to unaltered mode, result slots cleared, current bitmap
    /// reloaded.
    fn on_position_changed(&mut self) -> Result<(), CacheError> {
        self.machine.reset();
        self.results.clear();
        self.reload_unaltered()
    }

    fn reload_unaltered(&mut self) -> Result<(), CacheError> {
        self.unaltered = None;
        let Some(id) = self.sequence.current() else {
            return Ok(());
        };
        let decoder = &mut self.decoder;
        let bitmap = self.store.get_or_load(id, |record| decoder.decode(record))?;
        self.unaltered = Some(bitmap);
        Ok(())
    }

    /// Load the displayable neighbor on the given side, or `None` when
    /// it is absent, flagged non-displayable, or fails to decode.
    fn load_neighbor(&mut self, towards_previous: bool) -> Option<Rc<Bitmap>> {
        let position = self.sequence.position();
        let index = if towards_previous {
            position.checked_sub(1)?
        } else {
            position + 1
        };
        let id = self.sequence.record_at(index)?;
        if !self.sequence.is_displayable(id) {
            return None;
        }
        let decoder = &mut self.decoder;
        self.store
            .get_or_load(id, |record| decoder.decode(record))
            .ok()
    }

    fn neighbor_usability(&self) -> NeighborUsability {
        let position = self.sequence.position();
        let usable = |index: Option<usize>| {
            index
                .and_then(|i| self.sequence.record_at(i))
                .is_some_and(|id| self.sequence.is_displayable(id))
        };
        NeighborUsability {
            previous: usable(position.checked_sub(1)),
            next: usable(position.checked_add(1)),
        }
    }
}
