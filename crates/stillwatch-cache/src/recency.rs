//! Fixed-capacity most-recently-used key tracker.
//!
//! One arena-style structure: a slot array carrying intrusive
//! prev/next recency links, a free list for slot reuse, and a
//! key-to-slot lookup map. Promote, evict, and remove are all O(1)
//! without relying on any ordered-map iteration guarantees.

use std::collections::HashMap;

use crate::types::RecordId;

/// Sentinel slot index meaning "no link".
const NIL: usize = usize::MAX;

/// One arena slot: a tracked key plus its recency-list links.
#[derive(Debug, Clone, Copy)]
struct Slot {
    key: RecordId,
    /// Slot index of the next-more-recent entry, or [`NIL`] at the head.
    prev: usize,
    /// Slot index of the next-less-recent entry, or [`NIL`] at the tail.
    next: usize,
}

/// Tracks usage order of up to `capacity` keys.
///
/// The index only tracks keys; it never owns the values cached under
/// them. Callers that cache a value per key (the bitmap store) consult
/// [`is_full`](Self::is_full) and [`least_recent`](Self::least_recent)
/// to evict their value *before* inserting a new key. As a backstop,
/// inserting a new key while full drops the least-recent entry from the
/// index so the live count can never exceed capacity.
#[derive(Debug)]
pub struct RecencyIndex {
    capacity: usize,
    slots: Vec<Slot>,
    lookup: HashMap<RecordId, usize>,
    /// Most-recent slot, or [`NIL`] when empty.
    head: usize,
    /// Least-recent slot, or [`NIL`] when empty.
    tail: usize,
    free: Vec<usize>,
}

impl RecencyIndex {
    /// Create an index tracking at most `capacity` keys.
    ///
    /// # Panics
    ///
    /// A capacity of zero is a fatal configuration error; construction
    /// asserts `capacity >= 1`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "recency index capacity must be at least 1");
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            lookup: HashMap::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            free: Vec::new(),
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    /// `true` when no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// `true` when the live entry count equals the capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.lookup.len() == self.capacity
    }

    /// The configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert `key` as the most-recent entry, or promote it if already
    /// tracked.
    ///
    /// Promoting the key that is already most recent leaves the order
    /// unchanged. Inserting a new key while full drops the least-recent
    /// entry, returning its key so the caller can release whatever it
    /// cached under it; in the store's evict-then-insert discipline this
    /// path is never taken.
    pub fn set_most_recent(&mut self, key: RecordId) -> Option<RecordId> {
        if let Some(&slot) = self.lookup.get(&key) {
            if self.head != slot {
                self.unlink(slot);
                self.link_front(slot);
            }
            return None;
        }

        let displaced = if self.is_full() {
            let lru = self.slots[self.tail].key;
            self.remove(lru);
            Some(lru)
        } else {
            None
        };

        let slot = if let Some(reused) = self.free.pop() {
            self.slots[reused].key = key;
            reused
        } else {
            self.slots.push(Slot {
                key,
                prev: NIL,
                next: NIL,
            });
            self.slots.len() - 1
        };
        self.lookup.insert(key, slot);
        self.link_front(slot);
        displaced
    }

    /// The most recently used key, or `None` when empty.
    #[must_use]
    pub fn most_recent(&self) -> Option<RecordId> {
        (self.head != NIL).then(|| self.slots[self.head].key)
    }

    /// The least recently used key, or `None` when empty.
    #[must_use]
    pub fn least_recent(&self) -> Option<RecordId> {
        (self.tail != NIL).then(|| self.slots[self.tail].key)
    }

    /// Remove `key` if tracked; returns whether a removal occurred.
    pub fn remove(&mut self, key: RecordId) -> bool {
        let Some(slot) = self.lookup.remove(&key) else {
            return false;
        };
        self.unlink(slot);
        self.free.push(slot);
        true
    }

    /// Iterate tracked keys from most to least recent.
    pub fn iter(&self) -> impl Iterator<Item = RecordId> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            if cursor == NIL {
                return None;
            }
            let slot = &self.slots[cursor];
            cursor = slot.next;
            Some(slot.key)
        })
    }

    /// Detach `slot` from the recency list.
    fn unlink(&mut self, slot: usize) {
        let Slot { prev, next, .. } = self.slots[slot];
        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].prev = prev;
        }
    }

    /// Attach `slot` at the most-recent end of the recency list.
    fn link_front(&mut self, slot: usize) {
        self.slots[slot].prev = NIL;
        self.slots[slot].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }
}
