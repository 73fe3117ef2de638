//! Difference-mode state machine.
//!
//! A pure four-state automaton deciding which comparison the review
//! screen currently shows. The only state is the current mode; the
//! owning cache supplies neighbor usability when advancing and forces
//! [`DifferenceState::Unaltered`] on every position change.

use serde::{Deserialize, Serialize};

/// Which comparison is currently displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DifferenceState {
    /// The record's own bitmap, unmodified. Initial state; always valid.
    #[default]
    Unaltered,
    /// Difference against the previous neighbor.
    Previous,
    /// Difference against the next neighbor.
    Next,
    /// Threshold-gated difference against both neighbors.
    Combined,
}

/// Whether each temporal neighbor can serve as a difference operand:
/// it must exist (the current record is not at the corresponding end of
/// the selection) and be displayable per the externally supplied
/// predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborUsability {
    /// The previous record exists and is displayable.
    pub previous: bool,
    /// The next record exists and is displayable.
    pub next: bool,
}

/// Drives the two difference-mode gestures.
#[derive(Debug, Default)]
pub struct DifferenceStateMachine {
    state: DifferenceState,
}

impl DifferenceStateMachine {
    /// A machine in the initial [`DifferenceState::Unaltered`] state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current difference mode.
    #[must_use]
    pub const fn state(&self) -> DifferenceState {
        self.state
    }

    /// Force [`DifferenceState::Unaltered`]. Called on every position
    /// change.
    pub const fn reset(&mut self) {
        self.state = DifferenceState::Unaltered;
    }

    /// Advance the previous/next cycle:
    /// `Unaltered -> Previous -> Next -> Unaltered -> ...`
    /// (the combined mode re-enters the cycle at `Previous`).
    ///
    /// A target whose neighbor is unusable is skipped by advancing
    /// again; `Unaltered` is always valid, so the walk terminates
    /// within one lap.
    pub fn advance_difference(&mut self, neighbors: NeighborUsability) -> DifferenceState {
        loop {
            self.state = Self::next_in_cycle(self.state);
            let valid = match self.state {
                DifferenceState::Unaltered => true,
                DifferenceState::Previous => neighbors.previous,
                DifferenceState::Next => neighbors.next,
                DifferenceState::Combined => false,
            };
            if valid {
                return self.state;
            }
        }
    }

    /// Advance the combined cycle: any difference mode returns to
    /// `Unaltered`; `Unaltered` enters `Combined`.
    pub const fn advance_combined(&mut self) -> DifferenceState {
        self.state = match self.state {
            DifferenceState::Previous | DifferenceState::Next | DifferenceState::Combined => {
                DifferenceState::Unaltered
            }
            DifferenceState::Unaltered => DifferenceState::Combined,
        };
        self.state
    }

    const fn next_in_cycle(state: DifferenceState) -> DifferenceState {
        match state {
            DifferenceState::Unaltered | DifferenceState::Combined => DifferenceState::Previous,
            DifferenceState::Previous => DifferenceState::Next,
            DifferenceState::Next => DifferenceState::Unaltered,
        }
    }
}
