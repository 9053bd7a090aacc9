//! The mutable per-session draw state.
//!
//! Earlier revisions kept two parallel arrays (codes and angles) that had to
//! be resized in lock step. Holding one [`SlotState`] per spread slot makes
//! the "same length as the spread" invariant a structural one.

use crate::{angles, cards::Deck, spreads::Spread};

/// What one spread slot currently holds. An empty slot still carries an
/// angle, because the card back renders rotated like anything else.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SlotState {
    /// The drawn card's code, or `None` while the slot is face-down.
    pub code: Option<String>,

    /// The slot's current rotation angle in degrees.
    pub angle: i32,
}

/// The current assignment of cards and angles to a spread's slots, for one
/// deck/spread pair. Replaced wholesale on deck or spread change.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DrawState {
    /// The deck this state draws from.
    pub deck_id: String,

    /// The spread this state fills.
    pub spread_id: String,

    /// One entry per spread slot, in reading order.
    pub slots: Vec<SlotState>,
}

impl DrawState {
    /// A fresh, all-empty state for the given deck and spread, with every
    /// slot at its default angle.
    pub fn empty(deck: &Deck, spread: &Spread) -> DrawState {
        let slots = (0..spread.n_cards())
            .map(|idx| SlotState {
                code: None,
                angle: angles::default_angle(deck, spread, idx),
            })
            .collect();
        DrawState {
            deck_id: deck.id.clone(),
            spread_id: spread.id.clone(),
            slots,
        }
    }

    /// All codes currently on the board, except the slot at `skip` (pass
    /// `usize::MAX` to keep them all). Used as a draw exclusion set.
    pub fn used_codes_except(&self, skip: usize) -> Vec<String> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != skip)
            .filter_map(|(_, slot)| slot.code.clone())
            .collect()
    }

    /// All codes currently on the board.
    pub fn used_codes(&self) -> Vec<String> {
        self.used_codes_except(usize::MAX)
    }

    /// Is every slot occupied?
    pub fn is_complete(&self) -> bool {
        !self.slots.is_empty() && self.slots.iter().all(|s| s.code.is_some())
    }

    /// How many slots are still face-down?
    pub fn empty_count(&self) -> usize {
        self.slots.iter().filter(|s| s.code.is_none()).count()
    }
}
