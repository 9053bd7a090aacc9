//! Per-slot rotation rules.
//!
//! Three layers can claim a slot's allowed rotation angles, and the deck's
//! reversibility trumps them all: a non-reversible deck pins every slot to
//! upright. Below that, a layout override wins over the spread slot's own
//! list. The resolved list is the "effective" set used everywhere else.

use rand::seq::SliceRandom;

use crate::{cards::Deck, spreads::Spread};

/// The allowed-angle set used when nothing else specifies one.
pub const DEFAULT_ALLOWED_ANGLES: &[i32] = &[0, 180];

/// Resolve the effective allowed-angle list for slot `idx` of `spread` when
/// drawing from `deck`. Never returns an empty list.
pub fn effective_allowed_angles(deck: &Deck, spread: &Spread, idx: usize) -> Vec<i32> {
    if !deck.reversible {
        return vec![0];
    }
    let Some(slot) = spread.slots.get(idx) else {
        return DEFAULT_ALLOWED_ANGLES.to_vec();
    };
    if let Some(layout) = &spread.layout {
        if let Some(ls) = layout.slot_by_key(&slot.key) {
            if let Some(angles) = &ls.allowed_angles {
                if !angles.is_empty() {
                    return angles.clone();
                }
            }
        }
    }
    if slot.allowed_angles.is_empty() {
        DEFAULT_ALLOWED_ANGLES.to_vec()
    } else {
        slot.allowed_angles.clone()
    }
}

/// The default angle for a slot: the first effective allowed angle.
pub fn default_angle(deck: &Deck, spread: &Spread, idx: usize) -> i32 {
    effective_allowed_angles(deck, spread, idx)[0]
}

/// A uniformly random choice among the slot's effective allowed angles.
pub fn random_angle(deck: &Deck, spread: &Spread, idx: usize) -> i32 {
    let angles = effective_allowed_angles(deck, spread, idx);
    *angles
        .choose(&mut rand::thread_rng())
        .expect("effective allowed angles are never empty")
}

/// Advance to the next allowed angle, wrapping around. A current angle that
/// is not in the effective set snaps back to the default.
pub fn toggle_angle(deck: &Deck, spread: &Spread, idx: usize, current: i32) -> i32 {
    let angles = effective_allowed_angles(deck, spread, idx);
    match angles.iter().position(|&a| a == current) {
        Some(pos) => angles[(pos + 1) % angles.len()],
        None => angles[0],
    }
}
