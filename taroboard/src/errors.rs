//! Error types for structural failures.
//!
//! Most recoverable conditions in this crate (bad state tokens, missing card
//! images, an unreachable room store) are absorbed where they occur and never
//! surface as errors. The conditions below are the ones callers genuinely
//! need to tell apart, so they get their own type and travel through
//! `anyhow` like everything else.

use thiserror::Error;

/// A failure that halts the affected flow rather than degrading it.
#[derive(Debug, Error)]
pub enum BoardError {
    /// The spread has no absolute pixel layout, so it cannot be rendered
    /// or hit-tested in board mode. Other flows remain usable.
    #[error("spread {spread_id:?} has no absolute layout and cannot be composed")]
    LayoutUnsupported {
        /// The id of the offending spread.
        spread_id: String,
    },

    /// The exclusion set (cards already on the board) leaves too few cards
    /// in the deck. Only possible when a spread has more slots than the
    /// deck has cards, which is a configuration problem.
    #[error("not enough available cards to draw (wanted {wanted}, have {available})")]
    NoCardsAvailable {
        /// How many cards the caller asked for.
        wanted: usize,
        /// How many cards were left after exclusions.
        available: usize,
    },

    /// A rotation angle that is not a quarter turn. The placement math only
    /// reasons about the 90°/270° width/height swap, so anything else is
    /// rejected instead of silently mis-placed.
    #[error("unsupported rotation angle {0}° (only multiples of 90° are allowed)")]
    UnsupportedAngle(i32),

    /// No decks or no spreads were found at startup. Nothing else can
    /// proceed without catalog data.
    #[error("no {kind} found under {data_root:?}")]
    EmptyCatalog {
        /// Which catalog came up empty ("decks" or "spreads").
        kind: &'static str,
        /// Where we looked.
        data_root: String,
    },
}
