//! State codec: tokens, records and normalization.
//!
//! A draw travels in two shapes: a compact URL-safe token (for query
//! strings) and a plain [`StateRecord`] (for the room store). Both carry the
//! same `{d, s, c, a}` payload. Decoding never fails loudly: a malformed
//! token means "no saved state", nothing more.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    angles,
    cards::Deck,
    spreads::Spread,
    state::{DrawState, SlotState},
};

/// The wire form of a draw: deck id, spread id, per-slot codes and angles.
/// Field order is the canonical JSON key order.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StateRecord {
    /// Deck id.
    pub d: String,
    /// Spread id.
    pub s: String,
    /// One optional card code per slot.
    #[serde(default)]
    pub c: Vec<Option<String>>,
    /// One angle per slot, in degrees.
    #[serde(default)]
    pub a: Vec<i32>,
}

/// Convert a draw state to its wire record.
pub fn to_record(state: &DrawState) -> StateRecord {
    StateRecord {
        d: state.deck_id.clone(),
        s: state.spread_id.clone(),
        c: state.slots.iter().map(|s| s.code.clone()).collect(),
        a: state.slots.iter().map(|s| s.angle).collect(),
    }
}

/// Encode a draw state as a URL-safe token: compact JSON, then unpadded
/// URL-safe base64.
pub fn encode_state(state: &DrawState) -> String {
    let json = serde_json::to_string(&to_record(state))
        .expect("a state record always serializes");
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode a token produced by [`encode_state`]. Any malformed input -
/// bad base64, invalid JSON, a JSON value that is not a record - yields
/// `None`, which callers must treat exactly like "no saved state".
pub fn decode_state(token: &str) -> Option<StateRecord> {
    // Tolerate padded tokens from older clients.
    let trimmed = token.trim().trim_end_matches('=');
    let raw = match URL_SAFE_NO_PAD.decode(trimmed) {
        Ok(raw) => raw,
        Err(err) => {
            debug!("ignoring unreadable state token: {}", err);
            return None;
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(record) => Some(record),
        Err(err) => {
            debug!("ignoring malformed state record: {}", err);
            None
        }
    }
}

/// Fit a record to the given deck and spread, repairing anything stale.
///
/// Runs on every load from a URL, a remote room, or a deck/spread change:
/// wrong-length code lists reset to all-empty, wrong-length angle lists
/// reset to per-slot defaults, out-of-set angles snap to the default, and a
/// code that already appeared in an earlier slot is dropped. The result
/// always satisfies the [`DrawState`] invariants, and normalizing twice
/// changes nothing.
pub fn normalize(record: &StateRecord, deck: &Deck, spread: &Spread) -> DrawState {
    let n = spread.n_cards();

    let mut codes = record.c.clone();
    if codes.len() != n {
        codes = vec![None; n];
    }
    let mut seen: Vec<&str> = vec![];
    for code in codes.iter_mut() {
        match code {
            Some(c) if seen.iter().any(|s| s == c) => {
                debug!("dropping duplicate card code {:?} during normalize", c);
                *code = None;
            }
            Some(c) => seen.push(c.as_str()),
            None => {}
        }
    }

    let mut slot_angles = record.a.clone();
    if slot_angles.len() != n {
        slot_angles = (0..n)
            .map(|idx| angles::default_angle(deck, spread, idx))
            .collect();
    }
    for (idx, angle) in slot_angles.iter_mut().enumerate() {
        let allowed = angles::effective_allowed_angles(deck, spread, idx);
        if !allowed.contains(angle) {
            *angle = allowed[0];
        }
    }

    DrawState {
        deck_id: deck.id.clone(),
        spread_id: spread.id.clone(),
        slots: codes
            .into_iter()
            .zip(slot_angles)
            .map(|(code, angle)| SlotState { code, angle })
            .collect(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spreads::test::overlap_spread;

    fn deck(reversible: bool) -> Deck {
        serde_json::from_value(serde_json::json!({
            "id": "testdeck",
            "image_dir": "images/testdeck",
            "reversible": reversible,
            "cards": [
                { "code": "0" }, { "code": "1" }, { "code": "2" },
                { "code": "3" }, { "code": "4" },
            ],
        }))
        .unwrap()
    }

    fn sample_state() -> DrawState {
        DrawState {
            deck_id: "testdeck".to_owned(),
            spread_id: "overlap".to_owned(),
            slots: vec![
                SlotState { code: Some("0".to_owned()), angle: 180 },
                SlotState { code: None, angle: 90 },
                SlotState { code: Some("4".to_owned()), angle: 0 },
            ],
        }
    }

    #[test]
    fn token_round_trips() {
        let state = sample_state();
        let token = encode_state(&state);
        assert!(!token.contains('='), "token must be unpadded");
        assert_eq!(Some(to_record(&state)), decode_state(&token));
        // Padded variants decode to the same record.
        assert_eq!(Some(to_record(&state)), decode_state(&format!("{}==", token)));
    }

    #[test]
    fn canonical_json_key_order() {
        let json = serde_json::to_string(&to_record(&sample_state())).unwrap();
        assert!(json.starts_with(r#"{"d":"testdeck","s":"overlap","c":["#));
        assert!(!json.contains(' '), "no inserted whitespace");
    }

    #[test]
    fn malformed_tokens_decode_to_none() {
        assert_eq!(None, decode_state("not-valid-base64!!"));
        // Valid base64, invalid JSON.
        let garbage = URL_SAFE_NO_PAD.encode(b"]o ps[");
        assert_eq!(None, decode_state(&garbage));
        // Valid JSON, but not a record.
        let array = URL_SAFE_NO_PAD.encode(b"[1,2,3]");
        assert_eq!(None, decode_state(&array));
        assert_eq!(None, decode_state(""));
    }

    #[test]
    fn wrong_length_codes_reset_everything() {
        let spread = overlap_spread();
        let record = StateRecord {
            d: "testdeck".to_owned(),
            s: "overlap".to_owned(),
            c: vec![Some("0".to_owned())],
            a: vec![180],
        };
        let state = normalize(&record, &deck(true), &spread);
        assert_eq!(3, state.slots.len());
        assert!(state.slots.iter().all(|s| s.code.is_none()));
        assert_eq!(vec![0, 90, 0], state.slots.iter().map(|s| s.angle).collect::<Vec<_>>());
    }

    #[test]
    fn stale_angles_snap_to_defaults() {
        let spread = overlap_spread();
        // Angle 180 is fine for slot 0 but foreign to the crossing slot's
        // [90, 270] override.
        let record = StateRecord {
            d: "testdeck".to_owned(),
            s: "overlap".to_owned(),
            c: vec![Some("0".to_owned()), Some("1".to_owned()), None],
            a: vec![180, 180, 180],
        };
        let state = normalize(&record, &deck(true), &spread);
        assert_eq!(Some("0".to_owned()), state.slots[0].code);
        assert_eq!(vec![180, 90, 180], state.slots.iter().map(|s| s.angle).collect::<Vec<_>>());
    }

    #[test]
    fn non_reversible_deck_flattens_angles() {
        let spread = overlap_spread();
        let record = StateRecord {
            d: "testdeck".to_owned(),
            s: "overlap".to_owned(),
            c: vec![None, None, None],
            a: vec![180, 270, 180],
        };
        let state = normalize(&record, &deck(false), &spread);
        assert!(state.slots.iter().all(|s| s.angle == 0));
    }

    #[test]
    fn duplicate_codes_are_dropped() {
        let spread = overlap_spread();
        let record = StateRecord {
            d: "testdeck".to_owned(),
            s: "overlap".to_owned(),
            c: vec![Some("2".to_owned()), Some("2".to_owned()), Some("1".to_owned())],
            a: vec![0, 90, 0],
        };
        let state = normalize(&record, &deck(true), &spread);
        assert_eq!(Some("2".to_owned()), state.slots[0].code);
        assert_eq!(None, state.slots[1].code);
        assert_eq!(Some("1".to_owned()), state.slots[2].code);
    }

    #[test]
    fn normalize_is_idempotent() {
        let spread = overlap_spread();
        let deck = deck(true);
        let record = StateRecord {
            d: "other".to_owned(),
            s: "other".to_owned(),
            c: vec![Some("0".to_owned()), Some("0".to_owned())],
            a: vec![45, 7, 9, 11],
        };
        let once = normalize(&record, &deck, &spread);
        let twice = normalize(&to_record(&once), &deck, &spread);
        assert_eq!(once, twice);
    }
}
