//! Spread catalog: reading layouts loaded from JSON.
//!
//! A spread is an ordered sequence of slots ("Past", "Present", ...) plus an
//! optional absolute pixel layout describing how the board is drawn. One
//! JSON document per spread lives under `<data_root>/data/spreads/`.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{bail, Context as _};
use log::debug;
use serde::Deserialize;

use crate::{cards::json_documents, Result};

/// The only layout type we know how to render.
pub const LAYOUT_ABSOLUTE: &str = "absolute";

/// One position in a reading, holding at most one drawn card.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SpreadSlot {
    /// Unique key within the spread.
    pub key: String,

    /// Human-readable slot label (e.g. "Past").
    pub label: String,

    /// Rotation angles a card in this slot may take, in declared order.
    /// The first entry is the default. Defaults to upright/reversed.
    #[serde(default = "default_allowed_angles")]
    pub allowed_angles: Vec<i32>,
}

fn default_allowed_angles() -> Vec<i32> {
    vec![0, 180]
}

/// Template strings for building a human-readable reading prompt.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PromptSpec {
    /// Prompt style. Only `cards_with_labels` exists today.
    #[serde(rename = "type", default = "default_prompt_type")]
    pub kind: String,

    /// Leads the sentence naming the deck.
    #[serde(default = "default_deck_line_prefix")]
    pub deck_line_prefix: String,

    /// Introduces the list of drawn cards.
    #[serde(default = "default_cards_intro")]
    pub cards_intro: String,
}

fn default_prompt_type() -> String {
    "cards_with_labels".to_owned()
}

fn default_deck_line_prefix() -> String {
    "사용한 덱은".to_owned()
}

fn default_cards_intro() -> String {
    "뽑은 카드는 아래와 같아.".to_owned()
}

impl Default for PromptSpec {
    fn default() -> PromptSpec {
        PromptSpec {
            kind: default_prompt_type(),
            deck_line_prefix: default_deck_line_prefix(),
            cards_intro: default_cards_intro(),
        }
    }
}

/// Where a layout slot's position coordinates are anchored.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    /// `x`/`y` give the top-left corner of the slot's box.
    TopLeft,
    /// `cx`/`cy` give the center of the slot's box.
    Center,
}

/// Rendering geometry for one slot: position, stacking order and an
/// optional rotation override.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LayoutSlot {
    /// Must match a [`SpreadSlot::key`] in the owning spread.
    pub key: String,

    /// How to interpret this slot's coordinates.
    #[serde(default = "default_anchor")]
    pub anchor: Anchor,

    /// Center x, in un-scaled layout units (center anchor).
    #[serde(default)]
    pub cx: Option<f64>,
    /// Center y, in un-scaled layout units (center anchor).
    #[serde(default)]
    pub cy: Option<f64>,
    /// Left edge, in un-scaled layout units (topleft anchor).
    #[serde(default)]
    pub x: Option<f64>,
    /// Top edge, in un-scaled layout units (topleft anchor).
    #[serde(default)]
    pub y: Option<f64>,

    /// Stacking order. Higher paints on top; ties break by key.
    #[serde(default)]
    pub z: i32,

    /// When present and non-empty, takes precedence over the spread slot's
    /// own `allowed_angles`.
    #[serde(default)]
    pub allowed_angles: Option<Vec<i32>>,
}

fn default_anchor() -> Anchor {
    Anchor::Center
}

/// The board canvas: size and background color.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CanvasSpec {
    /// Canvas width in un-scaled layout units.
    #[serde(default = "default_canvas_width")]
    pub width: u32,
    /// Canvas height in un-scaled layout units.
    #[serde(default = "default_canvas_height")]
    pub height: u32,
    /// Background color as a hex string, e.g. `#fffdf2`.
    #[serde(default = "default_background")]
    pub background: String,
}

fn default_canvas_width() -> u32 {
    1200
}

fn default_canvas_height() -> u32 {
    800
}

fn default_background() -> String {
    "#fffdf2".to_owned()
}

impl Default for CanvasSpec {
    fn default() -> CanvasSpec {
        CanvasSpec {
            width: default_canvas_width(),
            height: default_canvas_height(),
            background: default_background(),
        }
    }
}

/// The base card box, before any rotation.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CardSpec {
    /// Card width in un-scaled layout units.
    #[serde(default = "default_card_width")]
    pub width: u32,
    /// Card height in un-scaled layout units.
    #[serde(default = "default_card_height")]
    pub height: u32,
}

fn default_card_width() -> u32 {
    144
}

fn default_card_height() -> u32 {
    252
}

impl Default for CardSpec {
    fn default() -> CardSpec {
        CardSpec {
            width: default_card_width(),
            height: default_card_height(),
        }
    }
}

/// Absolute pixel rendering geometry for a spread.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LayoutSpec {
    /// Layout type. Only [`LAYOUT_ABSOLUTE`] is supported.
    #[serde(rename = "type", default = "default_layout_type")]
    pub kind: String,

    /// Multiplies all layout pixel quantities uniformly.
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Canvas size and background.
    #[serde(default)]
    pub canvas: CanvasSpec,

    /// Base card box size.
    #[serde(default)]
    pub card: CardSpec,

    /// Per-slot geometry.
    #[serde(default)]
    pub slots: Vec<LayoutSlot>,
}

fn default_layout_type() -> String {
    LAYOUT_ABSOLUTE.to_owned()
}

fn default_scale() -> f64 {
    1.0
}

impl LayoutSpec {
    /// Find the layout geometry for a slot key.
    pub fn slot_by_key(&self, key: &str) -> Option<&LayoutSlot> {
        self.slots.iter().find(|s| s.key == key)
    }

    /// Does this layout use the only type we can render?
    pub fn is_absolute(&self) -> bool {
        self.kind == LAYOUT_ABSOLUTE
    }
}

/// A named arrangement of slots representing a reading layout.
#[derive(Clone, Debug, Deserialize)]
pub struct Spread {
    /// Unique spread id, normally the file stem of the spread document.
    pub id: String,

    /// Human-readable spread name. Defaults to the id.
    #[serde(default)]
    pub name: String,

    /// The slots, in reading order. Order is semantically meaningful.
    #[serde(default)]
    pub slots: Vec<SpreadSlot>,

    /// Templates for the reading prompt.
    #[serde(default)]
    pub prompt: PromptSpec,

    /// Absolute pixel layout, if the spread can be drawn in board mode.
    #[serde(default)]
    pub layout: Option<LayoutSpec>,
}

impl Spread {
    /// How many cards this spread needs.
    pub fn n_cards(&self) -> usize {
        self.slots.len()
    }

    /// The position of a slot key in reading order.
    pub fn slot_index(&self, key: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.key == key)
    }

    /// Check the invariants the renderer and hit-tester rely on: every
    /// layout slot refers to a real spread slot, and all angle lists are
    /// non-empty quarter turns.
    fn validate(&self) -> Result<()> {
        for slot in &self.slots {
            if slot.allowed_angles.is_empty() {
                bail!("slot {:?} has an empty allowed_angles list", slot.key);
            }
            check_quarter_turns(&slot.key, &slot.allowed_angles)?;
        }
        if let Some(layout) = &self.layout {
            for ls in &layout.slots {
                if self.slot_index(&ls.key).is_none() {
                    bail!("layout slot {:?} has no matching spread slot", ls.key);
                }
                if let Some(angles) = &ls.allowed_angles {
                    check_quarter_turns(&ls.key, angles)?;
                }
            }
        }
        Ok(())
    }
}

/// Reject rotation angles the placement math cannot reason about.
fn check_quarter_turns(key: &str, angles: &[i32]) -> Result<()> {
    for &angle in angles {
        if angle.rem_euclid(90) != 0 {
            bail!("slot {:?} allows angle {}°, which is not a quarter turn", key, angle);
        }
    }
    Ok(())
}

/// Load every spread document under `<data_root>/data/spreads/`, keyed by
/// spread id. Returns an empty map if the directory does not exist.
pub fn load_spreads(data_root: &Path) -> Result<BTreeMap<String, Spread>> {
    let dir = data_root.join("data").join("spreads");
    let mut spreads = BTreeMap::new();
    for path in json_documents(&dir)? {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("could not read {}", path.display()))?;
        let mut spread: Spread = serde_json::from_str(&text)
            .with_context(|| format!("could not parse spread {}", path.display()))?;
        if spread.name.is_empty() {
            spread.name = spread.id.clone();
        }
        spread
            .validate()
            .with_context(|| format!("invalid spread {}", path.display()))?;
        debug!(
            "loaded spread {:?} ({} slots, layout: {})",
            spread.id,
            spread.slots.len(),
            spread.layout.is_some()
        );
        spreads.insert(spread.id.clone(), spread);
    }
    Ok(spreads)
}

#[cfg(test)]
pub(crate) mod test {
    use serde_json::json;

    use super::*;

    /// A three-slot spread with overlapping layout geometry, used by several
    /// test modules.
    pub(crate) fn overlap_spread() -> Spread {
        let spread: Spread = serde_json::from_value(json!({
            "id": "overlap",
            "name": "Overlap",
            "slots": [
                { "key": "base", "label": "Base" },
                { "key": "cross", "label": "Cross", "allowed_angles": [0] },
                { "key": "side", "label": "Side" },
            ],
            "layout": {
                "type": "absolute",
                "scale": 1.0,
                "canvas": { "width": 600, "height": 400, "background": "#fffdf2" },
                "card": { "width": 100, "height": 180 },
                "slots": [
                    { "key": "base", "anchor": "center", "cx": 200, "cy": 200, "z": 1 },
                    { "key": "cross", "anchor": "center", "cx": 200, "cy": 200, "z": 2,
                      "allowed_angles": [90, 270] },
                    { "key": "side", "anchor": "topleft", "x": 400, "y": 100, "z": 0 },
                ],
            },
        }))
        .unwrap();
        spread.validate().unwrap();
        spread
    }

    #[test]
    fn load_spreads_from_fixtures() {
        let spreads = load_spreads(std::path::Path::new("fixtures")).unwrap();
        let spread = spreads.get("three_line").expect("fixture spread");
        assert_eq!(3, spread.n_cards());
        assert_eq!(Some(1), spread.slot_index("present"));
        let layout = spread.layout.as_ref().unwrap();
        assert!(layout.is_absolute());
        assert_eq!(Anchor::Center, layout.slot_by_key("past").unwrap().anchor);
    }

    #[test]
    fn defaults_are_filled_in() {
        let spread: Spread = serde_json::from_value(json!({
            "id": "bare",
            "slots": [{ "key": "only", "label": "Only" }],
        }))
        .unwrap();
        assert_eq!(vec![0, 180], spread.slots[0].allowed_angles);
        assert_eq!("사용한 덱은", spread.prompt.deck_line_prefix);
        assert!(spread.layout.is_none());
    }

    #[test]
    fn layout_slot_must_match_a_spread_slot() {
        let spread: Spread = serde_json::from_value(json!({
            "id": "bad",
            "slots": [{ "key": "a", "label": "A" }],
            "layout": { "slots": [{ "key": "b", "cx": 1, "cy": 1 }] },
        }))
        .unwrap();
        assert!(spread.validate().is_err());
    }

    #[test]
    fn non_quarter_angles_are_rejected() {
        let spread: Spread = serde_json::from_value(json!({
            "id": "tilted",
            "slots": [{ "key": "a", "label": "A", "allowed_angles": [0, 45] }],
        }))
        .unwrap();
        assert!(spread.validate().is_err());
    }
}
