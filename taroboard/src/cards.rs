//! Deck catalog: immutable card and deck definitions loaded from JSON.
//!
//! One JSON document per deck lives under `<data_root>/data/decks/`. Card
//! images are separate assets, named `{code}.jpg` inside the deck's
//! `image_dir`; we never touch them here, only hand out their paths.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context as _};
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::Result;

/// One card in a deck. Immutable once loaded.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Card {
    /// Unique key within the deck, also the image file stem.
    pub code: String,

    /// The card's canonical name, possibly empty.
    #[serde(default)]
    pub name: String,

    /// Free-form metadata: an explicit display `label`, localized names
    /// (`korean`, `hanja`), and whatever else the deck author recorded.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Card {
    /// The name to show on screen. Prefers an explicit `label`, then a
    /// localized-name composition, then falls back to code + name.
    pub fn display_name(&self) -> String {
        if let Some(label) = self.extra_str("label") {
            return label.to_owned();
        }
        if let Some(korean) = self.extra_str("korean") {
            if let Some(hanja) = self.extra_str("hanja") {
                return format!("{}. {} ({})", self.code, korean, hanja);
            }
            return format!("{}. {}", self.code, korean);
        }
        format!("{} {}", self.code, self.name).trim().to_owned()
    }

    /// Look up a non-blank string value in our metadata.
    fn extra_str(&self, key: &str) -> Option<&str> {
        match self.extra.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            _ => None,
        }
    }
}

/// A named collection of cards with shared image assets and a reversibility
/// policy. Immutable once loaded.
#[derive(Clone, Debug, Deserialize)]
pub struct Deck {
    /// Unique deck id, normally the file stem of the deck document.
    pub id: String,

    /// Human-readable deck name. Defaults to the id.
    #[serde(default)]
    pub name: String,

    /// Directory holding `{code}.jpg` for every card, relative to the
    /// data root.
    pub image_dir: String,

    /// Optional deck-wide card back image, relative to the data root.
    #[serde(default)]
    pub back_image: Option<String>,

    /// The cards. Order is preserved from the document but carries no
    /// meaning.
    #[serde(default)]
    pub cards: Vec<Card>,

    /// Whether cards from this deck may appear reversed. A non-reversible
    /// deck never produces a non-zero rotation for any slot.
    #[serde(default = "default_reversible")]
    pub reversible: bool,
}

fn default_reversible() -> bool {
    true
}

impl Deck {
    /// Find a card by its code.
    pub fn card_by_code(&self, code: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.code == code)
    }

    /// Path to the image asset for the specified card code.
    pub fn card_image_path(&self, data_root: &Path, code: &str) -> PathBuf {
        data_root.join(&self.image_dir).join(format!("{}.jpg", code))
    }

    /// Path to the deck-wide back image, if the deck defines one.
    pub fn back_image_path(&self, data_root: &Path) -> Option<PathBuf> {
        self.back_image.as_ref().map(|rel| data_root.join(rel))
    }

    /// Check the invariant the rest of the crate relies on: card codes are
    /// unique within one deck.
    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for card in &self.cards {
            if !seen.insert(card.code.as_str()) {
                bail!("deck {:?} has duplicate card code {:?}", self.id, card.code);
            }
        }
        Ok(())
    }
}

/// Load every deck document under `<data_root>/data/decks/`, keyed by deck
/// id. Returns an empty map if the directory does not exist.
pub fn load_decks(data_root: &Path) -> Result<BTreeMap<String, Deck>> {
    let dir = data_root.join("data").join("decks");
    let mut decks = BTreeMap::new();
    for path in json_documents(&dir)? {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("could not read {}", path.display()))?;
        let mut deck: Deck = serde_json::from_str(&text)
            .with_context(|| format!("could not parse deck {}", path.display()))?;
        if deck.name.is_empty() {
            deck.name = deck.id.clone();
        }
        deck.validate()
            .with_context(|| format!("invalid deck {}", path.display()))?;
        debug!("loaded deck {:?} ({} cards)", deck.id, deck.cards.len());
        decks.insert(deck.id.clone(), deck);
    }
    Ok(decks)
}

/// List the `*.json` files in a catalog directory, sorted by filename so
/// that load order is deterministic. A missing directory is not an error.
pub(crate) fn json_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let mut paths = vec![];
    for entry in
        fs::read_dir(dir).with_context(|| format!("could not list {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn card(code: &str, name: &str, extra: Value) -> Card {
        let mut c: Card = serde_json::from_value(json!({ "code": code, "name": name })).unwrap();
        if let Value::Object(map) = extra {
            c.extra = map.into_iter().collect();
        }
        c
    }

    #[test]
    fn display_name_prefers_label() {
        let c = card("0", "The Fool", json!({ "label": "The Fool (바보)" }));
        assert_eq!("The Fool (바보)", c.display_name());
    }

    #[test]
    fn display_name_composes_localized_names() {
        let c = card("0", "The Fool", json!({ "korean": "바보", "hanja": "愚者" }));
        assert_eq!("0. 바보 (愚者)", c.display_name());
        let c = card("0", "The Fool", json!({ "korean": "바보" }));
        assert_eq!("0. 바보", c.display_name());
    }

    #[test]
    fn display_name_falls_back_to_code_and_name() {
        let c = card("0", "The Fool", json!({ "label": "   " }));
        assert_eq!("0 The Fool", c.display_name());
        let c = card("0", "", json!({}));
        assert_eq!("0", c.display_name());
    }

    #[test]
    fn duplicate_codes_are_rejected() {
        let deck: Deck = serde_json::from_value(json!({
            "id": "dup",
            "image_dir": "images/dup",
            "cards": [{ "code": "0" }, { "code": "0" }],
        }))
        .unwrap();
        assert!(deck.validate().is_err());
    }

    #[test]
    fn load_decks_from_fixtures() {
        let decks = load_decks(Path::new("fixtures")).unwrap();
        let deck = decks.get("testdeck").expect("fixture deck");
        assert_eq!("Test Deck", deck.name);
        assert!(deck.reversible);
        assert_eq!(6, deck.cards.len());
        assert!(deck.card_by_code("2").is_some());
        assert!(deck.card_by_code("nope").is_none());
    }

    #[test]
    fn missing_catalog_dir_is_empty() {
        let decks = load_decks(Path::new("/nonexistent/taroboard")).unwrap();
        assert!(decks.is_empty());
    }
}
