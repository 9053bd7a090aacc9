//! Stateless card sampling: uniform draws without replacement.

use rand::seq::index;

use crate::{cards::Deck, errors::BoardError, Result};

/// Draw one card code uniformly from the deck, excluding codes already in
/// play. Fails when the exclusion set covers the whole deck.
pub fn draw_one(deck: &Deck, exclude_codes: &[String]) -> Result<String> {
    let drawn = draw_many(deck, 1, exclude_codes)?;
    Ok(drawn.into_iter().next().expect("draw_many returned one code"))
}

/// Draw `n` distinct card codes without replacement from the cards not in
/// `exclude_codes`. Fails when the remaining pool is smaller than `n`.
pub fn draw_many(deck: &Deck, n: usize, exclude_codes: &[String]) -> Result<Vec<String>> {
    let available: Vec<&str> = deck
        .cards
        .iter()
        .map(|c| c.code.as_str())
        .filter(|code| !exclude_codes.iter().any(|e| e == code))
        .collect();
    if available.len() < n {
        return Err(BoardError::NoCardsAvailable {
            wanted: n,
            available: available.len(),
        }
        .into());
    }
    let picked = index::sample(&mut rand::thread_rng(), available.len(), n);
    Ok(picked.iter().map(|i| available[i].to_owned()).collect())
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;
    use crate::errors::BoardError;

    fn deck(n: usize) -> Deck {
        let cards = (0..n)
            .map(|i| serde_json::json!({ "code": i.to_string(), "name": format!("Card {}", i) }))
            .collect::<Vec<_>>();
        serde_json::from_value(serde_json::json!({
            "id": "counting",
            "image_dir": "images/counting",
            "cards": cards,
        }))
        .unwrap()
    }

    #[test]
    fn draws_are_distinct_and_respect_exclusions() {
        let deck = deck(10);
        let exclude = vec!["0".to_owned(), "1".to_owned(), "2".to_owned()];
        for _ in 0..25 {
            let drawn = draw_many(&deck, 5, &exclude).unwrap();
            let unique: HashSet<&String> = drawn.iter().collect();
            assert_eq!(5, unique.len());
            for code in &drawn {
                assert!(!exclude.contains(code));
            }
        }
    }

    #[test]
    fn draw_one_exhausts() {
        let deck = deck(2);
        let exclude = vec!["0".to_owned(), "1".to_owned()];
        let err = draw_one(&deck, &exclude).unwrap_err();
        match err.downcast_ref::<BoardError>() {
            Some(BoardError::NoCardsAvailable { wanted: 1, available: 0 }) => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn draw_many_fails_when_pool_is_too_small() {
        let deck = deck(5);
        let err = draw_many(&deck, 6, &[]).unwrap_err();
        assert!(err.to_string().contains("not enough available cards"));
    }

    #[test]
    fn drawing_zero_cards_is_fine() {
        let deck = deck(1);
        assert!(draw_many(&deck, 0, &[]).unwrap().is_empty());
    }
}
