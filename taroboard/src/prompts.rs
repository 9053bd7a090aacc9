//! Reading-prompt text for pasting into an AI chat.
//!
//! The output is a fixed Korean template: the user's question, one line
//! naming the deck, one line per slot listing the drawn card and its
//! orientation, and a closing request for an interpretation. Spreads can
//! adjust the deck-line prefix and cards intro through their
//! [`PromptSpec`](crate::spreads::PromptSpec).

use crate::{cards::Deck, spreads::Spread, state::DrawState};

/// Shown in place of a question the user never typed.
const NO_QUESTION: &str = "(질문 내용 없음)";

/// Build the reading prompt for a fully drawn board.
///
/// Returns `None` while any slot is still empty or names a code the deck
/// does not know, so callers can keep showing a "draw all cards first"
/// placeholder instead of a half-built prompt. Only a 180° angle on a
/// reversible deck counts as reversed; sideways cards read as upright.
pub fn build_prompt(
    question: &str,
    deck: &Deck,
    spread: &Spread,
    state: &DrawState,
) -> Option<String> {
    if spread.slots.is_empty() || state.slots.len() != spread.slots.len() {
        return None;
    }

    let mut lines = Vec::with_capacity(spread.slots.len());
    for (slot, drawn) in spread.slots.iter().zip(&state.slots) {
        let card = deck.card_by_code(drawn.code.as_deref()?)?;
        let reversed = deck.reversible && drawn.angle.rem_euclid(360) == 180;
        let orientation = if reversed { "역방향" } else { "정방향" };
        lines.push(format!("- {}: {} ({})", slot.label, card.display_name(), orientation));
    }

    let question = question.trim();
    let question = if question.is_empty() { NO_QUESTION } else { question };
    let deck_line = format!(
        "{} {}이고, {}",
        spread.prompt.deck_line_prefix, deck.name, spread.prompt.cards_intro
    );

    Some(format!(
        "내 질문은 다음과 같아:\n{}\n\n{}\n{}\n\n\
         이 카드들을 바탕으로 내 질문에 대한 답변을 해주고, 카드에 대한 조언도 함께 해줘.",
        question,
        deck_line,
        lines.join("\n")
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spreads::test::overlap_spread;

    fn deck() -> Deck {
        serde_json::from_value(serde_json::json!({
            "id": "testdeck",
            "name": "Test Deck",
            "image_dir": "images/testdeck",
            "cards": [
                { "code": "0", "korean": "바보" },
                { "code": "1", "korean": "마법사" },
                { "code": "2", "korean": "여사제" },
            ],
        }))
        .unwrap()
    }

    fn full_state(deck: &Deck, spread: &Spread) -> DrawState {
        let mut state = DrawState::empty(deck, spread);
        for (idx, slot) in state.slots.iter_mut().enumerate() {
            slot.code = Some(idx.to_string());
            slot.angle = 0;
        }
        state
    }

    #[test]
    fn incomplete_boards_yield_no_prompt() {
        let deck = deck();
        let spread = overlap_spread();
        let mut state = full_state(&deck, &spread);
        state.slots[1].code = None;
        assert_eq!(None, build_prompt("q", &deck, &spread, &state));
    }

    #[test]
    fn unknown_codes_yield_no_prompt() {
        let deck = deck();
        let spread = overlap_spread();
        let mut state = full_state(&deck, &spread);
        state.slots[0].code = Some("99".to_owned());
        assert_eq!(None, build_prompt("q", &deck, &spread, &state));
    }

    #[test]
    fn full_boards_produce_the_template() {
        let deck = deck();
        let spread = overlap_spread();
        let mut state = full_state(&deck, &spread);
        state.slots[1].angle = 180;
        let prompt = build_prompt("오늘의 운세는?", &deck, &spread, &state).unwrap();
        assert!(prompt.starts_with("내 질문은 다음과 같아:\n오늘의 운세는?\n\n"));
        assert!(prompt.contains("사용한 덱은 Test Deck이고, 뽑은 카드는 아래와 같아."));
        assert!(prompt.contains("- Base: 0. 바보 (정방향)"));
        assert!(prompt.contains("- Cross: 1. 마법사 (역방향)"));
        assert!(prompt.ends_with("카드에 대한 조언도 함께 해줘."));
    }

    #[test]
    fn blank_questions_get_a_placeholder() {
        let deck = deck();
        let spread = overlap_spread();
        let state = full_state(&deck, &spread);
        let prompt = build_prompt("   ", &deck, &spread, &state).unwrap();
        assert!(prompt.contains(NO_QUESTION));
    }

    #[test]
    fn sideways_and_non_reversible_cards_read_upright() {
        let mut deck = deck();
        let spread = overlap_spread();
        let mut state = full_state(&deck, &spread);
        state.slots[1].angle = 90;
        let prompt = build_prompt("q", &deck, &spread, &state).unwrap();
        assert!(prompt.contains("- Cross: 1. 마법사 (정방향)"));

        deck.reversible = false;
        state.slots[1].angle = 180;
        let prompt = build_prompt("q", &deck, &spread, &state).unwrap();
        assert!(prompt.contains("- Cross: 1. 마법사 (정방향)"));
    }
}
