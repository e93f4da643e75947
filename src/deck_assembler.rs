use sha1::{Digest, Sha1};
use std::collections::HashMap;

use crate::models::{Flashcard, FlashcardsResponse};

const LINE_BREAK: &str = "<br/>";
const MATCHING_DEFAULT_QUESTION: &str = "Match the following";

/// Deterministic 32-bit id for a deck or note template name.
///
/// First 8 hex characters of the SHA-1 digest, read as an unsigned integer.
pub fn stable_id(name: &str) -> u32 {
    let digest = Sha1::digest(name.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Presentation-ready fields of one note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNote {
    pub front: String,
    pub back: String,
    pub extra: String,
}

impl RenderedNote {
    fn new(front: impl Into<String>, back: impl Into<String>, extra: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
            extra: extra.into(),
        }
    }

    pub fn fields(&self) -> [&str; 3] {
        [self.front.as_str(), self.back.as_str(), self.extra.as_str()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledDeck {
    pub id: u32,
    pub name: String,
    pub notes: Vec<RenderedNote>,
}

impl AssembledDeck {
    fn new(name: String) -> Self {
        Self {
            id: stable_id(&name),
            name,
            notes: Vec::new(),
        }
    }
}

/// Decks ready to be written, in first-seen order
#[derive(Debug, Clone, PartialEq)]
pub struct DeckSet {
    /// The run's deck name; scopes the shared note template id
    pub name: String,
    pub decks: Vec<AssembledDeck>,
}

impl DeckSet {
    pub fn note_count(&self) -> usize {
        self.decks.iter().map(|deck| deck.notes.len()).sum()
    }
}

fn numbered_options(question: &str, options: &[String]) -> String {
    let listed = options
        .iter()
        .enumerate()
        .map(|(index, option)| format!("{}. {}", index + 1, option))
        .collect::<Vec<_>>()
        .join(LINE_BREAK);
    format!("{question}{LINE_BREAK}{LINE_BREAK}{listed}")
}

/// 1-based label for a 0-based index; widened so no `i64` can overflow
fn one_based(index: i64) -> i128 {
    i128::from(index) + 1
}

fn trimmed(explanation: &Option<String>) -> String {
    explanation.as_deref().unwrap_or_default().trim().to_string()
}

/// Flatten a card into its question/answer/extra fields
pub fn render_card(card: &Flashcard) -> RenderedNote {
    match card {
        Flashcard::Qa {
            question,
            answer,
            explanation,
        } => RenderedNote::new(
            question.as_str(),
            answer.as_str(),
            explanation.clone().unwrap_or_default(),
        ),
        Flashcard::SingleChoice {
            question,
            options,
            correct_option,
            explanation,
        } => RenderedNote::new(
            numbered_options(question, options),
            format!("Correct: {}", one_based(*correct_option)),
            trimmed(explanation),
        ),
        Flashcard::MultipleChoice {
            question,
            options,
            correct_options,
            explanation,
        } => {
            let correct = correct_options
                .iter()
                .map(|&index| one_based(index).to_string())
                .collect::<Vec<_>>()
                .join(", ");
            RenderedNote::new(
                numbered_options(question, options),
                format!("Correct: {correct}"),
                trimmed(explanation),
            )
        }
        Flashcard::Matching { question, pairs } => {
            let front = question
                .as_deref()
                .filter(|q| !q.is_empty())
                .unwrap_or(MATCHING_DEFAULT_QUESTION);
            let back = pairs
                .iter()
                .map(|pair| format!("{} → {}", pair.left, pair.right))
                .collect::<Vec<_>>()
                .join(LINE_BREAK);
            RenderedNote::new(front, back, "")
        }
    }
}

/// Group cards into hierarchical decks, merging decks that share a path.
///
/// An input without decks yields one empty deck named `deck_name`.
pub fn assemble(flashcards: &FlashcardsResponse, deck_name: &str) -> DeckSet {
    let mut decks: Vec<AssembledDeck> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for deck_cards in &flashcards.decks {
        let path = deck_cards.deck_path();
        let position = *positions.entry(path.clone()).or_insert_with(|| {
            decks.push(AssembledDeck::new(path));
            decks.len() - 1
        });

        decks[position]
            .notes
            .extend(deck_cards.cards.iter().map(render_card));
    }

    if decks.is_empty() {
        decks.push(AssembledDeck::new(deck_name.to_string()));
    }

    DeckSet {
        name: deck_name.to_string(),
        decks,
    }
}
