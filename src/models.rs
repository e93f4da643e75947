use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::{PipelineResult, schema_error};
use crate::json_recovery::JsonMap;
use crate::log_validation;

/// Separator between topic and subtopic in hierarchical deck names
pub const DECK_PATH_SEPARATOR: &str = "::";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtopic {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_points: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub title: String,
    #[serde(default)]
    pub subtopics: Vec<Subtopic>,
}

/// Topic outline returned by the first model call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicsResponse {
    #[serde(default)]
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingPair {
    pub left: String,
    pub right: String,
}

/// A single flashcard, discriminated by its `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Flashcard {
    Qa {
        question: String,
        answer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    SingleChoice {
        question: String,
        options: Vec<String>,
        correct_option: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    MultipleChoice {
        question: String,
        options: Vec<String>,
        correct_options: Vec<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    Matching {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        question: Option<String>,
        pairs: Vec<MatchingPair>,
    },
}

impl Flashcard {
    /// The discriminator value as it appears in JSON
    pub fn kind(&self) -> &'static str {
        match self {
            Flashcard::Qa { .. } => "qa",
            Flashcard::SingleChoice { .. } => "single_choice",
            Flashcard::MultipleChoice { .. } => "multiple_choice",
            Flashcard::Matching { .. } => "matching",
        }
    }
}

/// Cards for one topic or topic/subtopic pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckCards {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtopic: Option<String>,
    pub cards: Vec<Flashcard>,
}

impl DeckCards {
    /// Hierarchical deck name: `topic` or `topic::subtopic`
    pub fn deck_path(&self) -> String {
        match self.subtopic.as_deref() {
            Some(subtopic) if !subtopic.is_empty() => {
                format!("{}{}{}", self.topic, DECK_PATH_SEPARATOR, subtopic)
            }
            _ => self.topic.clone(),
        }
    }
}

/// Flat deck collection returned by the second model call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlashcardsResponse {
    #[serde(default)]
    pub decks: Vec<DeckCards>,
}

impl FlashcardsResponse {
    pub fn card_count(&self) -> usize {
        self.decks.iter().map(|deck| deck.cards.len()).sum()
    }
}

/// How out-of-range answer indices on choice cards are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPolicy {
    /// Keep indices as given
    #[default]
    Permissive,
    /// Fail the batch on any index outside `options`
    Reject,
    /// Clamp single answers into range and drop out-of-range multi answers
    Clamp,
}

impl IndexPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "permissive" | "ignore" | "lenient" => Some(IndexPolicy::Permissive),
            "reject" | "strict" => Some(IndexPolicy::Reject),
            "clamp" | "coerce" => Some(IndexPolicy::Clamp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    pub index_policy: IndexPolicy,
}

impl ValidationOptions {
    pub fn with_index_policy(index_policy: IndexPolicy) -> Self {
        Self { index_policy }
    }
}

/// Validate a recovered map as a topic outline
pub fn validate_topics(map: JsonMap) -> PipelineResult<TopicsResponse> {
    let topics: TopicsResponse = serde_json::from_value(Value::Object(map)).map_err(|e| {
        log_validation!(failure, "topics", error = e);
        schema_error(format!("invalid topics response: {}", e))
    })?;

    log_validation!(
        success,
        "topics",
        format!("{} topics validated", topics.topics.len())
    );
    Ok(topics)
}

/// Validate a recovered map as flashcard decks with the default options
pub fn validate_flashcards(map: JsonMap) -> PipelineResult<FlashcardsResponse> {
    validate_flashcards_with(map, &ValidationOptions::default())
}

/// Validate a recovered map as flashcard decks.
///
/// Any malformed card fails the whole batch.
pub fn validate_flashcards_with(
    map: JsonMap,
    options: &ValidationOptions,
) -> PipelineResult<FlashcardsResponse> {
    let mut response: FlashcardsResponse =
        serde_json::from_value(Value::Object(map)).map_err(|e| {
            log_validation!(failure, "flashcards", error = e);
            schema_error(format!("invalid flashcards response: {}", e))
        })?;

    for deck in &mut response.decks {
        let path = deck.deck_path();
        for (index, card) in deck.cards.iter_mut().enumerate() {
            check_card(card, options.index_policy).map_err(|reason| {
                let error = schema_error(format!(
                    "deck '{}' card {} ({}): {}",
                    path,
                    index,
                    card.kind(),
                    reason
                ));
                log_validation!(failure, "flashcards", error = error);
                error
            })?;
        }
    }

    log_validation!(
        success,
        "flashcards",
        format!(
            "{} decks with {} cards validated",
            response.decks.len(),
            response.card_count()
        )
    );
    Ok(response)
}

fn in_range(index: i64, len: usize) -> bool {
    usize::try_from(index).is_ok_and(|i| i < len)
}

fn check_card(card: &mut Flashcard, policy: IndexPolicy) -> Result<(), String> {
    match card {
        Flashcard::Qa { .. } => Ok(()),
        Flashcard::SingleChoice {
            options,
            correct_option,
            ..
        } => {
            if options.is_empty() {
                return Err("options must not be empty".to_string());
            }
            if in_range(*correct_option, options.len()) {
                return Ok(());
            }
            match policy {
                IndexPolicy::Permissive => Ok(()),
                IndexPolicy::Reject => Err(format!(
                    "correct_option {} is outside 0..{}",
                    correct_option,
                    options.len()
                )),
                IndexPolicy::Clamp => {
                    let last = options.len() as i64 - 1;
                    *correct_option = (*correct_option).clamp(0, last);
                    Ok(())
                }
            }
        }
        Flashcard::MultipleChoice {
            options,
            correct_options,
            ..
        } => {
            let len = options.len();
            let out_of_range: Vec<i64> = correct_options
                .iter()
                .copied()
                .filter(|&i| !in_range(i, len))
                .collect();
            if out_of_range.is_empty() {
                return Ok(());
            }
            match policy {
                IndexPolicy::Permissive => Ok(()),
                IndexPolicy::Reject => Err(format!(
                    "correct_options {:?} are outside 0..{}",
                    out_of_range, len
                )),
                IndexPolicy::Clamp => {
                    correct_options.retain(|&i| in_range(i, len));
                    Ok(())
                }
            }
        }
        Flashcard::Matching { pairs, .. } => {
            if pairs.is_empty() {
                Err("pairs must not be empty".to_string())
            } else {
                Ok(())
            }
        }
    }
}

/// Response schema hint for the topic outline call
pub fn topics_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "topics": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "subtopics": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "title": { "type": "string" },
                                    "summary": { "type": "string" },
                                    "key_points": { "type": "array", "items": { "type": "string" } }
                                },
                                "required": ["title"]
                            }
                        }
                    },
                    "required": ["title", "subtopics"]
                }
            }
        },
        "required": ["topics"]
    })
}

/// Response schema hint for the flashcard call; card variants are flattened
pub fn flashcards_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "decks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "topic": { "type": "string" },
                        "subtopic": { "type": "string" },
                        "cards": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "type": {
                                        "type": "string",
                                        "enum": ["qa", "single_choice", "multiple_choice", "matching"]
                                    },
                                    "question": { "type": "string" },
                                    "answer": { "type": "string" },
                                    "explanation": { "type": "string" },
                                    "options": { "type": "array", "items": { "type": "string" } },
                                    "correct_option": { "type": "integer" },
                                    "correct_options": { "type": "array", "items": { "type": "integer" } },
                                    "pairs": {
                                        "type": "array",
                                        "items": {
                                            "type": "object",
                                            "properties": {
                                                "left": { "type": "string" },
                                                "right": { "type": "string" }
                                            },
                                            "required": ["left", "right"]
                                        }
                                    }
                                },
                                "required": ["type"]
                            }
                        }
                    },
                    "required": ["topic", "cards"]
                }
            }
        },
        "required": ["decks"]
    })
}
