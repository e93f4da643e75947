use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

/// A JSON object as returned by the recovery routine
pub type JsonMap = Map<String, Value>;

type Strategy = fn(&str) -> Option<Value>;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)```(?:json)?\s*([\s\S]*?)```").expect("fenced block pattern is valid")
});

/// Ordered extraction strategies; the first one that yields a value wins.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("fenced_block", from_fenced_block),
    ("whole_text", from_whole_text),
    ("embedded_span", from_embedded_span),
    ("relaxed_whole_text", from_relaxed_whole_text),
];

/// Best-effort JSON extraction for language model output
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonResponseParser;

impl JsonResponseParser {
    /// Recover a JSON object from free-form model text.
    ///
    /// Never fails: when nothing usable is found an empty map is returned.
    /// Non-object values are wrapped as `{"data": value}`.
    pub fn recover(text: &str) -> JsonMap {
        Self::try_recover(text).unwrap_or_default()
    }

    /// Same as [`recover`](Self::recover) but reports total failure as `None`.
    pub fn try_recover(text: &str) -> Option<JsonMap> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        for (name, strategy) in STRATEGIES {
            if let Some(value) = strategy(trimmed) {
                debug!(strategy = name, "Recovered JSON from model response");
                return Some(into_map(value));
            }
        }

        debug!(
            response_length = text.len(),
            "No JSON could be recovered from model response"
        );
        None
    }
}

fn into_map(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    }
}

fn parse_strict(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

fn parse_relaxed(text: &str) -> Option<Value> {
    json5::from_str::<Value>(text).ok()
}

fn parse_strict_then_relaxed(text: &str) -> Option<Value> {
    parse_strict(text).or_else(|| parse_relaxed(text))
}

fn from_fenced_block(text: &str) -> Option<Value> {
    let captures = FENCED_BLOCK.captures(text)?;
    let fenced = captures.get(1)?.as_str().trim();
    if fenced.is_empty() {
        return None;
    }
    parse_strict_then_relaxed(fenced)
}

fn from_whole_text(text: &str) -> Option<Value> {
    parse_strict(text)
}

fn from_embedded_span(text: &str) -> Option<Value> {
    let candidate = widest_span(text, '{', '}').or_else(|| widest_span(text, '[', ']'))?;
    parse_strict_then_relaxed(candidate)
}

fn from_relaxed_whole_text(text: &str) -> Option<Value> {
    parse_relaxed(text)
}

/// Slice from the first `open` to the last `close`, inclusive
fn widest_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}
