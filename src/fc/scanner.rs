use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::{Map, Value};

/// An opening brace up to the next closing brace, with at least one
/// character between them.
/// Objects containing nested objects are never matched whole.
static FLAT_OBJECT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\{[^}]+\}").ok());

/// A JSON object found in free text, with its byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateObject {
    pub start: usize,
    pub end: usize,
    pub object: Map<String, Value>,
}

/// Every flat JSON object in `text`, in order of appearance.
///
/// Spans that are not valid JSON, or are JSON but not an object, are dropped.
#[must_use]
pub fn candidate_objects(text: &str) -> Vec<CandidateObject> {
    let Some(pattern) = FLAT_OBJECT.as_ref() else {
        return Vec::new();
    };
    if memchr::memchr(b'{', text.as_bytes()).is_none() {
        return Vec::new();
    }

    pattern
        .find_iter(text)
        .filter_map(|span| match serde_json::from_str::<Value>(span.as_str()) {
            Ok(Value::Object(object)) => Some(CandidateObject {
                start: span.start(),
                end: span.end(),
                object,
            }),
            Ok(_) => None,
            Err(err) => {
                tracing::trace!(candidate = span.as_str(), error = %err, "ignoring non-JSON brace span");
                None
            }
        })
        .collect()
}
