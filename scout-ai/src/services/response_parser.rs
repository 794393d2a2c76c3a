//! Resilient response parser
//!
//! Converts free-form model output into a JSON object. The model is asked
//! for pure JSON but may wrap it in prose or markdown fences, truncate it,
//! or refuse outright.
//!
//! **Attempts (first success wins):**
//! 1. Whole text as JSON
//! 2. Interior of a fenced code block (with or without a `json` hint)
//! 3. Outermost balanced `{ … }` span embedded in the text
//! 4. Fallback template plus the raw text under `raw_response`
//!
//! A recovered object sharing no key with the template (for instance a
//! nested fragment of a truncated answer) also keeps the raw text.
//!
//! Parsing never fails. After any attempt, fields missing from the result
//! are filled from the fallback template, and list-shaped template fields
//! are coerced to lists.

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::models::classification::{fields, UNKNOWN_CATEGORY};

/// Default structure returned when nothing can be recovered
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackTemplate {
    fields: Map<String, Value>,
}

impl FallbackTemplate {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Template for image classification responses
    pub fn classification() -> Self {
        let value = json!({
            fields::BROAD_CATEGORY: UNKNOWN_CATEGORY,
            fields::SPECIFIC_ITEM: UNKNOWN_CATEGORY,
            fields::IMPRESSION_TAGS: [],
            fields::OBJECT_TAGS: [],
            fields::REASON: "解析に失敗しました",
            fields::PURPOSE: "",
            fields::FEATURES: "",
        });
        Self::new(into_object(value))
    }

    /// Template for vocabulary/hierarchy formatting responses (empty structure)
    pub fn formatting() -> Self {
        Self::new(Map::new())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Which attempt produced the structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMethod {
    Direct,
    Fenced,
    Embedded,
    Fallback,
}

/// Parsed (and normalized) response
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub value: Map<String, Value>,
    pub method: ParseMethod,
}

impl ParseOutcome {
    pub fn is_fallback(&self) -> bool {
        self.method == ParseMethod::Fallback
    }
}

/// Parse raw model text into a JSON object; never fails
pub fn parse_response(raw: &str, template: &FallbackTemplate) -> ParseOutcome {
    let (value, method) = match recover_object(raw) {
        Some((mut value, method)) => {
            debug!(?method, "Recovered structured response");
            if unrelated_to(&value, template) {
                warn!(
                    ?method,
                    length = raw.len(),
                    "Recovered object has none of the expected fields, keeping raw text"
                );
                value.insert(
                    fields::RAW_RESPONSE.to_string(),
                    Value::String(raw.to_string()),
                );
            }
            (value, method)
        }
        None => {
            warn!(
                length = raw.len(),
                "No structured data in model response, using fallback"
            );
            let mut value = template.fields.clone();
            value.insert(
                fields::RAW_RESPONSE.to_string(),
                Value::String(raw.to_string()),
            );
            (value, ParseMethod::Fallback)
        }
    };

    ParseOutcome {
        value: normalize(value, template),
        method,
    }
}

fn recover_object(raw: &str) -> Option<(Map<String, Value>, ParseMethod)> {
    if let Some(value) = parse_object(raw) {
        return Some((value, ParseMethod::Direct));
    }

    for block in fenced_blocks(raw) {
        if let Some(value) = parse_object(block) {
            return Some((value, ParseMethod::Fenced));
        }
    }

    embedded_object(raw).map(|value| (value, ParseMethod::Embedded))
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)```")
            .unwrap_or_else(|e| panic!("invalid fence pattern: {}", e))
    })
}

/// Interiors of fenced code blocks in order of appearance
fn fenced_blocks(raw: &str) -> impl Iterator<Item = &str> {
    fence_pattern()
        .captures_iter(raw)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
}

/// Outermost-first balanced brace span that parses as an object
fn embedded_object(raw: &str) -> Option<Map<String, Value>> {
    balanced_spans(raw)
        .into_iter()
        .find_map(|(start, end)| parse_object(&raw[start..end]))
}

/// Byte ranges of every balanced `{ … }` span, ordered by start, found in
/// one forward pass. Quotes only open string literals inside braces, so
/// prose apostrophes and quotes cannot swallow the text that follows.
/// Spans left open at the end (a truncated response) are dropped.
fn balanced_spans(raw: &str) -> Vec<(usize, usize)> {
    let mut open: Vec<usize> = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in raw.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(index),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, index + 1));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable_by_key(|&(start, _)| start);
    spans
}

/// True when a non-empty template shares no key with the recovered object
fn unrelated_to(value: &Map<String, Value>, template: &FallbackTemplate) -> bool {
    !template.fields.is_empty() && !template.fields.keys().any(|key| value.contains_key(key))
}

fn normalize(mut value: Map<String, Value>, template: &FallbackTemplate) -> Map<String, Value> {
    for (key, default) in &template.fields {
        match value.get(key) {
            None | Some(Value::Null) => {
                value.insert(key.clone(), default.clone());
            }
            Some(existing) if default.is_array() && !existing.is_array() => {
                value.insert(key.clone(), Value::Array(Vec::new()));
            }
            Some(_) => {}
        }
    }
    value
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
