//! Classification result model
//!
//! A result is built once from a parsed (or fallback-filled) response and is
//! never mutated afterwards. Corrections are new records with new ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use scout_common::taxonomy::{resolve_labels, Taxonomy};

/// Output field names the model is asked to produce
pub mod fields {
    pub const BROAD_CATEGORY: &str = "大分類";
    pub const SPECIFIC_ITEM: &str = "小項目";
    pub const IMPRESSION_TAGS: &str = "印象タグ";
    pub const OBJECT_TAGS: &str = "オブジェクトタグ";
    pub const REASON: &str = "判定理由";
    pub const PURPOSE: &str = "撮影用途";
    pub const FEATURES: &str = "特徴";
    /// Few-shot answers only: 1-10 score
    pub const CONFIDENCE: &str = "確信度";
    /// Few-shot answers only: example the model leaned on
    pub const SIMILAR_EXAMPLE: &str = "類似した例";
    /// Added by the parser when no structure could be recovered
    pub const RAW_RESPONSE: &str = "raw_response";
}

/// Category value when the response could not be parsed
pub const UNKNOWN_CATEGORY: &str = "不明";

/// Category value when the remote call itself failed
pub const ERROR_CATEGORY: &str = "エラー";

pub const MAX_IMPRESSION_TAGS: usize = 5;
pub const MAX_OBJECT_TAGS: usize = 8;

/// Confidence scores are clamped to this range
pub const CONFIDENCE_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

/// Error reasons are cut to this many characters
const ERROR_REASON_CHARS: usize = 30;

/// Persisted classification of one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub analysis_id: String,
    pub subject_label: String,
    pub broad_category: String,
    pub specific_item: String,
    pub impression_tags: Vec<String>,
    pub object_tags: Vec<String>,
    pub reason: String,
    pub purpose: String,
    pub features: String,
    pub image_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similar_example: Option<String>,
    /// Unparseable model output kept for inspection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

/// Tag slugs resolved to labels for display
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagLabels {
    pub impression: Vec<String>,
    pub object: Vec<String>,
}

impl ClassificationResult {
    /// Build from a normalized response mapping (every fallback field present)
    pub fn from_fields(
        analysis_id: String,
        subject_label: String,
        parsed: &Map<String, Value>,
        image_count: u32,
        analyzed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            analysis_id,
            subject_label,
            broad_category: text_field(parsed, fields::BROAD_CATEGORY),
            specific_item: text_field(parsed, fields::SPECIFIC_ITEM),
            impression_tags: tag_field(parsed, fields::IMPRESSION_TAGS, MAX_IMPRESSION_TAGS),
            object_tags: tag_field(parsed, fields::OBJECT_TAGS, MAX_OBJECT_TAGS),
            reason: text_field(parsed, fields::REASON),
            purpose: text_field(parsed, fields::PURPOSE),
            features: text_field(parsed, fields::FEATURES),
            image_count,
            confidence: confidence_field(parsed),
            similar_example: Some(text_field(parsed, fields::SIMILAR_EXAMPLE))
                .filter(|s| !s.trim().is_empty()),
            raw_response: parsed
                .get(fields::RAW_RESPONSE)
                .and_then(Value::as_str)
                .map(str::to_string),
            analyzed_at,
        }
    }

    /// Placeholder recorded when the remote call failed
    pub fn error_placeholder(
        analysis_id: String,
        subject_label: String,
        error_message: &str,
        image_count: u32,
        analyzed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            analysis_id,
            subject_label,
            broad_category: ERROR_CATEGORY.to_string(),
            specific_item: ERROR_CATEGORY.to_string(),
            impression_tags: Vec::new(),
            object_tags: Vec::new(),
            reason: error_message.chars().take(ERROR_REASON_CHARS).collect(),
            purpose: String::new(),
            features: String::new(),
            image_count,
            confidence: None,
            similar_example: None,
            raw_response: None,
            analyzed_at,
        }
    }

    pub fn is_error(&self) -> bool {
        self.broad_category == ERROR_CATEGORY
    }

    /// Resolve tag slugs against a taxonomy; unknown slugs are dropped
    pub fn tag_labels(&self, taxonomy: &Taxonomy) -> TagLabels {
        TagLabels {
            impression: resolve_labels(&taxonomy.impression_tags, &self.impression_tags),
            object: resolve_labels(&taxonomy.object_tags, &self.object_tags),
        }
    }

    /// Row of the batch JSON report (Japanese column names)
    pub fn to_report_json(&self) -> Value {
        json!({
            "フォルダ名": self.subject_label,
            fields::BROAD_CATEGORY: self.broad_category,
            fields::SPECIFIC_ITEM: self.specific_item,
            fields::REASON: self.reason,
            "画像枚数": self.image_count,
        })
    }
}

fn text_field(parsed: &Map<String, Value>, key: &str) -> String {
    match parsed.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Score from a number or numeric string ("8", "8/10", 7.6), clamped to 1-10
fn confidence_field(parsed: &Map<String, Value>) -> Option<u8> {
    let score = match parsed.get(fields::CONFIDENCE)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.split('/').next()?.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !score.is_finite() {
        return None;
    }
    let clamped = score
        .round()
        .clamp(f64::from(*CONFIDENCE_RANGE.start()), f64::from(*CONFIDENCE_RANGE.end()));
    Some(clamped as u8)
}

/// String members of a list field, de-duplicated in order and capped
fn tag_field(parsed: &Map<String, Value>, key: &str, cap: usize) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    if let Some(Value::Array(items)) = parsed.get(key) {
        for slug in items.iter().filter_map(Value::as_str) {
            let slug = slug.trim();
            if !slug.is_empty() && !tags.iter().any(|t| t == slug) {
                tags.push(slug.to_string());
            }
        }
    }
    tags.truncate(cap);
    tags
}
