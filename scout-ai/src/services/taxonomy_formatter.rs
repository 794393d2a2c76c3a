//! Free-text → taxonomy structure formatting
//!
//! Sends user-typed text to the model (text only, low temperature) and turns
//! the answer into a hierarchy or vocabulary. Responses go through the
//! resilient parser with an empty fallback; a fallback, or a structure with
//! no usable entries, is a formatting failure and leaves the taxonomy alone.

use scout_common::config::ModelConfig;
use scout_common::taxonomy::{merge_hierarchy, merge_vocabulary, MergeMode};
use scout_common::{Hierarchy, TagEntry, Taxonomy, Vocabulary};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::FormatTarget;
use crate::services::gemini_client::{
    GenerationOptions, GenerationRequest, GenerativeModel, ModelError,
};
use crate::services::prompt_builder::build_format_prompt;
use crate::services::response_parser::{parse_response, FallbackTemplate};

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Nothing to format")]
    EmptyInput,

    #[error(transparent)]
    Model(#[from] ModelError),

    /// Model answered but nothing usable could be extracted
    #[error("Could not extract a structure from the model response")]
    Unrecognized { raw_response: String },
}

/// Structure extracted from a formatting response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FormattedStructure {
    Hierarchy(Hierarchy),
    Vocabulary(Vocabulary),
}

/// Ask the model to organise `raw_text` into the `target` structure
pub async fn format_text(
    model: &dyn GenerativeModel,
    config: &ModelConfig,
    target: FormatTarget,
    raw_text: &str,
) -> Result<FormattedStructure, FormatError> {
    let raw_text = raw_text.trim();
    if raw_text.is_empty() {
        return Err(FormatError::EmptyInput);
    }

    let request = GenerationRequest {
        prompt: build_format_prompt(target, raw_text),
        images: Vec::new(),
        options: GenerationOptions::json(config.formatting_temperature, config.max_output_tokens),
        examples: None,
    };
    let response = model.generate(request).await?;

    let outcome = parse_response(&response, &FallbackTemplate::formatting());
    if outcome.is_fallback() {
        return Err(FormatError::Unrecognized {
            raw_response: response,
        });
    }

    let structure = match target {
        FormatTarget::Hierarchy => {
            let hierarchy = hierarchy_from_json(&outcome.value);
            (!hierarchy.is_empty()).then_some(FormattedStructure::Hierarchy(hierarchy))
        }
        FormatTarget::ImpressionTags | FormatTarget::ObjectTags => {
            let vocabulary = vocabulary_from_json(&outcome.value);
            (!vocabulary.is_empty()).then_some(FormattedStructure::Vocabulary(vocabulary))
        }
    };

    match structure {
        Some(structure) => {
            tracing::info!(?target, "Formatted taxonomy text");
            Ok(structure)
        }
        None => {
            tracing::warn!(?target, "Formatting response had no usable entries");
            Err(FormatError::Unrecognized {
                raw_response: response,
            })
        }
    }
}

/// Apply a formatted structure to the matching part of `taxonomy`
pub fn apply_structure(
    taxonomy: &mut Taxonomy,
    target: FormatTarget,
    structure: FormattedStructure,
    mode: MergeMode,
) {
    match (target, structure) {
        (FormatTarget::Hierarchy, FormattedStructure::Hierarchy(hierarchy)) => {
            merge_hierarchy(&mut taxonomy.hierarchy, hierarchy, mode)
        }
        (FormatTarget::ImpressionTags, FormattedStructure::Vocabulary(vocabulary)) => {
            merge_vocabulary(&mut taxonomy.impression_tags, vocabulary, mode)
        }
        (FormatTarget::ObjectTags, FormattedStructure::Vocabulary(vocabulary)) => {
            merge_vocabulary(&mut taxonomy.object_tags, vocabulary, mode)
        }
        (target, _) => {
            tracing::warn!(?target, "Formatted structure does not match target, ignored");
        }
    }
}

/// `category → [item, …]`; non-list values and non-string items are skipped
fn hierarchy_from_json(value: &Map<String, Value>) -> Hierarchy {
    value
        .iter()
        .filter_map(|(category, items)| {
            let items: Vec<String> = items
                .as_array()?
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect();
            let category = category.trim();
            (!category.is_empty()).then(|| (category.to_string(), items))
        })
        .collect()
}

/// `group → [{label, slug}, …]`; entries without both fields are skipped
fn vocabulary_from_json(value: &Map<String, Value>) -> Vocabulary {
    value
        .iter()
        .filter_map(|(group, entries)| {
            let entries: Vec<TagEntry> = entries
                .as_array()?
                .iter()
                .filter_map(|entry| {
                    let label = entry.get("label")?.as_str()?.trim();
                    let slug = normalize_slug(entry.get("slug")?.as_str()?);
                    (!label.is_empty() && !slug.is_empty()).then(|| TagEntry::new(label, slug))
                })
                .collect();
            (!entries.is_empty()).then(|| (group.trim().to_string(), entries))
        })
        .collect()
}

/// Lower-case ASCII, digits and underscores
fn normalize_slug(slug: &str) -> String {
    let mapped: String = slug
        .trim()
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => Some(c),
            'A'..='Z' => Some(c.to_ascii_lowercase()),
            ' ' | '-' => Some('_'),
            _ => None,
        })
        .collect();
    mapped.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_hierarchy_from_json_skips_bad_values() {
        let hierarchy = hierarchy_from_json(&object(json!({
            "飲食店": ["カフェ", 3, " BAR "],
            "note": "not a list",
        })));
        assert_eq!(hierarchy.len(), 1);
        assert_eq!(hierarchy["飲食店"], vec!["カフェ", "BAR"]);
    }

    #[test]
    fn test_vocabulary_from_json() {
        let vocabulary = vocabulary_from_json(&object(json!({
            "雰囲気": [
                {"label": "モダン", "slug": "modern"},
                {"label": "レトロ", "slug": "Retro-Style"},
                {"label": "欠け"},
            ],
            "空": [],
        })));
        assert_eq!(vocabulary.len(), 1);
        assert_eq!(
            vocabulary["雰囲気"],
            vec![TagEntry::new("モダン", "modern"), TagEntry::new("レトロ", "retro_style")]
        );
    }

    #[test]
    fn test_normalize_slug() {
        assert_eq!(normalize_slug(" Wood Floor "), "wood_floor");
        assert_eq!(normalize_slug("観葉植物"), "");
    }

    #[test]
    fn test_apply_merge_into_impressions() {
        let mut taxonomy = Taxonomy::studio_defaults();
        let mut incoming = Vocabulary::new();
        incoming.insert(
            "雰囲気".to_string(),
            vec![TagEntry::new("モダン", "modern"), TagEntry::new("和モダン", "japanese_modern")],
        );

        apply_structure(
            &mut taxonomy,
            FormatTarget::ImpressionTags,
            FormattedStructure::Vocabulary(incoming),
            MergeMode::Merge,
        );

        let slugs: Vec<&str> = taxonomy.impression_tags["雰囲気"]
            .iter()
            .map(|e| e.slug.as_str())
            .collect();
        assert_eq!(slugs.iter().filter(|s| **s == "modern").count(), 1);
        assert_eq!(slugs.last(), Some(&"japanese_modern"));
    }

    #[test]
    fn test_apply_replace_hierarchy() {
        let mut taxonomy = Taxonomy::studio_defaults();
        let mut incoming = Hierarchy::new();
        incoming.insert("倉庫".to_string(), vec!["空き倉庫".to_string()]);

        apply_structure(
            &mut taxonomy,
            FormatTarget::Hierarchy,
            FormattedStructure::Hierarchy(incoming.clone()),
            MergeMode::Replace,
        );
        assert_eq!(taxonomy.hierarchy, incoming);
    }

    #[test]
    fn test_apply_mismatched_target_ignored() {
        let mut taxonomy = Taxonomy::studio_defaults();
        let before = taxonomy.clone();
        apply_structure(
            &mut taxonomy,
            FormatTarget::Hierarchy,
            FormattedStructure::Vocabulary(Vocabulary::new()),
            MergeMode::Replace,
        );
        assert_eq!(taxonomy, before);
    }

    /// Answers every call with the same text
    struct FixedModel(&'static str);

    #[async_trait::async_trait]
    impl GenerativeModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _request: GenerationRequest) -> Result<String, ModelError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_format_keeps_model_key_order() {
        let model = FixedModel(r#"{"公園":["芝生"],"オフィス":["会議室","ロビー"],"自然":["山"]}"#);

        let structure = format_text(&model, &ModelConfig::default(), FormatTarget::Hierarchy, "x")
            .await
            .unwrap();

        let FormattedStructure::Hierarchy(hierarchy) = structure else {
            panic!("expected a hierarchy");
        };
        let keys: Vec<&str> = hierarchy.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["公園", "オフィス", "自然"]);
        assert_eq!(hierarchy["オフィス"], vec!["会議室", "ロビー"]);
    }

    #[tokio::test]
    async fn test_format_keeps_vocabulary_group_order() {
        let model = FixedModel(
            r#"```json
{"色調": [{"label": "暖色", "slug": "warm"}], "雰囲気": [{"label": "モダン", "slug": "modern"}]}
```"#,
        );

        let structure = format_text(&model, &ModelConfig::default(), FormatTarget::ImpressionTags, "x")
            .await
            .unwrap();

        let FormattedStructure::Vocabulary(vocabulary) = structure else {
            panic!("expected a vocabulary");
        };
        let groups: Vec<&str> = vocabulary.keys().map(String::as_str).collect();
        assert_eq!(groups, vec!["色調", "雰囲気"]);
    }
}
