//! Few-shot classification integration tests
//!
//! Example images load from a temporary directory; a scripted model
//! records the request so part order can be checked.

mod helpers;

use std::sync::Arc;

use helpers::{classification_json, memory_pool, pipeline_with, png_bytes, write_png, ScriptedModel};
use scout_ai::services::{
    load_examples, ClassificationRequest, ImageInput, PersistStatus, PreprocessOptions,
    PromptOptions, PromptScope, RemoteFailurePolicy, RequestPart,
};
use scout_common::config::{ExampleEntry, FewShotConfig};
use scout_common::Taxonomy;
use serde_json::json;
use tempfile::TempDir;

fn example_config() -> FewShotConfig {
    let entry = |category: &str, file: &str, caption: &str| ExampleEntry {
        category: category.to_string(),
        file: file.to_string(),
        caption: caption.to_string(),
    };
    FewShotConfig {
        dir: None,
        max_per_category: 1,
        max_dimension: 128,
        examples: vec![
            entry("house_studio", "house_studio_japanese.jpg", "ハウススタジオ（和風）"),
            entry("commercial", "commercial_mall.png", "商業施設（ショッピングモール）"),
            entry("restaurant", "restaurant_cafe.png", "飲食店（カフェ）"),
        ],
    }
}

fn request(scope: PromptScope, count: usize) -> ClassificationRequest {
    ClassificationRequest {
        subject_label: "Kichijoji_Cafe".to_string(),
        images: (0..count)
            .map(|i| ImageInput::Bytes {
                name: format!("target_{}.png", i + 1),
                data: png_bytes(80, 60),
            })
            .collect(),
        taxonomy: Taxonomy::studio_defaults(),
        preprocess: PreprocessOptions {
            max_images: 3,
            max_dimension: 512,
        },
        prompt: PromptOptions {
            scope,
            max_slugs: None,
        },
        on_remote_failure: RemoteFailurePolicy::Abort,
        image_count_override: None,
    }
}

fn few_shot_answer() -> String {
    json!({
        "大分類": "飲食店",
        "小項目": "カフェ",
        "確信度": 8,
        "判定理由": "カウンター席がカフェの例と似ている",
        "類似した例": "飲食店（カフェ）",
    })
    .to_string()
}

#[tokio::test]
async fn test_examples_sent_ahead_of_targets_in_caption_order() {
    let dir = TempDir::new().unwrap();
    // house_studio_japanese.jpg is absent and must be skipped
    write_png(&dir.path().join("commercial_mall.png"), 300, 200);
    write_png(&dir.path().join("restaurant_cafe.png"), 200, 300);
    let examples = load_examples(dir.path(), &example_config());
    assert_eq!(examples.len(), 2);

    let db = memory_pool().await;
    let model = ScriptedModel::replying(&few_shot_answer());
    let pipeline = pipeline_with(model.clone(), db).with_examples(Arc::new(examples));
    assert_eq!(pipeline.examples().len(), 2);

    pipeline
        .classify(request(PromptScope::FewShot, 2))
        .await
        .unwrap();

    let requests = model.requests();
    let parts = requests[0].parts();
    assert_eq!(parts.len(), 8);

    let text = |index: usize| match parts[index] {
        RequestPart::Text(text) => text.to_string(),
        RequestPart::Image(image) => panic!("part {} is image {}", index, image.source),
    };
    let image = |index: usize| match parts[index] {
        RequestPart::Image(image) => image.source.clone(),
        RequestPart::Text(text) => panic!("part {} is text {:?}", index, text),
    };

    assert!(text(0).contains("例示学習セクション"));
    assert_eq!(image(1), "commercial_mall.png");
    assert_eq!(text(2), "→ 分類: 商業施設（ショッピングモール）");
    assert_eq!(image(3), "restaurant_cafe.png");
    assert_eq!(text(4), "→ 分類: 飲食店（カフェ）");
    assert!(text(5).contains("\"確信度\": \"1-10のスコア\""));
    assert!(text(5).contains("以下の2枚の画像"));
    assert_eq!(image(6), "target_1.png");
    assert_eq!(image(7), "target_2.png");
}

#[tokio::test]
async fn test_confidence_and_similar_example_reach_the_stored_result() {
    let db = memory_pool().await;
    let model = ScriptedModel::replying(&few_shot_answer());
    let pipeline = pipeline_with(model, db.clone());

    let outcome = pipeline
        .classify(request(PromptScope::FewShot, 1))
        .await
        .unwrap();

    assert_eq!(outcome.persist, PersistStatus::Inserted);
    assert!(outcome.taxonomy_match);
    assert_eq!(outcome.result.confidence, Some(8));
    assert_eq!(outcome.result.similar_example.as_deref(), Some("飲食店（カフェ）"));
    assert_eq!(outcome.result.raw_response, None);

    let stored = scout_ai::db::analyses::get_by_id(&db, &outcome.result.analysis_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.confidence, Some(8));
    assert_eq!(stored.similar_example.as_deref(), Some("飲食店（カフェ）"));
}

#[tokio::test]
async fn test_few_shot_without_examples_still_classifies() {
    let db = memory_pool().await;
    let model = ScriptedModel::replying(&few_shot_answer());
    let pipeline = pipeline_with(model.clone(), db);

    let outcome = pipeline
        .classify(request(PromptScope::FewShot, 1))
        .await
        .unwrap();
    assert_eq!(outcome.result.broad_category, "飲食店");

    let requests = model.requests();
    let parts = requests[0].parts();
    assert_eq!(parts.len(), 3);
    assert!(matches!(parts[0], RequestPart::Text(intro) if intro.contains("例示学習セクション")));
    assert!(matches!(parts[2], RequestPart::Image(_)));
}

#[tokio::test]
async fn test_full_scope_never_sends_examples() {
    let dir = TempDir::new().unwrap();
    write_png(&dir.path().join("restaurant_cafe.png"), 40, 40);
    let examples = load_examples(dir.path(), &example_config());

    let db = memory_pool().await;
    let model = ScriptedModel::replying(&classification_json("オフィス", "会議室", &[]));
    let pipeline = pipeline_with(model.clone(), db).with_examples(Arc::new(examples));

    let outcome = pipeline
        .classify(request(PromptScope::full(), 1))
        .await
        .unwrap();

    assert!(model.requests()[0].examples.is_none());
    assert_eq!(model.requests()[0].parts().len(), 2);
    assert_eq!(outcome.result.confidence, None);
}
