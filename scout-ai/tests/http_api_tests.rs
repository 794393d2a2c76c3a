//! HTTP API integration tests
//!
//! Requests go through the full router via `tower::ServiceExt::oneshot`.

mod helpers;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use helpers::{classification_json, memory_pool, pipeline_with, png_bytes, ScriptedModel};
use http_body_util::BodyExt;
use scout_ai::services::{GenerativeModel, ModelError};
use scout_ai::{build_router, AppState};
use scout_common::config::ImageConfig;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;

async fn setup(model: Arc<dyn GenerativeModel>) -> (Router, SqlitePool) {
    let db = memory_pool().await;
    let pipeline = pipeline_with(model, db.clone());
    let state = AppState::new(db.clone(), pipeline, ImageConfig::default());
    (build_router(state), db)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload_body(subject: &str, count: usize) -> Value {
    let images: Vec<String> = (0..count)
        .map(|_| BASE64.encode(png_bytes(32, 24)))
        .collect();
    json!({ "subject_label": subject, "images": images })
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _db) = setup(ScriptedModel::new(Vec::new())).await;

    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "scout-ai");
    assert_eq!(body["model"], "scripted");
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_create_analysis_returns_created_with_labels() {
    let model = ScriptedModel::replying(&classification_json("オフィス", "会議室", &["modern", "bogus"]));
    let (app, db) = setup(model.clone()).await;

    let (status, body) = send(&app, with_json("POST", "/api/analyses", upload_body("Shibuya_StudioA", 2))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["subject_label"], "Shibuya_StudioA");
    assert_eq!(body["broad_category"], "オフィス");
    assert_eq!(body["image_count"], 2);
    assert_eq!(body["parse_method"], "direct");
    assert_eq!(body["persisted"]["status"], "inserted");
    assert_eq!(body["labels"]["impression"], json!(["モダン"]));
    assert_eq!(body["analysis_id"].as_str().unwrap().len(), 16);

    assert_eq!(scout_ai::db::analyses::count_all(&db).await.unwrap(), 1);
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_create_analysis_uses_interactive_image_limit() {
    let model = ScriptedModel::replying(&classification_json("オフィス", "会議室", &[]));
    let (app, _db) = setup(model.clone()).await;

    let (status, body) = send(&app, with_json("POST", "/api/analyses", upload_body("Many", 5))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["image_count"], 3);
    let sent = &model.requests()[0];
    assert_eq!(sent.images.len(), 3);
    assert!(sent.images.iter().all(|i| i.width <= 512 && i.height <= 512));
}

#[tokio::test]
async fn test_create_analysis_accepts_data_urls() {
    let model = ScriptedModel::replying(&classification_json("オフィス", "会議室", &[]));
    let (app, _db) = setup(model).await;

    let data_url = format!("data:image/png;base64,{}", BASE64.encode(png_bytes(16, 16)));
    let body = json!({ "subject_label": "DataUrl", "images": [data_url] });
    let (status, _) = send(&app, with_json("POST", "/api/analyses", body)).await;

    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_create_analysis_rejects_bad_input() {
    let model = ScriptedModel::new(Vec::new());
    let (app, _db) = setup(model.clone()).await;

    let (status, body) = send(
        &app,
        with_json("POST", "/api/analyses", json!({"subject_label": "X", "images": ["%%%"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = send(
        &app,
        with_json("POST", "/api/analyses", json!({"subject_label": "  ", "images": ["aGVsbG8="]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        with_json("POST", "/api/analyses", json!({"subject_label": "X", "images": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Decodes as base64 but is not an image
    let (status, body) = send(
        &app,
        with_json("POST", "/api/analyses", json!({"subject_label": "X", "images": ["aGVsbG8="]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("No usable images"));

    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_create_analysis_unknown_taxonomy_is_not_found() {
    let (app, _db) = setup(ScriptedModel::new(Vec::new())).await;

    let mut body = upload_body("X", 1);
    body["taxonomy"] = json!("missing");
    let (status, _) = send(&app, with_json("POST", "/api/analyses", body)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_analysis_model_failure_is_bad_gateway() {
    let model = ScriptedModel::new(vec![Err(ModelError::Auth("API key not valid".to_string()))]);
    let (app, db) = setup(model).await;

    let (status, body) = send(&app, with_json("POST", "/api/analyses", upload_body("X", 1))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "MODEL_ERROR");
    assert_eq!(scout_ai::db::analyses::count_all(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_list_get_and_stats() {
    let model = ScriptedModel::new(vec![
        Ok(classification_json("オフィス", "会議室", &["modern"])),
        Ok(classification_json("オフィス", "ロビー", &[])),
        Ok("no json at all".to_string()),
    ]);
    let (app, _db) = setup(model).await;

    let mut ids = Vec::new();
    for subject in ["One", "Two", "Three"] {
        let (status, body) = send(&app, with_json("POST", "/api/analyses", upload_body(subject, 1))).await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(body["analysis_id"].as_str().unwrap().to_string());
    }

    let (status, body) = send(&app, get("/api/analyses?page=1&per_page=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["per_page"], 2);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["subject_label"], "Three");

    let (_, page_two) = send(&app, get("/api/analyses?page=2&per_page=2")).await;
    assert_eq!(page_two["items"][0]["subject_label"], "One");

    let (status, detail) = send(&app, get(&format!("/api/analyses/{}", ids[0]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["specific_item"], "会議室");
    assert_eq!(detail["labels"]["impression"], json!(["モダン"]));

    let (status, fallback) = send(&app, get(&format!("/api/analyses/{}", ids[2]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fallback["broad_category"], "不明");
    assert_eq!(fallback["raw_response"], "no json at all");

    let (status, stats) = send(&app, get("/api/stats/categories")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["categories"][0]["category"], "オフィス");
    assert_eq!(stats["categories"][0]["count"], 2);
    assert_eq!(stats["categories"][1]["category"], "不明");
}

#[tokio::test]
async fn test_get_unknown_analysis_is_not_found() {
    let (app, _db) = setup(ScriptedModel::new(Vec::new())).await;

    let (status, body) = send(&app, get("/api/analyses/0123456789abcdef")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_taxonomy_crud() {
    let (app, _db) = setup(ScriptedModel::new(Vec::new())).await;

    let taxonomy = json!({
        "hierarchy": {"Office": ["Meeting Room", "Lobby"]},
        "impression_tags": {"雰囲気": [{"label": "モダン", "slug": "modern"}]},
        "object_tags": {}
    });

    let (status, saved) = send(&app, with_json("PUT", "/api/taxonomies/office", taxonomy.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["name"], "office");
    assert_eq!(saved["hierarchy"]["Office"][1], "Lobby");
    let created_at = saved["created_at"].clone();

    let (_, resaved) = send(&app, with_json("PUT", "/api/taxonomies/office", taxonomy)).await;
    assert_eq!(resaved["created_at"], created_at);

    let (status, list) = send(&app, get("/api/taxonomies")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["name"], "office");

    let (status, loaded) = send(&app, get("/api/taxonomies/office")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded["impression_tags"]["雰囲気"][0]["slug"], "modern");

    let delete = Request::builder()
        .method("DELETE")
        .uri("/api/taxonomies/office")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get("/api/taxonomies/office")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_format_endpoint_builds_and_saves_hierarchy() {
    let model = ScriptedModel::replying(r#"{"Office": ["Lobby", "Meeting Room"], "Cafe": ["Counter"]}"#);
    let (app, db) = setup(model.clone()).await;

    let body = json!({
        "target": "hierarchy",
        "text": "office: lobby, meeting room\ncafe: counter",
        "save_as": "formatted"
    });
    let (status, response) = send(&app, with_json("POST", "/api/taxonomies/format", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["structure"]["Office"], json!(["Lobby", "Meeting Room"]));
    assert_eq!(
        response["taxonomy"]["hierarchy"],
        json!({"Office": ["Lobby", "Meeting Room"], "Cafe": ["Counter"]})
    );
    assert_eq!(response["saved"]["name"], "formatted");

    let sent = &model.requests()[0];
    assert!(sent.images.is_empty());
    assert!((sent.options.temperature - 0.3).abs() < f32::EPSILON);

    let stored = scout_ai::db::taxonomies::load_taxonomy(&db, "formatted")
        .await
        .unwrap()
        .unwrap();
    assert!(stored.taxonomy.contains_item("Cafe", "Counter"));
}

#[tokio::test]
async fn test_format_endpoint_errors() {
    let model = ScriptedModel::replying("Sorry, I cannot do that.");
    let (app, _db) = setup(model.clone()).await;

    let (status, _) = send(
        &app,
        with_json("POST", "/api/taxonomies/format", json!({"target": "object_tags", "text": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(model.calls(), 0);

    let (status, body) = send(
        &app,
        with_json("POST", "/api/taxonomies/format", json!({"target": "object_tags", "text": "sofa, desk"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "UNPROCESSABLE");
}

#[tokio::test]
async fn test_taxonomy_names_are_trimmed_on_every_route() {
    let (app, _db) = setup(ScriptedModel::new(Vec::new())).await;
    let taxonomy = json!({
        "hierarchy": {"Office": ["Lobby"]},
        "impression_tags": {},
        "object_tags": {}
    });

    let (status, saved) = send(&app, with_json("PUT", "/api/taxonomies/%20office%20", taxonomy)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["name"], "office");

    let (status, _) = send(&app, get("/api/taxonomies/%20office%20")).await;
    assert_eq!(status, StatusCode::OK);

    let delete = Request::builder()
        .method("DELETE")
        .uri("/api/taxonomies/%20office")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_create_analysis_few_shot_reports_confidence() {
    let answer = json!({
        "大分類": "公園",
        "小項目": "公園",
        "確信度": "9",
        "判定理由": "芝生と遊具",
        "類似した例": "なし",
    })
    .to_string();
    let model = ScriptedModel::replying(&answer);
    let (app, _db) = setup(model.clone()).await;

    let mut body = upload_body("Yoyogi", 1);
    body["few_shot"] = json!(true);
    let (status, body) = send(&app, with_json("POST", "/api/analyses", body)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["confidence"], 9);
    assert_eq!(body["similar_example"], "なし");
    let sent = &model.requests()[0];
    assert!(sent.examples.is_some());
    assert!(sent.prompt.contains("確信度"));
}

#[tokio::test]
async fn test_few_shot_status_endpoint() {
    let (app, _db) = setup(ScriptedModel::new(Vec::new())).await;

    let (status, body) = send(&app, get("/api/few-shot")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loaded"], 0);
    assert_eq!(body["categories"], json!([]));
}
