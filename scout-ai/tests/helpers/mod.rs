//! Test Helper Utilities
//!
//! Shared fixtures for scout-ai integration tests: scripted models,
//! in-memory databases and generated images.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use scout_ai::services::{
    ClassificationPipeline, GenerationRequest, GenerativeModel, ModelError, SubmissionGuard,
};
use scout_common::config::ModelConfig;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::Notify;

/// Model that replays queued answers in order and records every request
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, ModelError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Model answering every call with the same text
    pub fn replying(text: &str) -> Arc<Self> {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ModelError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ModelError::EmptyResponse))
    }
}

/// Model that blocks inside `generate` until released
pub struct GatedModel {
    pub entered: Notify,
    pub release: Notify,
    response: String,
}

impl GatedModel {
    pub fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Notify::new(),
            response: response.to_string(),
        })
    }
}

#[async_trait]
impl GenerativeModel for GatedModel {
    fn name(&self) -> &str {
        "gated"
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<String, ModelError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(self.response.clone())
    }
}

/// Single-connection in-memory database with all tables created
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    scout_ai::db::init_tables(&pool)
        .await
        .expect("Failed to create tables");
    pool
}

pub fn pipeline_with(model: Arc<dyn GenerativeModel>, db: SqlitePool) -> ClassificationPipeline {
    ClassificationPipeline::new(model, db, SubmissionGuard::new(), ModelConfig::default())
}

/// Encoded PNG of a flat colour
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([120, 160, 200]));
    let mut data = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .expect("Failed to encode PNG");
    data
}

pub fn write_png(path: &Path, width: u32, height: u32) {
    std::fs::write(path, png_bytes(width, height)).expect("Failed to write PNG fixture");
}

/// Well-formed classification answer
pub fn classification_json(category: &str, item: &str, impressions: &[&str]) -> String {
    serde_json::json!({
        "大分類": category,
        "小項目": item,
        "印象タグ": impressions,
        "オブジェクトタグ": [],
        "判定理由": "窓際に会議机がある",
        "撮影用途": "ドラマ",
        "特徴": "自然光",
    })
    .to_string()
}
