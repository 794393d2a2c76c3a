//! scout-ai library interface
//!
//! Classification pipeline, persistence and HTTP API, exposed for the
//! binary and for integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use scout_common::config::ImageConfig;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::services::{ClassificationPipeline, ExampleStatus};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Classification pipeline (model client, dedup gate, submission guard)
    pub pipeline: ClassificationPipeline,
    /// Interactive image limits
    pub images: ImageConfig,
    /// Few-shot examples loaded at startup
    pub few_shot: Arc<ExampleStatus>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, pipeline: ClassificationPipeline, images: ImageConfig) -> Self {
        Self {
            db,
            pipeline,
            images,
            few_shot: Arc::new(ExampleStatus::default()),
            startup_time: Utc::now(),
        }
    }

    pub fn with_few_shot_status(mut self, status: ExampleStatus) -> Self {
        self.few_shot = Arc::new(status);
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::analysis_routes())
        .merge(api::stats_routes())
        .merge(api::taxonomy_routes())
        .with_state(state)
}
