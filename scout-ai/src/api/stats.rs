//! Aggregate statistics

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::db::analyses::CategoryCount;
use crate::{ApiResult, AppState};

/// GET /api/stats/categories response
#[derive(Debug, Serialize)]
pub struct CategoryStatsResponse {
    pub total: i64,
    pub categories: Vec<CategoryCount>,
}

/// GET /api/stats/categories
///
/// Results per broad category, largest first.
pub async fn category_stats(State(state): State<AppState>) -> ApiResult<Json<CategoryStatsResponse>> {
    let categories = crate::db::analyses::count_by_category(&state.db).await?;
    let total = crate::db::analyses::count_all(&state.db).await?;
    Ok(Json(CategoryStatsResponse { total, categories }))
}

pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/api/stats/categories", get(category_stats))
}
