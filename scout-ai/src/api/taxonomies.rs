//! Taxonomy configuration API handlers
//!
//! Named snapshots are saved with PUT (upsert, `created_at` preserved) and
//! can be extended through model-assisted formatting of free text.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use scout_common::taxonomy::MergeMode;
use scout_common::Taxonomy;
use serde::{Deserialize, Serialize};

use crate::api::resolve_taxonomy;
use crate::models::{FormatTarget, TaxonomyConfig, TaxonomyConfigSummary};
use crate::services::{apply_structure, format_text, FormattedStructure};
use crate::{ApiError, ApiResult, AppState};

/// POST /api/taxonomies/format request
#[derive(Debug, Deserialize)]
pub struct FormatRequest {
    pub target: FormatTarget,
    /// Free text to organise
    pub text: String,
    /// Saved taxonomy to apply the result to (defaults when omitted)
    pub base: Option<String>,
    #[serde(default)]
    pub mode: MergeMode,
    /// Save the combined taxonomy under this name
    pub save_as: Option<String>,
}

/// POST /api/taxonomies/format response
#[derive(Debug, Serialize)]
pub struct FormatResponse {
    pub structure: FormattedStructure,
    pub taxonomy: Taxonomy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved: Option<TaxonomyConfig>,
}

/// GET /api/taxonomies
pub async fn list_taxonomies(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<TaxonomyConfigSummary>>> {
    Ok(Json(crate::db::taxonomies::list_taxonomies(&state.db).await?))
}

/// GET /api/taxonomies/:name
pub async fn get_taxonomy(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TaxonomyConfig>> {
    crate::db::taxonomies::load_taxonomy(&state.db, &name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Taxonomy {}", name)))
}

/// PUT /api/taxonomies/:name
///
/// **Request:** `{"hierarchy": {...}, "impression_tags": {...}, "object_tags": {...}}`
pub async fn put_taxonomy(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(taxonomy): Json<Taxonomy>,
) -> ApiResult<Json<TaxonomyConfig>> {
    let saved = crate::db::taxonomies::save_taxonomy(
        &state.db,
        &name,
        &taxonomy,
        scout_common::time::now(),
    )
    .await?;
    Ok(Json(saved))
}

/// DELETE /api/taxonomies/:name
pub async fn delete_taxonomy(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    if crate::db::taxonomies::delete_taxonomy(&state.db, &name).await? {
        tracing::info!(name = %name, "Deleted taxonomy configuration");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Taxonomy {}", name)))
    }
}

/// POST /api/taxonomies/format
///
/// **Errors:**
/// - 400 Bad Request: empty text
/// - 404 Not Found: unknown base taxonomy
/// - 422 Unprocessable Entity: the model answer held no usable structure
/// - 502 Bad Gateway: model call failed
pub async fn format_taxonomy(
    State(state): State<AppState>,
    Json(request): Json<FormatRequest>,
) -> ApiResult<Json<FormatResponse>> {
    let mut taxonomy = resolve_taxonomy(&state.db, request.base.as_deref()).await?;

    let structure = format_text(
        state.pipeline.model().as_ref(),
        state.pipeline.model_config(),
        request.target,
        &request.text,
    )
    .await?;

    apply_structure(&mut taxonomy, request.target, structure.clone(), request.mode);

    let saved = match request.save_as.as_deref() {
        Some(name) => Some(
            crate::db::taxonomies::save_taxonomy(
                &state.db,
                name,
                &taxonomy,
                scout_common::time::now(),
            )
            .await?,
        ),
        None => None,
    };

    Ok(Json(FormatResponse {
        structure,
        taxonomy,
        saved,
    }))
}

/// Build taxonomy routes
pub fn taxonomy_routes() -> Router<AppState> {
    Router::new()
        .route("/api/taxonomies", get(list_taxonomies))
        .route("/api/taxonomies/format", post(format_taxonomy))
        .route(
            "/api/taxonomies/:name",
            get(get_taxonomy).put(put_taxonomy).delete(delete_taxonomy),
        )
}
