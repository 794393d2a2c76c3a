//! Analysis API handlers
//!
//! POST /api/analyses, GET /api/analyses, GET /api/analyses/:id,
//! GET /api/few-shot

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::api::resolve_taxonomy;
use crate::models::{ClassificationResult, TagLabels};
use crate::services::{
    ClassificationRequest, ExampleStatus, ImageInput, ParseMethod, PersistStatus,
    PreprocessOptions, PromptOptions, PromptScope, RemoteFailurePolicy,
};
use crate::{ApiError, ApiResult, AppState};

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

/// POST /api/analyses request
#[derive(Debug, Deserialize)]
pub struct CreateAnalysisRequest {
    pub subject_label: String,
    /// Base64 image data, bare or as `data:<mime>;base64,<data>` URLs
    pub images: Vec<String>,
    /// Saved taxonomy name (built-in defaults when omitted)
    pub taxonomy: Option<String>,
    #[serde(default = "default_true")]
    pub include_impression: bool,
    #[serde(default = "default_true")]
    pub include_object: bool,
    /// Cap on slugs listed in the prompt
    pub max_slugs: Option<usize>,
    /// Judge against the labelled example images instead of tag lists
    #[serde(default)]
    pub few_shot: bool,
}

fn default_true() -> bool {
    true
}

/// POST /api/analyses response
#[derive(Debug, Serialize)]
pub struct CreateAnalysisResponse {
    #[serde(flatten)]
    pub result: ClassificationResult,
    pub labels: TagLabels,
    pub parse_method: Option<ParseMethod>,
    pub persisted: PersistStatus,
    pub taxonomy_match: bool,
}

/// GET /api/analyses query
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// GET /api/analyses response
#[derive(Debug, Serialize)]
pub struct ListAnalysesResponse {
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub items: Vec<ClassificationResult>,
}

/// GET /api/analyses/:id query
#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    /// Taxonomy used to resolve tag labels
    pub taxonomy: Option<String>,
}

/// GET /api/analyses/:id response
#[derive(Debug, Serialize)]
pub struct AnalysisDetailResponse {
    #[serde(flatten)]
    pub result: ClassificationResult,
    pub labels: TagLabels,
}

/// POST /api/analyses
///
/// Classify one subject from uploaded images.
///
/// **Errors:**
/// - 400 Bad Request: empty subject, no images, undecodable base64, or no usable image
/// - 404 Not Found: unknown taxonomy name
/// - 409 Conflict: the subject is already being classified
/// - 502 Bad Gateway: model call failed
pub async fn create_analysis(
    State(state): State<AppState>,
    Json(payload): Json<CreateAnalysisRequest>,
) -> ApiResult<(StatusCode, Json<CreateAnalysisResponse>)> {
    let subject_label = payload.subject_label.trim().to_string();
    if subject_label.is_empty() {
        return Err(ApiError::BadRequest("subject_label must not be empty".to_string()));
    }
    if payload.images.is_empty() {
        return Err(ApiError::BadRequest("At least one image is required".to_string()));
    }

    let images = payload
        .images
        .iter()
        .enumerate()
        .map(|(index, encoded)| {
            decode_image(encoded)
                .map(|data| ImageInput::Bytes {
                    name: format!("upload_{}", index + 1),
                    data,
                })
                .map_err(|e| ApiError::BadRequest(format!("Image {}: {}", index + 1, e)))
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let taxonomy = resolve_taxonomy(&state.db, payload.taxonomy.as_deref()).await?;

    let request = ClassificationRequest {
        subject_label,
        images,
        taxonomy: taxonomy.clone(),
        preprocess: PreprocessOptions::interactive(&state.images),
        prompt: PromptOptions {
            scope: if payload.few_shot {
                PromptScope::FewShot
            } else {
                PromptScope::Full {
                    include_impression: payload.include_impression,
                    include_object: payload.include_object,
                }
            },
            max_slugs: payload.max_slugs,
        },
        on_remote_failure: RemoteFailurePolicy::Abort,
        image_count_override: None,
    };

    let outcome = state.pipeline.classify(request).await?;
    let labels = outcome.result.tag_labels(&taxonomy);

    let status = match outcome.persist {
        PersistStatus::Inserted => StatusCode::CREATED,
        _ => StatusCode::OK,
    };

    Ok((
        status,
        Json(CreateAnalysisResponse {
            result: outcome.result,
            labels,
            parse_method: outcome.parse_method,
            persisted: outcome.persist,
            taxonomy_match: outcome.taxonomy_match,
        }),
    ))
}

/// GET /api/analyses?page=&per_page=
///
/// Most recent first; `page` is 1-based.
pub async fn list_analyses(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListAnalysesResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);

    let items = crate::db::analyses::list_recent(&state.db, page, per_page).await?;
    let total = crate::db::analyses::count_all(&state.db).await?;

    Ok(Json(ListAnalysesResponse {
        page,
        per_page,
        total,
        items,
    }))
}

/// GET /api/analyses/:id?taxonomy=
///
/// Tag slugs are resolved against the named taxonomy (defaults when
/// omitted); slugs with no label are dropped.
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(analysis_id): Path<String>,
    Query(query): Query<DetailQuery>,
) -> ApiResult<Json<AnalysisDetailResponse>> {
    let result = crate::db::analyses::get_by_id(&state.db, &analysis_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Analysis {}", analysis_id)))?;

    let taxonomy = resolve_taxonomy(&state.db, query.taxonomy.as_deref()).await?;
    let labels = result.tag_labels(&taxonomy);

    Ok(Json(AnalysisDetailResponse { result, labels }))
}

/// GET /api/few-shot
///
/// Example images loaded at startup, per category.
pub async fn few_shot_status(State(state): State<AppState>) -> Json<ExampleStatus> {
    Json(state.few_shot.as_ref().clone())
}

/// Decode bare base64 or a base64 data URL
fn decode_image(encoded: &str) -> Result<Vec<u8>, String> {
    let payload = match encoded.trim().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| "data URL is not base64 encoded".to_string())?,
        None => encoded.trim(),
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64.decode(compact).map_err(|e| e.to_string())
}

/// Build analysis routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analyses", get(list_analyses).post(create_analysis))
        .route("/api/analyses/:id", get(get_analysis))
        .route("/api/few-shot", get(few_shot_status))
}
