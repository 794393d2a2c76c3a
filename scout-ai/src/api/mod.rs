//! HTTP API handlers for scout-ai
//!
//! JSON over HTTP; there is no HTML UI.

pub mod analyses;
pub mod health;
pub mod stats;
pub mod taxonomies;

pub use analyses::analysis_routes;
pub use health::health_routes;
pub use stats::stats_routes;
pub use taxonomies::taxonomy_routes;

use scout_common::Taxonomy;
use sqlx::SqlitePool;

use crate::{ApiError, ApiResult};

/// Named saved taxonomy, or the built-in defaults when no name is given
pub(crate) async fn resolve_taxonomy(db: &SqlitePool, name: Option<&str>) -> ApiResult<Taxonomy> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => crate::db::taxonomies::load_taxonomy(db, name)
            .await?
            .map(|config| config.taxonomy)
            .ok_or_else(|| ApiError::NotFound(format!("Taxonomy {}", name))),
        None => Ok(Taxonomy::studio_defaults()),
    }
}
