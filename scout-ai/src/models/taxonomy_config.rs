//! Named taxonomy snapshots

use chrono::{DateTime, Utc};
use scout_common::Taxonomy;
use serde::{Deserialize, Serialize};

/// A saved taxonomy. `created_at` is set on first save and survives later saves
/// under the same name; `updated_at` moves on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    pub name: String,
    #[serde(flatten)]
    pub taxonomy: Taxonomy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyConfigSummary {
    pub name: String,
    pub updated_at: DateTime<Utc>,
}
