//! Data models for scout-ai
//!
//! - Classification results (persisted, immutable once written)
//! - Named taxonomy configurations (persisted, upserted by name)

pub mod classification;
pub mod taxonomy_config;

pub use classification::{ClassificationResult, TagLabels};
pub use taxonomy_config::{TaxonomyConfig, TaxonomyConfigSummary};

use serde::{Deserialize, Serialize};

/// Structure produced by a formatting request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTarget {
    /// Broad category → sub-items
    Hierarchy,
    /// Impression vocabulary (group → label/slug entries)
    ImpressionTags,
    /// Object vocabulary (group → label/slug entries)
    ObjectTags,
}
