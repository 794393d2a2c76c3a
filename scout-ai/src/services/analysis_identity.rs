//! Analysis identity and dedup gate
//!
//! An analysis id is `sha256(subject_label + timestamp)`, hex encoded and cut
//! to 16 characters. It guards against the same attempt being persisted
//! twice (re-submitted requests), not against content collisions, and is
//! not a security property.
//!
//! The gate never overwrites: when an id is already stored, the stored
//! record wins and the new one is discarded.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use scout_common::Result;

use crate::db::analyses;
use crate::models::ClassificationResult;

/// Hex characters kept from the digest
pub const ANALYSIS_ID_LEN: usize = 16;

/// Derive the analysis id for one attempt
pub fn make_id(subject_label: &str, timestamp: &DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject_label.as_bytes());
    hasher.update(timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes());
    let mut id = format!("{:x}", hasher.finalize());
    id.truncate(ANALYSIS_ID_LEN);
    id
}

/// Outcome of passing a result through the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupResult {
    /// New id, record written
    Inserted,
    /// Id already stored, record discarded
    Duplicate,
}

/// Dedup gate in front of the result store
pub struct AnalysisDeduplicator {
    db: SqlitePool,
}

impl AnalysisDeduplicator {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Persist `result` unless its id is already stored
    pub async fn store(&self, result: &ClassificationResult) -> Result<DedupResult> {
        if analyses::exists(&self.db, &result.analysis_id).await? {
            tracing::info!(
                analysis_id = %result.analysis_id,
                subject = %result.subject_label,
                "Duplicate analysis id, keeping stored record"
            );
            return Ok(DedupResult::Duplicate);
        }

        // The insert itself is conflict-safe, so a racing writer still loses cleanly
        if analyses::insert_if_absent(&self.db, result).await? {
            tracing::debug!(analysis_id = %result.analysis_id, "Stored analysis");
            Ok(DedupResult::Inserted)
        } else {
            tracing::info!(
                analysis_id = %result.analysis_id,
                "Analysis id stored concurrently, keeping stored record"
            );
            Ok(DedupResult::Duplicate)
        }
    }
}
