//! Classification result persistence
//!
//! Results are append-only: inserts never overwrite an existing
//! `analysis_id`, and nothing here updates a stored row.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use scout_common::{Error, Result};

use super::{format_timestamp, parse_timestamp};
use crate::models::ClassificationResult;

/// Number of results per broad category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

/// Insert a result unless its id is already stored
///
/// **Returns:** true if a row was written, false if the id already existed
pub async fn insert_if_absent(pool: &SqlitePool, result: &ClassificationResult) -> Result<bool> {
    let impression_tags = serde_json::to_string(&result.impression_tags)
        .map_err(|e| Error::Internal(format!("Failed to serialize impression tags: {}", e)))?;
    let object_tags = serde_json::to_string(&result.object_tags)
        .map_err(|e| Error::Internal(format!("Failed to serialize object tags: {}", e)))?;

    let outcome = sqlx::query(
        r#"
        INSERT INTO analysis_results (
            analysis_id, subject_label, broad_category, specific_item,
            impression_tags, object_tags, reason, purpose, features,
            image_count, confidence, similar_example, raw_response, analyzed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(analysis_id) DO NOTHING
        "#,
    )
    .bind(&result.analysis_id)
    .bind(&result.subject_label)
    .bind(&result.broad_category)
    .bind(&result.specific_item)
    .bind(&impression_tags)
    .bind(&object_tags)
    .bind(&result.reason)
    .bind(&result.purpose)
    .bind(&result.features)
    .bind(i64::from(result.image_count))
    .bind(result.confidence.map(i64::from))
    .bind(&result.similar_example)
    .bind(&result.raw_response)
    .bind(format_timestamp(&result.analyzed_at))
    .execute(pool)
    .await?;

    Ok(outcome.rows_affected() == 1)
}

/// Whether a result with this id is stored
pub async fn exists(pool: &SqlitePool, analysis_id: &str) -> Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM analysis_results WHERE analysis_id = ?")
            .bind(analysis_id)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

/// Fetch one result by id
pub async fn get_by_id(pool: &SqlitePool, analysis_id: &str) -> Result<Option<ClassificationResult>> {
    let row = sqlx::query(
        r#"
        SELECT analysis_id, subject_label, broad_category, specific_item,
               impression_tags, object_tags, reason, purpose, features,
               image_count, confidence, similar_example, raw_response, analyzed_at
        FROM analysis_results
        WHERE analysis_id = ?
        "#,
    )
    .bind(analysis_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_result).transpose()
}

/// One page of results, most recent first (`page` is 1-based)
pub async fn list_recent(
    pool: &SqlitePool,
    page: u32,
    per_page: u32,
) -> Result<Vec<ClassificationResult>> {
    let offset = i64::from(page.max(1) - 1) * i64::from(per_page);

    let rows = sqlx::query(
        r#"
        SELECT analysis_id, subject_label, broad_category, specific_item,
               impression_tags, object_tags, reason, purpose, features,
               image_count, confidence, similar_example, raw_response, analyzed_at
        FROM analysis_results
        ORDER BY analyzed_at DESC, rowid DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(i64::from(per_page))
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_result).collect()
}

/// Total stored results
pub async fn count_all(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analysis_results")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Results per broad category, largest first; empty/null categories excluded
pub async fn count_by_category(pool: &SqlitePool) -> Result<Vec<CategoryCount>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT broad_category, COUNT(*) AS count
        FROM analysis_results
        WHERE broad_category IS NOT NULL AND broad_category != ''
        GROUP BY broad_category
        ORDER BY count DESC, broad_category ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(category, count)| CategoryCount { category, count })
        .collect())
}

fn row_to_result(row: &SqliteRow) -> Result<ClassificationResult> {
    let impression_tags: String = row.get("impression_tags");
    let impression_tags: Vec<String> = serde_json::from_str(&impression_tags)
        .map_err(|e| Error::Internal(format!("Failed to deserialize impression tags: {}", e)))?;

    let object_tags: String = row.get("object_tags");
    let object_tags: Vec<String> = serde_json::from_str(&object_tags)
        .map_err(|e| Error::Internal(format!("Failed to deserialize object tags: {}", e)))?;

    let analyzed_at: String = row.get("analyzed_at");

    Ok(ClassificationResult {
        analysis_id: row.get("analysis_id"),
        subject_label: row.get("subject_label"),
        broad_category: row
            .get::<Option<String>, _>("broad_category")
            .unwrap_or_default(),
        specific_item: row
            .get::<Option<String>, _>("specific_item")
            .unwrap_or_default(),
        impression_tags,
        object_tags,
        reason: row.get("reason"),
        purpose: row.get("purpose"),
        features: row.get("features"),
        image_count: u32::try_from(row.get::<i64, _>("image_count")).unwrap_or(0),
        confidence: row
            .get::<Option<i64>, _>("confidence")
            .and_then(|c| u8::try_from(c).ok()),
        similar_example: row.get("similar_example"),
        raw_response: row.get("raw_response"),
        analyzed_at: parse_timestamp(&analyzed_at)?,
    })
}
