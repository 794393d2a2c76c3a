//! Named taxonomy configurations
//!
//! Saving under an existing name replaces the content and `updated_at`
//! but keeps the first `created_at`. Names are trimmed on every lookup.

use chrono::{DateTime, Utc};
use scout_common::{Error, Hierarchy, Result, Taxonomy, Vocabulary};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{format_timestamp, parse_timestamp};
use crate::models::{TaxonomyConfig, TaxonomyConfigSummary};

/// Save (insert or replace) a named taxonomy and return the stored record
pub async fn save_taxonomy(
    pool: &SqlitePool,
    name: &str,
    taxonomy: &Taxonomy,
    saved_at: DateTime<Utc>,
) -> Result<TaxonomyConfig> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("Taxonomy name must not be empty".to_string()));
    }

    let hierarchy = to_json(&taxonomy.hierarchy, "hierarchy")?;
    let impression_tags = to_json(&taxonomy.impression_tags, "impression tags")?;
    let object_tags = to_json(&taxonomy.object_tags, "object tags")?;
    let saved_at = format_timestamp(&saved_at);

    sqlx::query(
        r#"
        INSERT INTO taxonomy_configs (
            name, hierarchy, impression_tags, object_tags, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            hierarchy = excluded.hierarchy,
            impression_tags = excluded.impression_tags,
            object_tags = excluded.object_tags,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(name)
    .bind(&hierarchy)
    .bind(&impression_tags)
    .bind(&object_tags)
    .bind(&saved_at)
    .bind(&saved_at)
    .execute(pool)
    .await?;

    tracing::info!(name = %name, "Saved taxonomy configuration");

    load_taxonomy(pool, name)
        .await?
        .ok_or_else(|| Error::Internal(format!("Taxonomy {} vanished after save", name)))
}

/// Load a named taxonomy
pub async fn load_taxonomy(pool: &SqlitePool, name: &str) -> Result<Option<TaxonomyConfig>> {
    let name = name.trim();
    let row = sqlx::query(
        r#"
        SELECT name, hierarchy, impression_tags, object_tags, created_at, updated_at
        FROM taxonomy_configs
        WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_config).transpose()
}

/// Saved names, most recently updated first
pub async fn list_taxonomies(pool: &SqlitePool) -> Result<Vec<TaxonomyConfigSummary>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT name, updated_at FROM taxonomy_configs ORDER BY updated_at DESC, name ASC",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(name, updated_at)| {
            Ok(TaxonomyConfigSummary {
                name,
                updated_at: parse_timestamp(&updated_at)?,
            })
        })
        .collect()
}

/// Delete a named taxonomy
///
/// **Returns:** true if it existed
pub async fn delete_taxonomy(pool: &SqlitePool, name: &str) -> Result<bool> {
    let name = name.trim();
    let outcome = sqlx::query("DELETE FROM taxonomy_configs WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(outcome.rows_affected() > 0)
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", what, e)))
}

fn row_to_config(row: &SqliteRow) -> Result<TaxonomyConfig> {
    let hierarchy: String = row.get("hierarchy");
    let hierarchy: Hierarchy = serde_json::from_str(&hierarchy)
        .map_err(|e| Error::Internal(format!("Failed to deserialize hierarchy: {}", e)))?;

    let impression_tags: String = row.get("impression_tags");
    let impression_tags: Vocabulary = serde_json::from_str(&impression_tags)
        .map_err(|e| Error::Internal(format!("Failed to deserialize impression tags: {}", e)))?;

    let object_tags: String = row.get("object_tags");
    let object_tags: Vocabulary = serde_json::from_str(&object_tags)
        .map_err(|e| Error::Internal(format!("Failed to deserialize object tags: {}", e)))?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(TaxonomyConfig {
        name: row.get("name"),
        taxonomy: Taxonomy {
            hierarchy,
            impression_tags,
            object_tags,
        },
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
