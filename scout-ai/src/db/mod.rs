//! Database access for scout-ai
//!
//! One SQLite file in the root folder holds three tables:
//! - `settings` (key/value, e.g. the model API key)
//! - `taxonomy_configs` (named taxonomy snapshots, upserted by name)
//! - `analysis_results` (append-only classification records)

pub mod analyses;
pub mod settings;
pub mod taxonomies;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS taxonomy_configs (
            name TEXT PRIMARY KEY,
            hierarchy TEXT NOT NULL,
            impression_tags TEXT NOT NULL,
            object_tags TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_results (
            analysis_id TEXT PRIMARY KEY,
            subject_label TEXT NOT NULL,
            broad_category TEXT,
            specific_item TEXT,
            impression_tags TEXT NOT NULL DEFAULT '[]',
            object_tags TEXT NOT NULL DEFAULT '[]',
            reason TEXT NOT NULL DEFAULT '',
            purpose TEXT NOT NULL DEFAULT '',
            features TEXT NOT NULL DEFAULT '',
            image_count INTEGER NOT NULL DEFAULT 0,
            confidence INTEGER,
            similar_example TEXT,
            raw_response TEXT,
            analyzed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Databases created before few-shot results existed
    add_missing_columns(
        pool,
        "analysis_results",
        &[("confidence", "INTEGER"), ("similar_example", "TEXT")],
    )
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analysis_results_analyzed_at
         ON analysis_results (analyzed_at)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (settings, taxonomy_configs, analysis_results)");

    Ok(())
}

/// Add nullable columns absent from an existing table
async fn add_missing_columns(
    pool: &SqlitePool,
    table: &str,
    columns: &[(&str, &str)],
) -> Result<()> {
    let existing: Vec<String> = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .collect();

    for (name, sql_type) in columns {
        if existing.iter().any(|column| column == name) {
            continue;
        }
        sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, name, sql_type))
            .execute(pool)
            .await?;
        tracing::info!(table, column = %name, "Added missing column");
    }

    Ok(())
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> scout_common::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| scout_common::Error::Internal(format!("Invalid timestamp {}: {}", value, e)))
}
