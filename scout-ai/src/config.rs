//! Configuration resolution for scout-ai
//!
//! The Gemini API key is resolved Database → ENV → TOML.

use scout_common::config::TomlConfig;
use scout_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

/// Environment variable holding the Gemini API key (also read from `.env`)
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Resolve the Gemini API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
pub async fn resolve_gemini_api_key(db: &Pool<Sqlite>, toml_config: &TomlConfig) -> Result<String> {
    let db_key = crate::db::settings::get_gemini_api_key(db)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = std::env::var(GEMINI_API_KEY_ENV)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .gemini_api_key
        .clone()
        .filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        (db_key.is_some(), "database"),
        (env_key.is_some(), "environment"),
        (toml_key.is_some(), "TOML"),
    ]
    .iter()
    .filter(|(present, _)| *present)
    .map(|(_, source)| *source)
    .collect();

    if sources.len() > 1 {
        warn!(
            "Gemini API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(key) = db_key {
        info!("Gemini API key loaded from database");
        return Ok(key);
    }
    if let Some(key) = env_key {
        info!("Gemini API key loaded from environment variable");
        return Ok(key);
    }
    if let Some(key) = toml_key {
        info!("Gemini API key loaded from TOML config");
        return Ok(key);
    }

    Err(Error::Config(
        "Gemini API key not configured. Please configure using one of:\n\
         1. CLI: scout-ai set-api-key <key>\n\
         2. Environment (or .env file): GEMINI_API_KEY=your-key-here\n\
         3. TOML config: ~/.config/scout/config.toml (gemini_api_key = \"your-key\")"
            .to_string(),
    ))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
