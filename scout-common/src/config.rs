//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "SCOUT_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "scout.db";

/// Generative model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model name as used in the generateContent endpoint path
    pub name: String,
    /// Deadline for one remote call, in seconds
    pub timeout_secs: u64,
    /// Upper bound on generated tokens
    pub max_output_tokens: u32,
    /// Sampling temperature for image classification
    pub classification_temperature: f32,
    /// Sampling temperature for vocabulary/hierarchy formatting
    pub formatting_temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gemini-2.0-flash".to_string(),
            timeout_secs: 120,
            max_output_tokens: 2048,
            classification_temperature: 0.7,
            formatting_temperature: 0.3,
        }
    }
}

/// Image normalization limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Images per subject in folder-batch mode
    pub max_images: usize,
    /// Longest side in folder-batch mode (pixels)
    pub max_dimension: u32,
    /// Images per submission in interactive mode
    pub interactive_max_images: usize,
    /// Longest side in interactive mode (pixels)
    pub interactive_max_dimension: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_images: 10,
            max_dimension: 1024,
            interactive_max_images: 3,
            interactive_max_dimension: 512,
        }
    }
}

/// Directory name for example images under the root folder
pub const FEW_SHOT_DIR: &str = "few_shot_examples";

/// One labelled example image shown ahead of the photos being classified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleEntry {
    /// Grouping key; `max_per_category` applies per distinct value
    pub category: String,
    /// File name relative to the example directory
    pub file: String,
    /// Classification shown after the image
    pub caption: String,
}

impl ExampleEntry {
    fn new(category: &str, file: &str, caption: &str) -> Self {
        Self {
            category: category.to_string(),
            file: file.to_string(),
            caption: caption.to_string(),
        }
    }
}

/// Few-shot classification settings (`[few_shot]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FewShotConfig {
    /// Example directory; `<root_folder>/few_shot_examples` when unset
    pub dir: Option<PathBuf>,
    /// Examples sent per category
    pub max_per_category: usize,
    /// Longest side of an example image (pixels)
    pub max_dimension: u32,
    pub examples: Vec<ExampleEntry>,
}

impl Default for FewShotConfig {
    fn default() -> Self {
        const HOUSE: &str = "ハウススタジオ（和風または洋風の撮影用住宅）";
        const COMMERCIAL: &str = "商業施設（ショッピングモールや博物館など）";
        const RESTAURANT: &str = "飲食店（カフェやレストランなど）";
        const OFFICE: &str = "オフィス（会議室やロビーなど）";
        const NATURE: &str = "自然（山や海など）";

        Self {
            dir: None,
            max_per_category: 1,
            max_dimension: 512,
            examples: vec![
                ExampleEntry::new("house_studio", "house_studio_japanese.jpg", HOUSE),
                ExampleEntry::new("house_studio", "house_studio_western.jpg", HOUSE),
                ExampleEntry::new("commercial", "commercial_mall.jpg", COMMERCIAL),
                ExampleEntry::new("commercial", "commercial_museum.jpg", COMMERCIAL),
                ExampleEntry::new("restaurant", "restaurant_cafe.jpg", RESTAURANT),
                ExampleEntry::new("restaurant", "restaurant_japanese.jpg", RESTAURANT),
                ExampleEntry::new("office", "office_meeting.jpg", OFFICE),
                ExampleEntry::new("office", "office_lobby.jpg", OFFICE),
                ExampleEntry::new("nature", "nature_mountain.jpg", NATURE),
                ExampleEntry::new("nature", "nature_sea.jpg", NATURE),
            ],
        }
    }
}

impl FewShotConfig {
    /// Configured directory, else `few_shot_examples` under the root folder
    pub fn resolve_dir(&self, root_folder: &Path) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| root_folder.join(FEW_SHOT_DIR))
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub gemini_api_key: Option<String>,
    pub model: ModelConfig,
    pub images: ImageConfig,
    pub few_shot: FewShotConfig,
}

/// Resolve the root folder holding the database
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Default location of `config.toml` (`~/.config/scout/config.toml` on Linux)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("scout").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("scout.toml"))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("scout"))
        .unwrap_or_else(|| PathBuf::from("./scout_data"))
}

/// Load TOML configuration; a missing file yields defaults
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write TOML configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        warn!("Atomic rename failed for {}: {}", path.display(), e);
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::Io(e));
    }

    Ok(())
}

/// Database path inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}
