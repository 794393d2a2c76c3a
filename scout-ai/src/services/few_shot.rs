//! Few-shot example loading
//!
//! Reads the configured labelled example images from the example directory
//! once at startup. Missing or undecodable files are skipped with a warning,
//! so a partly populated directory still yields the examples it has.

use scout_common::config::FewShotConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::services::gemini_client::Exemplar;
use crate::services::image_preprocessor::{preprocess_image, ImageInput};
use crate::services::prompt_builder::example_caption;

/// Examples loaded per category, for status reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExampleStatus {
    pub dir: String,
    pub loaded: usize,
    /// In configuration order
    pub categories: Vec<CategoryExamples>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryExamples {
    pub category: String,
    pub loaded: usize,
}

/// Load up to `max_per_category` examples per category from `dir`
pub fn load_examples(dir: &Path, config: &FewShotConfig) -> Vec<Exemplar> {
    let mut per_category: HashMap<&str, usize> = HashMap::new();
    let mut examples = Vec::new();

    for entry in &config.examples {
        let taken = per_category.entry(entry.category.as_str()).or_insert(0);
        if *taken >= config.max_per_category {
            continue;
        }

        let path = dir.join(&entry.file);
        if !path.is_file() {
            warn!(path = %path.display(), category = %entry.category, "Example image not found");
            continue;
        }

        match preprocess_image(&ImageInput::Path(path.clone()), config.max_dimension) {
            Ok(image) => {
                *taken += 1;
                examples.push(Exemplar {
                    category: entry.category.clone(),
                    image,
                    caption: example_caption(&entry.caption),
                });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable example image");
            }
        }
    }

    if examples.is_empty() {
        warn!(dir = %dir.display(), "No few-shot example images loaded");
    } else {
        info!(dir = %dir.display(), count = examples.len(), "Loaded few-shot example images");
    }

    examples
}

/// Loaded count per configured category
pub fn example_status(dir: &Path, config: &FewShotConfig, examples: &[Exemplar]) -> ExampleStatus {
    let mut categories: Vec<CategoryExamples> = Vec::new();
    for entry in &config.examples {
        if !categories.iter().any(|c| c.category == entry.category) {
            categories.push(CategoryExamples {
                category: entry.category.clone(),
                loaded: examples.iter().filter(|e| e.category == entry.category).count(),
            });
        }
    }

    ExampleStatus {
        dir: dir.display().to_string(),
        loaded: examples.len(),
        categories,
    }
}
