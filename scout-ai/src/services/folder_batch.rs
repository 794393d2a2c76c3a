//! Folder batch classification
//!
//! A root directory holds one subdirectory per subject. Each subdirectory's
//! image files (by extension) become one classification request. Subjects
//! run one after another; remote failures are recorded as error placeholder
//! rows so the report always covers every subject that had images.
//!
//! Output is a pair of files named with the run stamp:
//! - `classification_results_<stamp>.json` (pretty, UTF-8)
//! - `classification_results_<stamp>.csv` (UTF-8 with BOM)

use indexmap::IndexMap;
use scout_common::config::ImageConfig;
use scout_common::Taxonomy;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::models::ClassificationResult;
use crate::services::classification_pipeline::{
    ClassificationPipeline, ClassificationRequest, PipelineError, RemoteFailurePolicy,
};
use crate::services::image_preprocessor::{ImageInput, PreprocessOptions};
use crate::services::prompt_builder::{PromptOptions, PromptScope};

/// Image extensions picked up in subject folders (lower-case)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "heic", "heif"];

const REPORT_PREFIX: &str = "classification_results";
const CSV_HEADER: [&str; 5] = ["フォルダ名", "大分類", "小項目", "判定理由", "画像枚数"];
const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialize(String),
}

/// One subject folder and its image files (sorted by name)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectFolder {
    pub label: String,
    pub images: Vec<PathBuf>,
}

/// Where and how a batch run writes its report
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_dir: PathBuf,
    /// `YYYYMMDD_HHMMSS`, shared by both report files
    pub run_stamp: String,
    pub images: ImageConfig,
}

/// Completed batch run
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: Vec<ClassificationResult>,
    /// Subjects without usable images
    pub skipped: Vec<String>,
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
}

impl BatchReport {
    /// Results per broad category, largest first (ties keep first-seen order)
    pub fn category_counts(&self) -> Vec<(String, usize)> {
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for result in &self.results {
            *counts.entry(result.broad_category.as_str()).or_default() += 1;
        }
        let mut counts: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(category, count)| (category.to_string(), count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }

    /// Plain-text summary for the terminal
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Classified {} subject(s)", self.results.len());
        for result in &self.results {
            let _ = writeln!(
                out,
                "  {} | {} | {} | {} images",
                result.subject_label, result.broad_category, result.specific_item, result.image_count
            );
        }
        if !self.skipped.is_empty() {
            let _ = writeln!(out, "Skipped (no usable images): {}", self.skipped.join(", "));
        }
        let _ = writeln!(out, "By category:");
        for (category, count) in self.category_counts() {
            let _ = writeln!(out, "  {}: {}", category, count);
        }
        let _ = writeln!(out, "JSON: {}", self.json_path.display());
        let _ = writeln!(out, "CSV:  {}", self.csv_path.display());
        out
    }
}

/// List subject folders under `root`, sorted by name; hidden entries skipped
pub fn discover_subjects(root: &Path) -> Result<Vec<SubjectFolder>, BatchError> {
    if !root.exists() {
        return Err(BatchError::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(BatchError::NotADirectory(root.to_path_buf()));
    }

    let mut subjects = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e.file_name()));

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => {
                let label = entry.file_name().to_string_lossy().to_string();
                subjects.push(SubjectFolder {
                    images: find_images(entry.path()),
                    label,
                });
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Error accessing entry: {}", e),
        }
    }

    Ok(subjects)
}

/// Image files directly inside `folder`, sorted by name
fn find_images(folder: &Path) -> Vec<PathBuf> {
    WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Error accessing entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && !is_hidden(entry.file_name()))
        .map(|entry| entry.into_path())
        .filter(|path| has_image_extension(path))
        .collect()
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Classify every subject under `root` and write the report files
pub async fn run_batch(
    pipeline: &ClassificationPipeline,
    root: &Path,
    taxonomy: &Taxonomy,
    options: &BatchOptions,
) -> Result<BatchReport, BatchError> {
    let subjects = discover_subjects(root)?;
    tracing::info!(root = %root.display(), subjects = subjects.len(), "Starting batch run");

    let mut results = Vec::new();
    let mut skipped = Vec::new();

    for (index, subject) in subjects.into_iter().enumerate() {
        if subject.images.is_empty() {
            tracing::warn!(subject = %subject.label, "No image files, skipping");
            skipped.push(subject.label);
            continue;
        }

        tracing::info!(
            subject = %subject.label,
            position = index + 1,
            images = subject.images.len(),
            "Processing subject"
        );

        let request = ClassificationRequest {
            subject_label: subject.label.clone(),
            image_count_override: Some(u32::try_from(subject.images.len()).unwrap_or(u32::MAX)),
            images: subject.images.into_iter().map(ImageInput::Path).collect(),
            taxonomy: taxonomy.clone(),
            preprocess: PreprocessOptions::batch(&options.images),
            prompt: PromptOptions {
                scope: PromptScope::Broad,
                max_slugs: None,
            },
            on_remote_failure: RemoteFailurePolicy::RecordPlaceholder,
        };

        match pipeline.classify(request).await {
            Ok(outcome) => results.push(outcome.result),
            Err(PipelineError::NoUsableImages(label)) => skipped.push(label),
            Err(e) => {
                tracing::error!(subject = %subject.label, error = %e, "Subject failed");
                skipped.push(subject.label);
            }
        }
    }

    std::fs::create_dir_all(&options.output_dir)
        .map_err(|e| BatchError::Io(options.output_dir.clone(), e))?;

    let json_path = options
        .output_dir
        .join(format!("{}_{}.json", REPORT_PREFIX, options.run_stamp));
    let csv_path = options
        .output_dir
        .join(format!("{}_{}.csv", REPORT_PREFIX, options.run_stamp));

    write_json_report(&results, &json_path)?;
    write_csv_report(&results, &csv_path)?;

    tracing::info!(
        classified = results.len(),
        skipped = skipped.len(),
        json = %json_path.display(),
        csv = %csv_path.display(),
        "Batch run complete"
    );

    Ok(BatchReport {
        results,
        skipped,
        json_path,
        csv_path,
    })
}

/// Pretty JSON array of report rows; non-ASCII kept as-is
pub fn write_json_report(results: &[ClassificationResult], path: &Path) -> Result<(), BatchError> {
    let rows: Vec<serde_json::Value> = results.iter().map(|r| r.to_report_json()).collect();
    let content = serde_json::to_string_pretty(&rows)
        .map_err(|e| BatchError::Serialize(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| BatchError::Io(path.to_path_buf(), e))
}

/// CSV with BOM, fixed header, CRLF line endings
pub fn write_csv_report(results: &[ClassificationResult], path: &Path) -> Result<(), BatchError> {
    let mut content = String::from(UTF8_BOM);
    push_csv_row(&mut content, CSV_HEADER.iter().copied());
    for result in results {
        let image_count = result.image_count.to_string();
        push_csv_row(
            &mut content,
            [
                result.subject_label.as_str(),
                result.broad_category.as_str(),
                result.specific_item.as_str(),
                result.reason.as_str(),
                image_count.as_str(),
            ],
        );
    }
    std::fs::write(path, content).map_err(|e| BatchError::Io(path.to_path_buf(), e))
}

fn push_csv_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    let row: Vec<String> = fields.into_iter().map(csv_field).collect();
    out.push_str(&row.join(","));
    out.push_str("\r\n");
}

/// Quote when the field holds a delimiter, quote or line break
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_extension_allow_list() {
        assert!(has_image_extension(Path::new("a/photo.JPG")));
        assert!(has_image_extension(Path::new("a/photo.heic")));
        assert!(!has_image_extension(Path::new("a/notes.txt")));
        assert!(!has_image_extension(Path::new("a/noext")));
    }

    #[test]
    fn test_discover_subjects_sorted_with_images() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir(root.join("b_studio")).unwrap();
        std::fs::create_dir(root.join("a_studio")).unwrap();
        std::fs::create_dir(root.join(".cache")).unwrap();
        std::fs::write(root.join("loose.jpg"), b"x").unwrap();
        std::fs::write(root.join("a_studio").join("2.png"), b"x").unwrap();
        std::fs::write(root.join("a_studio").join("1.jpg"), b"x").unwrap();
        std::fs::write(root.join("a_studio").join("readme.txt"), b"x").unwrap();

        let subjects = discover_subjects(root).unwrap();
        let labels: Vec<&str> = subjects.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["a_studio", "b_studio"]);

        let names: Vec<String> = subjects[0]
            .images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["1.jpg", "2.png"]);
        assert!(subjects[1].images.is_empty());
    }

    #[test]
    fn test_discover_missing_root() {
        let err = discover_subjects(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, BatchError::PathNotFound(_)));
    }

    #[test]
    fn test_csv_report_has_bom_and_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let result = ClassificationResult::error_placeholder(
            "id".to_string(),
            "Studio, East".to_string(),
            "Quota exceeded",
            4,
            Utc::now(),
        );

        write_csv_report(&[result], &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();

        assert!(content.starts_with('\u{feff}'));
        let mut lines = content.trim_start_matches('\u{feff}').split("\r\n");
        assert_eq!(lines.next(), Some("フォルダ名,大分類,小項目,判定理由,画像枚数"));
        assert_eq!(
            lines.next(),
            Some("\"Studio, East\",エラー,エラー,Quota exceeded,4")
        );
    }

    #[test]
    fn test_category_counts_sorted() {
        let make = |category: &str| {
            let mut r = ClassificationResult::error_placeholder(
                "id".to_string(),
                "s".to_string(),
                "",
                1,
                Utc::now(),
            );
            r.broad_category = category.to_string();
            r
        };
        let report = BatchReport {
            results: vec![make("公園"), make("オフィス"), make("オフィス")],
            skipped: Vec::new(),
            json_path: PathBuf::from("r.json"),
            csv_path: PathBuf::from("r.csv"),
        };

        assert_eq!(
            report.category_counts(),
            vec![("オフィス".to_string(), 2), ("公園".to_string(), 1)]
        );
        assert!(report.summary().contains("オフィス: 2"));
    }
}
