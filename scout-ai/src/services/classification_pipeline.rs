//! Classification pipeline
//!
//! Runs one classification attempt to completion:
//!
//! 1. Claim the subject's submission slot (rejects concurrent duplicates)
//! 2. Normalize images (blocking pool); zero survivors ends the attempt
//! 3. Build the prompt from the request's taxonomy snapshot (few-shot
//!    requests also carry the labelled example images)
//! 4. Call the model (the only suspension point, bounded by a deadline)
//! 5. Parse the response (never fails; degrades to the fallback template)
//! 6. Derive the analysis id and pass the result through the dedup gate
//!
//! A remote failure either aborts the attempt or records an error
//! placeholder, as the caller chooses. A persistence failure is logged and
//! reported, and the in-memory result is still returned.

use scout_common::config::ModelConfig;
use scout_common::Taxonomy;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

use crate::models::ClassificationResult;
use crate::services::analysis_identity::{make_id, AnalysisDeduplicator, DedupResult};
use crate::services::gemini_client::{
    ExampleSection, Exemplar, GenerationOptions, GenerationRequest, GenerativeModel, ModelError,
};
use crate::services::image_preprocessor::{preprocess_images, ImageInput, PreprocessOptions};
use crate::services::prompt_builder::{
    build_classification_prompt, few_shot_intro, PromptOptions, PromptScope,
};
use crate::services::response_parser::{parse_response, FallbackTemplate, ParseMethod};
use crate::services::submission_guard::SubmissionGuard;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No usable images for {0}")]
    NoUsableImages(String),

    #[error("A classification for {0} is already in progress")]
    Busy(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Common(#[from] scout_common::Error),
}

/// What to do when the remote call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteFailurePolicy {
    /// Return the model error to the caller, persist nothing
    #[default]
    Abort,
    /// Persist an error placeholder result and return it
    RecordPlaceholder,
}

/// One classification attempt
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub subject_label: String,
    pub images: Vec<ImageInput>,
    pub taxonomy: Taxonomy,
    pub preprocess: PreprocessOptions,
    pub prompt: PromptOptions,
    pub on_remote_failure: RemoteFailurePolicy,
    /// Stored image count when it should differ from the number of
    /// normalized images (folder mode records files found)
    pub image_count_override: Option<u32>,
}

/// Result of the persistence step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum PersistStatus {
    Inserted,
    Duplicate,
    /// Storage failed; the result was not written
    Failed(String),
}

/// Everything learned from one attempt
#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    pub result: ClassificationResult,
    /// None when the model call failed and a placeholder was recorded
    pub parse_method: Option<ParseMethod>,
    pub persist: PersistStatus,
    /// Category and item both exist in the request's taxonomy
    pub taxonomy_match: bool,
    /// Model error behind a placeholder result
    pub model_error: Option<String>,
}

/// Orchestrates preprocess → prompt → model → parse → persist
#[derive(Clone)]
pub struct ClassificationPipeline {
    model: Arc<dyn GenerativeModel>,
    db: SqlitePool,
    guard: SubmissionGuard,
    model_config: ModelConfig,
    examples: Arc<Vec<Exemplar>>,
}

impl ClassificationPipeline {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        db: SqlitePool,
        guard: SubmissionGuard,
        model_config: ModelConfig,
    ) -> Self {
        Self {
            model,
            db,
            guard,
            model_config,
            examples: Arc::new(Vec::new()),
        }
    }

    /// Labelled example images sent with few-shot requests
    pub fn with_examples(mut self, examples: Arc<Vec<Exemplar>>) -> Self {
        self.examples = examples;
        self
    }

    pub fn examples(&self) -> &[Exemplar] {
        &self.examples
    }

    pub fn model(&self) -> &Arc<dyn GenerativeModel> {
        &self.model
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    pub async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> Result<ClassificationOutcome, PipelineError> {
        let subject = request.subject_label.clone();
        let _permit = self
            .guard
            .try_acquire(&subject)
            .ok_or_else(|| PipelineError::Busy(subject.clone()))?;

        let supplied = request.images.len();
        let options = request.preprocess;
        let inputs = request.images;
        let images = tokio::task::spawn_blocking(move || preprocess_images(&inputs, options))
            .await
            .map_err(|e| {
                scout_common::Error::Internal(format!("Image preprocessing task failed: {}", e))
            })?;

        if images.is_empty() {
            tracing::warn!(subject = %subject, supplied, "No usable images, skipping model call");
            return Err(PipelineError::NoUsableImages(subject));
        }

        let image_count = request
            .image_count_override
            .unwrap_or_else(|| u32::try_from(images.len()).unwrap_or(u32::MAX));

        tracing::info!(
            subject = %subject,
            images = images.len(),
            model = %self.model.name(),
            "Classifying subject"
        );

        let prompt = build_classification_prompt(&request.taxonomy, images.len(), &request.prompt);
        let generation = GenerationRequest {
            prompt,
            images,
            options: GenerationOptions::json(
                self.model_config.classification_temperature,
                self.model_config.max_output_tokens,
            ),
            examples: self.example_section(&request.prompt, &subject),
        };

        let (result, parse_method, model_error) = match self.model.generate(generation).await {
            Ok(raw) => {
                let outcome = parse_response(&raw, &FallbackTemplate::classification());
                let analyzed_at = scout_common::time::now();
                let result = ClassificationResult::from_fields(
                    make_id(&subject, &analyzed_at),
                    subject.clone(),
                    &outcome.value,
                    image_count,
                    analyzed_at,
                );
                (result, Some(outcome.method), None)
            }
            Err(e) => {
                tracing::error!(subject = %subject, error = %e, "Model call failed");
                if request.on_remote_failure == RemoteFailurePolicy::Abort {
                    return Err(PipelineError::Model(e));
                }
                let message = e.to_string();
                let analyzed_at = scout_common::time::now();
                let result = ClassificationResult::error_placeholder(
                    make_id(&subject, &analyzed_at),
                    subject.clone(),
                    &message,
                    image_count,
                    analyzed_at,
                );
                (result, None, Some(message))
            }
        };

        let taxonomy_match = request
            .taxonomy
            .contains_item(&result.broad_category, &result.specific_item);
        if parse_method.is_some() && !taxonomy_match {
            tracing::debug!(
                subject = %subject,
                category = %result.broad_category,
                item = %result.specific_item,
                "Classification outside configured taxonomy"
            );
        }

        let persist = self.persist(&result).await;

        Ok(ClassificationOutcome {
            result,
            parse_method,
            persist,
            taxonomy_match,
            model_error,
        })
    }

    fn example_section(&self, prompt: &PromptOptions, subject: &str) -> Option<ExampleSection> {
        if prompt.scope != PromptScope::FewShot {
            return None;
        }
        if self.examples.is_empty() {
            tracing::warn!(subject = %subject, "Few-shot request without example images");
        }
        Some(ExampleSection {
            intro: few_shot_intro(),
            examples: Arc::clone(&self.examples),
        })
    }

    async fn persist(&self, result: &ClassificationResult) -> PersistStatus {
        match AnalysisDeduplicator::new(self.db.clone()).store(result).await {
            Ok(DedupResult::Inserted) => PersistStatus::Inserted,
            Ok(DedupResult::Duplicate) => PersistStatus::Duplicate,
            Err(e) => {
                tracing::warn!(
                    analysis_id = %result.analysis_id,
                    error = %e,
                    "Failed to persist classification result"
                );
                PersistStatus::Failed(e.to_string())
            }
        }
    }
}
