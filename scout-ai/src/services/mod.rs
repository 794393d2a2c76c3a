//! Classification services
//!
//! Leaf-first: image preprocessing, prompt building, the model client and
//! response parser, then the dedup gate and the pipeline that ties them
//! together. Folder batch runs, few-shot example loading and taxonomy
//! formatting sit on top.

pub mod analysis_identity;
pub mod classification_pipeline;
pub mod few_shot;
pub mod folder_batch;
pub mod gemini_client;
pub mod image_preprocessor;
pub mod prompt_builder;
pub mod response_parser;
pub mod submission_guard;
pub mod taxonomy_formatter;

pub use analysis_identity::{make_id, AnalysisDeduplicator, DedupResult};
pub use classification_pipeline::{
    ClassificationOutcome, ClassificationPipeline, ClassificationRequest, PersistStatus,
    PipelineError, RemoteFailurePolicy,
};
pub use few_shot::{example_status, load_examples, CategoryExamples, ExampleStatus};
pub use folder_batch::{run_batch, BatchError, BatchOptions, BatchReport};
pub use gemini_client::{
    ExampleSection, Exemplar, GeminiClient, GenerationOptions, GenerationRequest, GenerativeModel,
    ModelError, RequestPart,
};
pub use image_preprocessor::{ImageInput, NormalizedImage, PreprocessOptions};
pub use prompt_builder::{PromptOptions, PromptScope};
pub use response_parser::{parse_response, FallbackTemplate, ParseMethod, ParseOutcome};
pub use submission_guard::SubmissionGuard;
pub use taxonomy_formatter::{apply_structure, format_text, FormatError, FormattedStructure};
