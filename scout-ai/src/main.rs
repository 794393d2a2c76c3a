//! scout-ai - property photo classification service
//!
//! Subcommands:
//! - `serve`: HTTP API (classification, history, stats, taxonomies)
//! - `batch`: classify every subject folder under a root directory
//! - `classify`: classify one subject from image files and print the result
//!   (`--few-shot` judges against the labelled example images)
//! - `format-tags`: organise free text into a hierarchy or tag vocabulary
//! - `set-api-key`: store the Gemini API key in the database

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scout_common::config::{self as common_config, TomlConfig};
use scout_common::taxonomy::MergeMode;
use scout_common::Taxonomy;
use sqlx::SqlitePool;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scout_ai::models::FormatTarget;
use scout_ai::services::{
    self, BatchOptions, ClassificationPipeline, ClassificationRequest, ExampleStatus, Exemplar,
    GeminiClient, ImageInput, PreprocessOptions, PromptOptions, PromptScope, RemoteFailurePolicy,
    SubmissionGuard,
};
use scout_ai::AppState;

/// Command-line arguments for scout-ai
#[derive(Parser, Debug)]
#[command(name = "scout-ai")]
#[command(about = "Classify property photographs with a generative vision model")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(long, global = true, env = "SCOUT_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true, env = "SCOUT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        #[arg(short, long, default_value = "5790", env = "SCOUT_PORT")]
        port: u16,

        #[arg(long, default_value = "127.0.0.1", env = "SCOUT_BIND")]
        bind: std::net::IpAddr,
    },

    /// Classify every subfolder of ROOT as one subject
    Batch {
        root: PathBuf,

        /// Directory for the JSON and CSV reports
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Saved taxonomy name (built-in defaults when omitted)
        #[arg(long)]
        taxonomy: Option<String>,
    },

    /// Classify one subject from image files
    Classify {
        subject: String,

        #[arg(required = true)]
        images: Vec<PathBuf>,

        #[arg(long)]
        taxonomy: Option<String>,

        /// Leave impression tags out of the prompt
        #[arg(long)]
        no_impression: bool,

        /// Leave object tags out of the prompt
        #[arg(long)]
        no_object: bool,

        /// Judge against the labelled example images
        #[arg(long, conflicts_with_all = ["no_impression", "no_object"])]
        few_shot: bool,
    },

    /// Organise free text (a file, or `-` for stdin) into a taxonomy structure
    FormatTags {
        #[arg(value_enum)]
        target: TargetArg,

        input: PathBuf,

        /// Saved taxonomy to apply the result to
        #[arg(long)]
        base: Option<String>,

        /// Merge into the base instead of replacing the section
        #[arg(long)]
        merge: bool,

        /// Save the combined taxonomy under this name
        #[arg(long)]
        save_as: Option<String>,
    },

    /// Store the Gemini API key in the database
    SetApiKey { key: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TargetArg {
    Hierarchy,
    Impression,
    Object,
}

impl From<TargetArg> for FormatTarget {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Hierarchy => FormatTarget::Hierarchy,
            TargetArg::Impression => FormatTarget::ImpressionTags,
            TargetArg::Object => FormatTarget::ObjectTags,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env may hold GEMINI_API_KEY; absence is normal
    if let Err(e) = dotenv::dotenv() {
        if !e.not_found() {
            eprintln!("Ignoring unreadable .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scout_ai=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(common_config::default_config_path);
    let toml_config = common_config::load_toml_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let root_folder = common_config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;

    let db_path = common_config::database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let db = scout_ai::db::init_database_pool(&db_path).await?;

    match args.command {
        Command::SetApiKey { key } => {
            if !scout_ai::config::is_valid_key(&key) {
                anyhow::bail!("API key cannot be empty or whitespace-only");
            }
            scout_ai::db::settings::set_gemini_api_key(&db, key).await?;
            info!("Gemini API key stored in database");
            Ok(())
        }
        Command::Serve { port, bind } => {
            let (examples, status) = load_few_shot(&root_folder, &toml_config).await?;
            let pipeline = build_pipeline(&db, &toml_config)
                .await?
                .with_examples(Arc::new(examples));
            serve(db, pipeline, status, &toml_config, SocketAddr::new(bind, port)).await
        }
        Command::Batch {
            root,
            output_dir,
            taxonomy,
        } => {
            let pipeline = build_pipeline(&db, &toml_config).await?;
            let taxonomy = load_taxonomy(&db, taxonomy.as_deref()).await?;
            let options = BatchOptions {
                output_dir,
                run_stamp: scout_common::time::run_stamp(),
                images: toml_config.images.clone(),
            };
            let report = services::run_batch(&pipeline, &root, &taxonomy, &options).await?;
            print!("{}", report.summary());
            Ok(())
        }
        Command::Classify {
            subject,
            images,
            taxonomy,
            no_impression,
            no_object,
            few_shot,
        } => {
            let mut pipeline = build_pipeline(&db, &toml_config).await?;
            let scope = if few_shot {
                let (examples, _) = load_few_shot(&root_folder, &toml_config).await?;
                pipeline = pipeline.with_examples(Arc::new(examples));
                PromptScope::FewShot
            } else {
                PromptScope::Full {
                    include_impression: !no_impression,
                    include_object: !no_object,
                }
            };
            let taxonomy = load_taxonomy(&db, taxonomy.as_deref()).await?;
            let request = ClassificationRequest {
                subject_label: subject,
                images: images.into_iter().map(ImageInput::Path).collect(),
                taxonomy: taxonomy.clone(),
                preprocess: PreprocessOptions::batch(&toml_config.images),
                prompt: PromptOptions {
                    scope,
                    max_slugs: None,
                },
                on_remote_failure: RemoteFailurePolicy::Abort,
                image_count_override: None,
            };
            let outcome = pipeline.classify(request).await?;
            let output = serde_json::json!({
                "result": outcome.result,
                "labels": outcome.result.tag_labels(&taxonomy),
                "parse_method": outcome.parse_method,
                "persisted": outcome.persist,
                "taxonomy_match": outcome.taxonomy_match,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Command::FormatTags {
            target,
            input,
            base,
            merge,
            save_as,
        } => {
            let pipeline = build_pipeline(&db, &toml_config).await?;
            let text = read_input(&input)?;
            let target = FormatTarget::from(target);
            let structure = services::format_text(
                pipeline.model().as_ref(),
                pipeline.model_config(),
                target,
                &text,
            )
            .await?;

            let mut taxonomy = load_taxonomy(&db, base.as_deref()).await?;
            let mode = if merge { MergeMode::Merge } else { MergeMode::Replace };
            services::apply_structure(&mut taxonomy, target, structure.clone(), mode);

            if let Some(name) = save_as {
                scout_ai::db::taxonomies::save_taxonomy(
                    &db,
                    &name,
                    &taxonomy,
                    scout_common::time::now(),
                )
                .await?;
                info!(name = %name, "Saved taxonomy");
            }
            println!("{}", serde_json::to_string_pretty(&structure)?);
            Ok(())
        }
    }
}

async fn build_pipeline(db: &SqlitePool, toml_config: &TomlConfig) -> Result<ClassificationPipeline> {
    let api_key = scout_ai::config::resolve_gemini_api_key(db, toml_config).await?;
    let model_config = toml_config.model.clone();
    let client = GeminiClient::new(
        api_key,
        model_config.name.clone(),
        scout_common::time::secs_to_duration(model_config.timeout_secs),
    )
    .context("Failed to create model client")?;

    info!(model = %model_config.name, timeout_secs = model_config.timeout_secs, "Model client ready");

    Ok(ClassificationPipeline::new(
        Arc::new(client),
        db.clone(),
        SubmissionGuard::new(),
        model_config,
    ))
}

/// Example images from the configured directory (decoded on the blocking pool)
async fn load_few_shot(
    root_folder: &Path,
    toml_config: &TomlConfig,
) -> Result<(Vec<Exemplar>, ExampleStatus)> {
    let config = toml_config.few_shot.clone();
    let dir = config.resolve_dir(root_folder);
    tokio::task::spawn_blocking(move || {
        let examples = services::load_examples(&dir, &config);
        let status = services::example_status(&dir, &config, &examples);
        (examples, status)
    })
    .await
    .context("Few-shot example loading task failed")
}

async fn load_taxonomy(db: &SqlitePool, name: Option<&str>) -> Result<Taxonomy> {
    match name {
        Some(name) => scout_ai::db::taxonomies::load_taxonomy(db, name)
            .await?
            .map(|config| config.taxonomy)
            .with_context(|| format!("Taxonomy {} not found", name)),
        None => Ok(Taxonomy::studio_defaults()),
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

async fn serve(
    db: SqlitePool,
    pipeline: ClassificationPipeline,
    few_shot: ExampleStatus,
    toml_config: &TomlConfig,
    addr: SocketAddr,
) -> Result<()> {
    let state =
        AppState::new(db, pipeline, toml_config.images.clone()).with_few_shot_status(few_shot);
    let app = scout_ai::build_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
