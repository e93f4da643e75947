use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use yt_flashcards::config::{Config, LLMConfig, LoggingConfig};
use yt_flashcards::errors::{ErrorContext, PipelineError, PipelineResult};
use yt_flashcards::llm_providers::{LLMProviderFactory, LLMProviderType};
use yt_flashcards::llm_service::LLMService;
use yt_flashcards::models::IndexPolicy;
use yt_flashcards::pipeline::{PackageTarget, Pipeline};
use yt_flashcards::transcript::YtDlp;
use yt_flashcards::log_system_event;

/// Turn a YouTube video into an Anki flashcard package
#[derive(Parser, Debug)]
#[command(name = "yt-flashcards", version, about)]
struct Cli {
    /// Video URL (falls back to YOUTUBE_URL)
    url: Option<String>,

    /// Package file or existing directory to write to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for the package when --output is not given
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Deck name (defaults to DECK_NAME, then the video title)
    #[arg(short, long)]
    deck_name: Option<String>,

    /// LLM provider: groq or gemini
    #[arg(long)]
    provider: Option<String>,

    /// Model override for the selected provider
    #[arg(long)]
    model: Option<String>,

    /// How out-of-range answer indices are handled: permissive, reject or clamp
    #[arg(long)]
    index_policy: Option<String>,

    /// List models offered by the provider and exit
    #[arg(long)]
    list_models: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = setup_logging(&config.logging);
    log_system_event!(startup, component = "yt-flashcards", "Starting flashcard generation");
    config.log_configuration_summary();

    let video_ref = cli.url.clone().unwrap_or_default();
    let outcome = run(cli, config).await;
    log_system_event!(shutdown, component = "yt-flashcards", "Finished");

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message =
                e.log_with_context(ErrorContext::new("generate_package", "video").with_id(&video_ref));
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

/// Environment configuration with command line overrides applied
fn load_config(cli: &Cli) -> PipelineResult<Config> {
    let lookup = |key: &str| env::var(key).ok();
    let mut config = Config::from_lookup(lookup)?;

    if let Some(name) = &cli.provider {
        let provider = LLMProviderType::parse(name)
            .ok_or_else(|| PipelineError::Config(format!("Unknown provider '{}'", name)))?;
        if provider != config.llm.provider {
            config.llm = LLMConfig::for_named_provider(&lookup, provider)?;
        }
    }
    if let Some(model) = &cli.model {
        config.llm.model = Some(model.clone());
    }
    if let Some(policy) = &cli.index_policy {
        config.output.index_policy = IndexPolicy::parse(policy).ok_or_else(|| {
            PipelineError::Config(format!(
                "Invalid index policy '{}'. Use permissive, reject or clamp",
                policy
            ))
        })?;
    }
    Ok(config)
}

async fn run(cli: Cli, config: Config) -> PipelineResult<()> {
    config.validate()?;

    let provider = LLMProviderFactory::create_provider(&config.llm)
        .map_err(|e| PipelineError::Config(e.to_string()))?;

    if cli.list_models {
        for model in provider.list_models().await {
            println!("{}", model);
        }
        return Ok(());
    }

    let video_url = cli
        .url
        .or_else(|| env::var("YOUTUBE_URL").ok())
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| {
            PipelineError::Config("No URL provided (argument or YOUTUBE_URL)".to_string())
        })?;

    let base_dir = match cli.output_dir.or(config.output.directory.clone()) {
        Some(dir) => dir,
        None => env::current_dir()?,
    };
    let target = PackageTarget {
        destination: cli.output,
        base_dir: Some(base_dir),
        deck_name: cli.deck_name.or(config.output.deck_name.clone()),
    };

    let llm = LLMService::new(provider, &config.llm)
        .with_validation_options(config.validation_options());
    let ytdlp = Arc::new(YtDlp::new(config.transcript.clone()));
    let pipeline = Pipeline::new(ytdlp.clone(), ytdlp, llm, config.transcript.languages.clone());

    let path = pipeline.run(&video_url, &target).await?;
    info!(path = %path.display(), "Anki package ready");
    println!("Anki deck created successfully at: {}", path.display());
    Ok(())
}

/// Console logging goes to stderr so stdout only carries results.
fn setup_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    use std::fs;
    use tracing_subscriber::fmt;

    let env_filter = EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| EnvFilter::new("info,yt_flashcards=debug"));

    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_ansi(true)
            .with_writer(std::io::stderr)
    });

    let mut guard = None;
    let file_layer = if config.file_enabled {
        match fs::create_dir_all(&config.log_directory) {
            Ok(()) => {
                // Set up file appender with daily rotation
                let file_appender =
                    tracing_appender::rolling::daily(&config.log_directory, "yt-flashcards.log");
                let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
                guard = Some(file_guard);
                Some(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_ansi(false)
                        .with_writer(non_blocking_file),
                )
            }
            Err(e) => {
                eprintln!("Warning: Could not create logs directory: {}", e);
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if guard.is_some() {
        info!(
            "Logging initialized - writing to {}/yt-flashcards.log with daily rotation",
            config.log_directory
        );
    }
    guard
}
