use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::errors::{PipelineError, PipelineResult};
use crate::llm_providers::LLMProviderType;
use crate::models::{IndexPolicy, ValidationOptions};

// Import logging macros
use crate::{log_system_event, log_validation};

const DEFAULT_LANGUAGES: &str = "en,en-US,en-GB";

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub llm: LLMConfig,
    pub transcript: TranscriptConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Large Language Model provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: LLMProviderType,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub topics_max_tokens: u32,
    pub flashcards_max_tokens: u32,
}

/// Subtitle download configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptConfig {
    pub languages: Vec<String>,
    pub ytdlp_binary: String,
    pub proxy: Option<String>,
    pub cookies_browser: Option<String>,
    pub cookies_file: Option<String>,
}

/// Where packages go and how generated cards are validated
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub directory: Option<PathBuf>,
    pub deck_name: Option<String>,
    pub index_policy: IndexPolicy,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

/// Non-empty, trimmed value for `key`
fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn first_of<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter().find_map(|key| non_empty(lookup, key))
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key)
        .and_then(|value| value.parse::<bool>().ok())
        .unwrap_or(default)
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> PipelineResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match non_empty(lookup, key) {
        Some(value) => value.parse::<T>().map_err(|_| {
            PipelineError::Config(format!("Invalid {} value: '{}'. Must be a number", key, value))
        }),
        None => Ok(default),
    }
}

/// Split a comma-separated language list, dropping blanks
pub fn parse_languages(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> PipelineResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> PipelineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        log_system_event!(config, "Loading application configuration");

        let config = Config {
            llm: LLMConfig::from_lookup(&lookup)?,
            transcript: TranscriptConfig::from_lookup(&lookup),
            output: OutputConfig::from_lookup(&lookup)?,
            logging: LoggingConfig::from_lookup(&lookup),
        };

        log_system_event!(config, "Configuration loaded successfully");
        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    pub fn log_configuration_summary(&self) {
        info!(
            llm_provider = ?self.llm.provider,
            llm_model = ?self.llm.model,
            llm_api_key_masked = %mask_sensitive_data(&self.llm.api_key),
            languages = ?self.transcript.languages,
            output_directory = ?self.output.directory,
            index_policy = ?self.output.index_policy,
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values needed to generate a deck
    pub fn validate(&self) -> PipelineResult<()> {
        if self.llm.api_key.trim().is_empty() {
            return Err(PipelineError::Config(format!(
                "{} API key is not set ({})",
                self.llm.provider.display_name(),
                self.llm.provider.api_key_variables().join(" or ")
            )));
        }

        if self.llm.topics_max_tokens == 0 || self.llm.flashcards_max_tokens == 0 {
            return Err(PipelineError::Config(
                "Token budgets must be greater than 0".to_string(),
            ));
        }

        if self.transcript.ytdlp_binary.trim().is_empty() {
            return Err(PipelineError::Config("YTDLP_BINARY must not be empty".to_string()));
        }

        let level = self.logging.level.to_lowercase();
        if !level.contains(',')
            && !level.contains('=')
            && !["trace", "debug", "info", "warn", "error"].contains(&level.as_str())
        {
            warn!(
                "Invalid log level '{}', using 'info' as fallback",
                self.logging.level
            );
        }

        log_validation!(
            success,
            "configuration",
            "Configuration validation completed successfully"
        );
        Ok(())
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions::with_index_policy(self.output.index_policy)
    }
}

impl LLMConfig {
    /// Defaults for a provider with the given key
    pub fn for_provider(provider: LLMProviderType, api_key: String) -> Self {
        let (topics_max_tokens, flashcards_max_tokens) = provider.default_max_tokens();
        Self {
            provider,
            api_key,
            base_url: None,
            model: None,
            timeout_secs: 120,
            topics_max_tokens,
            flashcards_max_tokens,
        }
    }

    fn from_lookup<F>(lookup: &F) -> PipelineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = match non_empty(lookup, "LLM_PROVIDER") {
            Some(name) => LLMProviderType::parse(&name).unwrap_or_else(|| {
                info!("Unknown LLM provider '{}', defaulting to Groq", name);
                LLMProviderType::Groq
            }),
            None => LLMProviderType::Groq,
        };

        Self::for_named_provider(lookup, provider)
    }

    /// Load settings for an explicitly chosen provider
    pub fn for_named_provider<F>(lookup: &F, provider: LLMProviderType) -> PipelineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::for_provider(
            provider,
            first_of(lookup, provider.api_key_variables()).unwrap_or_default(),
        );

        config.base_url = non_empty(lookup, "LLM_BASE_URL");
        config.model = match provider {
            LLMProviderType::Gemini => first_of(lookup, &["LLM_MODEL", "GEMINI_MODEL"]),
            LLMProviderType::Groq => non_empty(lookup, "LLM_MODEL"),
        };
        config.timeout_secs = parse_number(lookup, "LLM_TIMEOUT_SECS", config.timeout_secs)?;
        config.topics_max_tokens =
            parse_number(lookup, "TOPICS_MAX_TOKENS", config.topics_max_tokens)?;
        config.flashcards_max_tokens =
            parse_number(lookup, "FLASHCARDS_MAX_TOKENS", config.flashcards_max_tokens)?;

        Ok(config)
    }
}

impl TranscriptConfig {
    fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let languages = non_empty(lookup, "TRANSCRIPT_LANGUAGES")
            .map(|value| parse_languages(&value))
            .filter(|langs| !langs.is_empty())
            .unwrap_or_else(|| parse_languages(DEFAULT_LANGUAGES));

        TranscriptConfig {
            languages,
            ytdlp_binary: non_empty(lookup, "YTDLP_BINARY").unwrap_or_else(|| "yt-dlp".to_string()),
            proxy: non_empty(lookup, "YTDLP_PROXY"),
            cookies_browser: non_empty(lookup, "YTDLP_COOKIES_BROWSER"),
            cookies_file: non_empty(lookup, "YTDLP_COOKIES_FILE"),
        }
    }
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self::from_lookup(&|_: &str| None)
    }
}

impl OutputConfig {
    fn from_lookup<F>(lookup: &F) -> PipelineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let index_policy = match non_empty(lookup, "INDEX_POLICY") {
            Some(value) => IndexPolicy::parse(&value).ok_or_else(|| {
                PipelineError::Config(format!(
                    "Invalid INDEX_POLICY value: '{}'. Use permissive, reject or clamp",
                    value
                ))
            })?,
            None => IndexPolicy::default(),
        };

        Ok(OutputConfig {
            directory: non_empty(lookup, "OUTPUT_DIR").map(PathBuf::from),
            deck_name: non_empty(lookup, "DECK_NAME"),
            index_policy,
        })
    }
}

impl LoggingConfig {
    fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        LoggingConfig {
            level: non_empty(lookup, "RUST_LOG")
                .unwrap_or_else(|| "info,yt_flashcards=debug".to_string()),
            file_enabled: parse_bool(lookup, "LOG_FILE_ENABLED", false),
            console_enabled: parse_bool(lookup, "LOG_CONSOLE_ENABLED", true),
            log_directory: non_empty(lookup, "LOG_DIRECTORY").unwrap_or_else(|| "logs".to_string()),
        }
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    if data.len() <= 8 {
        "*".repeat(data.len())
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}
