pub mod config;
pub mod deck_assembler;
pub mod errors;
pub mod json_recovery;
pub mod llm_providers;
pub mod llm_service;
pub mod logging;
pub mod models;
pub mod package_writer;
pub mod pipeline;
pub mod transcript;

pub use config::Config;
pub use deck_assembler::{AssembledDeck, DeckSet, RenderedNote, assemble, render_card, stable_id};
pub use errors::*;
pub use json_recovery::{JsonMap, JsonResponseParser};
pub use llm_providers::{CompletionProvider, LLMProviderFactory, LLMProviderType};
pub use llm_service::LLMService;
pub use models::*;
pub use package_writer::{NoteTemplate, resolve_output_path, write_package};
pub use pipeline::{PackageTarget, Pipeline, build_package};
pub use transcript::{TitleLookup, TranscriptSource, YtDlp};
