use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::deck_assembler::assemble;
use crate::errors::PipelineResult;
use crate::llm_service::LLMService;
use crate::models::FlashcardsResponse;
use crate::package_writer::{resolve_output_path, write_package};
use crate::transcript::{TitleLookup, TranscriptSource, extract_video_id};
use crate::log_pipeline_stage;

/// Deck name used when neither the caller nor the video provides one
pub const DEFAULT_DECK_NAME: &str = "Generated Deck";

/// Assemble validated flashcards into decks and write the package.
///
/// Returns the path that was written.
pub async fn build_package(
    flashcards: &FlashcardsResponse,
    deck_name: &str,
    destination: Option<&Path>,
    base_dir: Option<&Path>,
) -> PipelineResult<PathBuf> {
    let path = resolve_output_path(deck_name, destination, base_dir)?;

    log_pipeline_stage!(start, "assemble");
    let deck_set = assemble(flashcards, deck_name);
    log_pipeline_stage!(
        success,
        "assemble",
        count = deck_set.decks.len(),
        format!("{} notes grouped", deck_set.note_count())
    );

    log_pipeline_stage!(start, "write_package");
    let written = write_package(&deck_set, &path).await.inspect_err(|e| {
        log_pipeline_stage!(error, "write_package", error = e);
    })?;
    log_pipeline_stage!(success, "write_package", written.display().to_string());
    Ok(written)
}

/// Where a run's package should go
#[derive(Debug, Clone, Default)]
pub struct PackageTarget {
    /// Explicit file (or existing directory) to write to
    pub destination: Option<PathBuf>,
    /// Directory used when no destination is given
    pub base_dir: Option<PathBuf>,
    /// Overrides the video title as deck name
    pub deck_name: Option<String>,
}

/// End-to-end run: transcript, two model calls, deck naming, package.
pub struct Pipeline {
    transcripts: Arc<dyn TranscriptSource>,
    titles: Arc<dyn TitleLookup>,
    llm: LLMService,
    languages: Vec<String>,
}

impl Pipeline {
    pub fn new(
        transcripts: Arc<dyn TranscriptSource>,
        titles: Arc<dyn TitleLookup>,
        llm: LLMService,
        languages: Vec<String>,
    ) -> Self {
        Self {
            transcripts,
            titles,
            llm,
            languages,
        }
    }

    pub async fn run(&self, video_url: &str, target: &PackageTarget) -> PipelineResult<PathBuf> {
        let video_id = extract_video_id(video_url).unwrap_or_else(|| video_url.to_string());

        log_pipeline_stage!(start, "fetch_transcript", video_id = video_id);
        let transcript = self
            .transcripts
            .fetch(video_url, &self.languages)
            .await
            .inspect_err(|e| {
                log_pipeline_stage!(error, "fetch_transcript", error = e);
            })?;
        log_pipeline_stage!(
            success,
            "fetch_transcript",
            count = transcript.len(),
            "transcript characters fetched"
        );

        log_pipeline_stage!(start, "generate", video_id = video_id);
        let (topics, flashcards) = self
            .llm
            .generate_topics_and_flashcards(&transcript)
            .await
            .inspect_err(|e| {
                log_pipeline_stage!(error, "generate", error = e);
            })?;
        log_pipeline_stage!(
            success,
            "generate",
            count = flashcards.card_count(),
            format!("{} topics, {} decks", topics.topics.len(), flashcards.decks.len())
        );

        let deck_name = match target.deck_name.clone() {
            Some(name) => name,
            None => self
                .titles
                .fetch_title(video_url)
                .await
                .unwrap_or_else(|| DEFAULT_DECK_NAME.to_string()),
        };

        build_package(
            &flashcards,
            &deck_name,
            target.destination.as_deref(),
            target.base_dir.as_deref(),
        )
        .await
    }
}
