use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::config::LLMConfig;
use crate::errors::{PipelineError, PipelineResult, schema_error};
use crate::json_recovery::JsonResponseParser;
use crate::llm_providers::CompletionProvider;
use crate::models::{
    FlashcardsResponse, TopicsResponse, ValidationOptions, flashcards_response_schema,
    topics_response_schema, validate_flashcards_with, validate_topics,
};
use crate::{log_llm_operation, log_performance};

const TOPICS_SCHEMA_TEXT: &str = "{\n  \"topics\": [ { \n    \"title\": string,\n    \"subtopics\": [ { \n      \"title\": string, \n      \"summary\": string, \n      \"key_points\": string[] \n    } ] \n  } ] \n}\n";

const FLASHCARDS_SCHEMA_TEXT: &str = "{\n  \"decks\": [\n    {\n      \"topic\": string,\n      \"subtopic\": string?,\n      \"cards\": [\n        { \n          \"type\": \"qa\", \n          \"question\": string, \n          \"answer\": string, \n          \"explanation\": string? \n        } | { \n          \"type\": \"single_choice\", \n          \"question\": string, \n          \"options\": string[], \n          \"correct_option\": number, \n          \"explanation\": string? \n        } | { \n          \"type\": \"multiple_choice\", \n          \"question\": string, \n          \"options\": string[], \n          \"correct_options\": number[], \n          \"explanation\": string? \n        } | { \n          \"type\": \"matching\", \n          \"question\": string?, \n          \"pairs\": [ { \"left\": string, \"right\": string } ] \n        }\n      ]\n    }\n  ]\n}";

/// Prompt asking for the topic outline of a transcript
pub fn topics_prompt(transcript: &str) -> String {
    format!(
        "You are an assistant that returns strict JSON only. \
         Extract a list of high-quality learning topics with subtopics from the transcript. \
         Do not create topics for the course description, instructor, or any other non-learning content. \
         Only create topics for the learning content that is important to learn.\
         Return ONLY valid JSON matching this schema: {TOPICS_SCHEMA_TEXT}\
         Transcript:\n{transcript}"
    )
}

/// Prompt asking for flashcards; embeds the validated outline as JSON
pub fn flashcards_prompt(topics_json: &str, transcript: &str) -> String {
    format!(
        "You are an assistant that returns strict JSON. \
         Create Anki flashcards for the given topics and subtopics. \
         Create as many flashcards as possible for each topic and subtopic. \
         Limit the number of flashcards to 50 for each topic.\
         Do not create flashcards for the course description, instructor, or any other non-learning content. \
         Only create flashcards for the learning content that is important to learn.\
         Create some flashcards for the examples, exercises, questions, etc. that is not the main learning content. \
         These are important to learn and review, but not the main learning content.\
         Card types allowed: qa, single_choice, multiple_choice, matching. \
         For choice questions, include options and the correct index(es). \
         Return ONLY valid JSON matching this schema: {FLASHCARDS_SCHEMA_TEXT}\
         \nTopics JSON:\n{topics_json}\
         \nTranscript:\n{transcript}"
    )
}

/// Two-step generation: topic outline first, then flashcards for it.
#[derive(Clone)]
pub struct LLMService {
    provider: Arc<dyn CompletionProvider>,
    options: ValidationOptions,
    topics_max_tokens: u32,
    flashcards_max_tokens: u32,
}

impl LLMService {
    pub fn new(provider: Arc<dyn CompletionProvider>, config: &LLMConfig) -> Self {
        Self {
            provider,
            options: ValidationOptions::default(),
            topics_max_tokens: config.topics_max_tokens,
            flashcards_max_tokens: config.flashcards_max_tokens,
        }
    }

    pub fn with_validation_options(mut self, options: ValidationOptions) -> Self {
        self.options = options;
        self
    }

    /// Get the provider name for logging and testing
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Get the model name being used
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    async fn request(
        &self,
        operation: &str,
        prompt: &str,
        max_tokens: u32,
        schema: &Value,
    ) -> PipelineResult<String> {
        let provider = self.provider.provider_name();
        log_llm_operation!(start, operation, provider = provider, prompt_length = prompt.len());

        let started = Instant::now();
        let response = self
            .provider
            .complete(prompt, max_tokens, Some(schema))
            .await
            .map_err(|e| {
                log_llm_operation!(error, operation, provider = provider, error = e);
                PipelineError::Llm(e)
            })?;

        let duration_ms = started.elapsed().as_millis() as u64;
        if response.trim().is_empty() {
            log_llm_operation!(warn, operation, "provider returned an empty response");
        }
        log_llm_operation!(
            success,
            operation,
            provider = provider,
            duration_ms = duration_ms,
            response_length = response.len()
        );
        log_performance!(operation, duration_ms = duration_ms);
        Ok(response)
    }

    /// Extract the topic outline of a transcript
    pub async fn extract_topics(&self, transcript: &str) -> PipelineResult<TopicsResponse> {
        let response = self
            .request(
                "extract_topics",
                &topics_prompt(transcript),
                self.topics_max_tokens,
                &topics_response_schema(),
            )
            .await?;

        validate_topics(JsonResponseParser::recover(&response))
    }

    /// Generate flashcard decks for an already validated outline
    pub async fn generate_flashcards(
        &self,
        topics: &TopicsResponse,
        transcript: &str,
    ) -> PipelineResult<FlashcardsResponse> {
        let topics_json = serde_json::to_string(topics)
            .map_err(|e| schema_error(format!("could not serialize topics: {}", e)))?;

        let response = self
            .request(
                "generate_flashcards",
                &flashcards_prompt(&topics_json, transcript),
                self.flashcards_max_tokens,
                &flashcards_response_schema(),
            )
            .await?;

        validate_flashcards_with(JsonResponseParser::recover(&response), &self.options)
    }

    /// Run both calls in order; the second depends on the first
    pub async fn generate_topics_and_flashcards(
        &self,
        transcript: &str,
    ) -> PipelineResult<(TopicsResponse, FlashcardsResponse)> {
        let topics = self.extract_topics(transcript).await?;
        let flashcards = self.generate_flashcards(&topics, transcript).await?;
        Ok((topics, flashcards))
    }
}
