use tracing::{error, info, warn};

/// Centralized error types for the transcript → package pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Package database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Package archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Transcript unavailable: {0}")]
    TranscriptUnavailable(String),

    #[error("LLM service error: {0}")]
    Llm(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
    pub user_friendly_message: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
            user_friendly_message: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_user_message(mut self, message: &str) -> Self {
        self.user_friendly_message = Some(message.to_string());
        self
    }
}

impl PipelineError {
    /// Short stable label for the error kind, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Schema(_) => "schema",
            PipelineError::Io(_) => "io",
            PipelineError::Database(_) => "database",
            PipelineError::Archive(_) => "archive",
            PipelineError::TranscriptUnavailable(_) => "transcript",
            PipelineError::Llm(_) => "llm",
            PipelineError::Config(_) => "config",
        }
    }

    /// Log the error with context and return the message meant for the user
    pub fn log_with_context(&self, context: ErrorContext) -> String {
        match self {
            PipelineError::TranscriptUnavailable(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error_kind = self.kind(),
                    error = %self,
                    "Transcript not available"
                );
                context.user_friendly_message.unwrap_or_else(|| {
                    format!("No transcript could be found for this {}", context.resource_type)
                })
            }
            PipelineError::Schema(_) | PipelineError::Config(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error_kind = self.kind(),
                    error = %self,
                    "Validation error"
                );
                context.user_friendly_message.unwrap_or_else(|| self.to_string())
            }
            PipelineError::Llm(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error_kind = self.kind(),
                    error = %self,
                    "LLM service error"
                );
                context.user_friendly_message.unwrap_or_else(|| {
                    "AI service request failed. Please try again.".to_string()
                })
            }
            PipelineError::Io(_) | PipelineError::Database(_) | PipelineError::Archive(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error_kind = self.kind(),
                    error = %self,
                    "Package write failed"
                );
                context
                    .user_friendly_message
                    .unwrap_or_else(|| format!("Could not write the package: {}", self))
            }
        }
    }
}

/// Shorthand for building a schema error from anything displayable
pub fn schema_error(message: impl std::fmt::Display) -> PipelineError {
    PipelineError::Schema(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("generate_deck", "video")
            .with_id("dQw4w9WgXcQ")
            .with_user_message("Custom message");

        assert_eq!(context.operation, "generate_deck");
        assert_eq!(context.resource_type, "video");
        assert_eq!(context.resource_id, Some("dQw4w9WgXcQ".to_string()));
        assert_eq!(
            context.user_friendly_message,
            Some("Custom message".to_string())
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(schema_error("missing field").kind(), "schema");
        assert_eq!(
            PipelineError::Io(std::io::Error::other("disk full")).kind(),
            "io"
        );
        assert_eq!(
            PipelineError::Llm(anyhow::anyhow!("timeout")).kind(),
            "llm"
        );
        assert_eq!(
            PipelineError::TranscriptUnavailable("none".into()).kind(),
            "transcript"
        );
    }

    #[test]
    fn test_user_messages() {
        let message = PipelineError::Llm(anyhow::anyhow!("502"))
            .log_with_context(ErrorContext::new("extract_topics", "transcript"));
        assert_eq!(message, "AI service request failed. Please try again.");

        let message = schema_error("unknown variant `unknown`")
            .log_with_context(ErrorContext::new("validate_flashcards", "deck"));
        assert!(message.contains("unknown variant"));

        let message = PipelineError::TranscriptUnavailable("none".into()).log_with_context(
            ErrorContext::new("fetch_transcript", "video").with_user_message("Try another video"),
        );
        assert_eq!(message, "Try another video");
    }
}
