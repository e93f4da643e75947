// Macros file - tracing macros are imported within the macro definitions

/// Standardized logging macros for consistent field names and message patterns across the pipeline
///
/// These macros ensure:
/// - Consistent field naming conventions
/// - Appropriate logging levels for different scenarios
/// - Structured logging with context

// ============================================================================
// Pipeline Stage Logging Macros
// ============================================================================

/// Log pipeline stage transitions with consistent fields
#[macro_export]
macro_rules! log_pipeline_stage {
    (start, $stage:expr, video_id = $video_id:expr) => {
        tracing::info!(
            component = "pipeline",
            stage = $stage,
            video_id = %$video_id,
            "Pipeline stage started"
        );
    };
    (start, $stage:expr) => {
        tracing::info!(
            component = "pipeline",
            stage = $stage,
            "Pipeline stage started"
        );
    };
    (success, $stage:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            component = "pipeline",
            stage = $stage,
            count = $count,
            "Pipeline stage completed: {}", $msg
        );
    };
    (success, $stage:expr, $msg:expr) => {
        tracing::info!(
            component = "pipeline",
            stage = $stage,
            "Pipeline stage completed: {}", $msg
        );
    };
    (error, $stage:expr, error = $error:expr) => {
        tracing::error!(
            component = "pipeline",
            stage = $stage,
            error = %$error,
            "Pipeline stage failed"
        );
    };
}

// ============================================================================
// LLM Service Logging Macros
// ============================================================================

/// Log LLM service operations with provider context
#[macro_export]
macro_rules! log_llm_operation {
    (start, $operation:expr, provider = $provider:expr, prompt_length = $len:expr) => {
        tracing::info!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            prompt_length = $len,
            "LLM operation started"
        );
    };
    (success, $operation:expr, provider = $provider:expr, duration_ms = $duration:expr, response_length = $len:expr) => {
        tracing::info!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            duration_ms = $duration,
            response_length = $len,
            "LLM operation completed successfully"
        );
    };
    (error, $operation:expr, provider = $provider:expr, error = $error:expr) => {
        tracing::error!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            error = %$error,
            "LLM operation failed"
        );
    };
    (warn, $operation:expr, $msg:expr) => {
        tracing::warn!(
            component = "llm_service",
            operation = $operation,
            "LLM operation warning: {}", $msg
        );
    };
}

// ============================================================================
// Package Writer Logging Macros
// ============================================================================

/// Log package writing steps
#[macro_export]
macro_rules! log_package_operation {
    (debug, $operation:expr, deck_count = $decks:expr, note_count = $notes:expr) => {
        tracing::debug!(
            component = "package_writer",
            operation = $operation,
            deck_count = $decks,
            note_count = $notes,
            "Package operation completed"
        );
    };
    (info, $operation:expr, path = $path:expr, $msg:expr) => {
        tracing::info!(
            component = "package_writer",
            operation = $operation,
            path = %$path,
            "Package operation: {}", $msg
        );
    };
    (error, $operation:expr, error = $error:expr) => {
        tracing::error!(
            component = "package_writer",
            operation = $operation,
            error = %$error,
            "Package operation failed"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "shutdown",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Performance Logging Macros
// ============================================================================

/// Log performance metrics with consistent structure
#[macro_export]
macro_rules! log_performance {
    ($operation:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            event_type = "performance",
            operation = $operation,
            duration_ms = $duration,
            "Performance metrics"
        );
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_logging_macros_compile() {
        let error = anyhow::anyhow!("test error");

        log_pipeline_stage!(start, "fetch_transcript", video_id = "dQw4w9WgXcQ");
        log_pipeline_stage!(start, "assemble");
        log_pipeline_stage!(success, "assemble", count = 3, "decks assembled");
        log_pipeline_stage!(success, "write_package", "package written");
        log_pipeline_stage!(error, "write_package", error = error);

        log_llm_operation!(start, "extract_topics", provider = "Groq", prompt_length = 1200);
        log_llm_operation!(
            success,
            "extract_topics",
            provider = "Groq",
            duration_ms = 1500,
            response_length = 800
        );
        log_llm_operation!(error, "extract_topics", provider = "Groq", error = error);
        log_llm_operation!(warn, "extract_topics", "empty response");

        log_package_operation!(debug, "insert_notes", deck_count = 2, note_count = 10);
        log_package_operation!(info, "archive", path = "/tmp/deck.apkg", "archive written");
        log_package_operation!(error, "archive", error = error);

        log_system_event!(startup, component = "cli", "starting");
        log_system_event!(shutdown, component = "cli", "done");
        log_system_event!(config, "configuration loaded successfully");

        log_performance!("pipeline_run", duration_ms = 2500);

        log_validation!(success, "flashcards", "batch validated");
        log_validation!(failure, "flashcards", error = error);
    }
}
