use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::LLMConfig;

/// Text completion backend used by the flashcard generator.
///
/// Implementations return the raw model text; callers run it through
/// [`JsonResponseParser`](crate::json_recovery::JsonResponseParser).
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete a prompt. `response_schema` is a hint; providers may ignore it.
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        response_schema: Option<&Value>,
    ) -> Result<String>;

    /// Models this provider can serve, falling back to known defaults
    async fn list_models(&self) -> Vec<String>;

    fn provider_name(&self) -> &'static str;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LLMProviderType {
    #[default]
    Groq,
    Gemini,
}

impl LLMProviderType {
    /// Parse a provider name; unknown names yield `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "groq" => Some(LLMProviderType::Groq),
            "gemini" | "google" => Some(LLMProviderType::Gemini),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LLMProviderType::Groq => "openai/gpt-oss-120b",
            LLMProviderType::Gemini => "gemini-1.5-pro",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            LLMProviderType::Groq => "https://api.groq.com/openai/v1",
            LLMProviderType::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    /// Token budgets for the (topics, flashcards) calls
    pub fn default_max_tokens(&self) -> (u32, u32) {
        match self {
            LLMProviderType::Groq => (1_500, 3_000),
            LLMProviderType::Gemini => (65_535, 65_535),
        }
    }

    fn fallback_models(&self) -> Vec<String> {
        let models: &[&str] = match self {
            LLMProviderType::Groq => &["openai/gpt-oss-120b"],
            LLMProviderType::Gemini => &["gemini-1.5-pro", "gemini-1.5-flash"],
        };
        models.iter().map(|m| m.to_string()).collect()
    }
}

/// Common message structure for chat requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: String,
    pub content: String,
}

fn build_client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Groq provider (OpenAI-compatible chat completions)
#[derive(Debug, Clone)]
pub struct GroqProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<LLMMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModelEntry {
    id: String,
}

impl GroqProvider {
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let provider = LLMProviderType::Groq;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key: config.api_key.clone(),
            base_url: trim_base_url(
                config
                    .base_url
                    .as_deref()
                    .unwrap_or(provider.default_base_url()),
            ),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string()),
        })
    }

    fn build_request(
        &self,
        prompt: &str,
        max_tokens: u32,
        response_schema: Option<&Value>,
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![LLMMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: 0.0,
            max_tokens,
            response_format: response_schema.map(|_| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        }
    }

    async fn fetch_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?;
        let list: ModelList = response.json().await?;
        let mut names: Vec<String> = list.data.into_iter().map(|m| m.id).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[async_trait]
impl CompletionProvider for GroqProvider {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        response_schema: Option<&Value>,
    ) -> Result<String> {
        let request_body = self.build_request(prompt, max_tokens, response_schema);

        info!(
            provider = self.provider_name(),
            model = %self.model,
            base_url = %self.base_url,
            prompt_length = prompt.len(),
            max_tokens,
            "Making LLM request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = self.provider_name(),
                status = %status,
                error = %error_text,
                "LLM API request failed"
            );
            return Err(anyhow!("Groq API request failed ({}): {}", status, error_text));
        }

        let chat_response: ChatResponse = response.json().await?;
        let content = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices in Groq response"))?
            .message
            .content
            .unwrap_or_default();

        info!(
            provider = self.provider_name(),
            response_length = content.len(),
            "Successfully received LLM response"
        );
        Ok(content)
    }

    async fn list_models(&self) -> Vec<String> {
        match self.fetch_models().await {
            Ok(names) if !names.is_empty() => names,
            Ok(_) => LLMProviderType::Groq.fallback_models(),
            Err(e) => {
                warn!(provider = self.provider_name(), error = %e, "Could not list models");
                LLMProviderType::Groq.fallback_models()
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "Groq"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Gemini provider implementation
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

const GEMINI_SYSTEM_INSTRUCTION: &str =
    "You are an expert at analyzing transcripts and creating Anki flashcards.";

#[derive(Debug, Clone, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction")]
    system_instruction: GeminiContent,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_k: i32,
    top_p: f32,
    max_output_tokens: u32,
    response_mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<GeminiModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModelEntry {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

fn text_content(text: String) -> GeminiContent {
    GeminiContent {
        role: None,
        parts: vec![GeminiPart { text: Some(text) }],
    }
}

/// Gemini expects upper-case OpenAPI type names
fn to_gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let converted = match (key.as_str(), value) {
                        ("type", Value::String(kind)) => Value::String(kind.to_uppercase()),
                        _ => to_gemini_schema(value),
                    };
                    (key.clone(), converted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(to_gemini_schema).collect()),
        other => other.clone(),
    }
}

/// All text parts of all candidates, newline-joined
fn collect_candidate_text(response: GeminiResponse) -> String {
    response
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join("\n")
}

impl GeminiProvider {
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let provider = LLMProviderType::Gemini;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key: config.api_key.clone(),
            base_url: trim_base_url(
                config
                    .base_url
                    .as_deref()
                    .unwrap_or(provider.default_base_url()),
            ),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string()),
        })
    }

    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    fn build_request(
        &self,
        prompt: &str,
        max_tokens: u32,
        response_schema: Option<&Value>,
    ) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some(prompt.to_string()),
                }],
            }],
            system_instruction: text_content(GEMINI_SYSTEM_INSTRUCTION.to_string()),
            generation_config: GeminiGenerationConfig {
                temperature: 0.0,
                top_k: 40,
                top_p: 0.95,
                max_output_tokens: max_tokens,
                response_mime_type: "application/json".to_string(),
                response_schema: response_schema.map(to_gemini_schema),
            },
        }
    }

    async fn fetch_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;
        let list: GeminiModelList = response.json().await?;
        let mut names: Vec<String> = list
            .models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
            })
            .map(|m| m.name)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        response_schema: Option<&Value>,
    ) -> Result<String> {
        let request_body = self.build_request(prompt, max_tokens, response_schema);
        let url = format!("{}/{}:generateContent", self.base_url, self.model_path());

        info!(
            provider = self.provider_name(),
            model = %self.model,
            base_url = %self.base_url,
            prompt_length = prompt.len(),
            max_tokens,
            "Making LLM request"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = self.provider_name(),
                status = %status,
                error = %error_text,
                "LLM API request failed"
            );
            return Err(anyhow!("Gemini API request failed ({}): {}", status, error_text));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        if gemini_response.candidates.is_empty() {
            return Err(anyhow!("No candidates in Gemini response"));
        }

        let content = collect_candidate_text(gemini_response);
        debug!(
            provider = self.provider_name(),
            response_length = content.len(),
            "Successfully received LLM response"
        );
        Ok(content)
    }

    async fn list_models(&self) -> Vec<String> {
        match self.fetch_models().await {
            Ok(names) if !names.is_empty() => names,
            Ok(_) => LLMProviderType::Gemini.fallback_models(),
            Err(e) => {
                warn!(provider = self.provider_name(), error = %e, "Could not list models");
                LLMProviderType::Gemini.fallback_models()
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "Gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Factory for creating LLM providers based on configuration
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Create the configured provider; fails when no API key is set
    pub fn create_provider(config: &LLMConfig) -> Result<Arc<dyn CompletionProvider>> {
        if config.api_key.trim().is_empty() {
            return Err(anyhow!(
                "{} API key is not set ({})",
                config.provider.display_name(),
                config.provider.api_key_variables().join(" or ")
            ));
        }

        let provider: Arc<dyn CompletionProvider> = match config.provider {
            LLMProviderType::Groq => Arc::new(GroqProvider::new(config)?),
            LLMProviderType::Gemini => Arc::new(GeminiProvider::new(config)?),
        };

        info!(
            provider = provider.provider_name(),
            model = provider.model_name(),
            "Initialized LLM provider"
        );
        Ok(provider)
    }
}

impl LLMProviderType {
    pub fn display_name(&self) -> &'static str {
        match self {
            LLMProviderType::Groq => "Groq",
            LLMProviderType::Gemini => "Gemini",
        }
    }

    /// Environment variables consulted for the API key, in order
    pub fn api_key_variables(&self) -> &'static [&'static str] {
        match self {
            LLMProviderType::Groq => &["GROQ_API_KEY", "GROQ_API_TOKEN"],
            LLMProviderType::Gemini => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(provider: LLMProviderType, api_key: &str) -> LLMConfig {
        LLMConfig::for_provider(provider, api_key.to_string())
    }

    #[test]
    fn test_provider_parsing() {
        let test_cases = vec![
            ("groq", Some(LLMProviderType::Groq)),
            ("Groq", Some(LLMProviderType::Groq)),
            ("gemini", Some(LLMProviderType::Gemini)),
            ("GOOGLE", Some(LLMProviderType::Gemini)),
            ("claude", None),
            ("", None),
        ];
        for (input, expected) in test_cases {
            assert_eq!(LLMProviderType::parse(input), expected, "input '{}'", input);
        }
    }

    #[test]
    fn test_factory_requires_api_key() {
        let result = LLMProviderFactory::create_provider(&config(LLMProviderType::Groq, "  "));
        let message = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.contains("GROQ_API_KEY"));
    }

    #[test]
    fn test_factory_creates_each_provider() {
        let groq = LLMProviderFactory::create_provider(&config(LLMProviderType::Groq, "gsk-test"))
            .unwrap();
        assert_eq!(groq.provider_name(), "Groq");
        assert_eq!(groq.model_name(), "openai/gpt-oss-120b");

        let gemini =
            LLMProviderFactory::create_provider(&config(LLMProviderType::Gemini, "AIza-test"))
                .unwrap();
        assert_eq!(gemini.provider_name(), "Gemini");
        assert_eq!(gemini.model_name(), "gemini-1.5-pro");
    }

    #[test]
    fn test_groq_request_shape() {
        let mut cfg = config(LLMProviderType::Groq, "gsk-test");
        cfg.base_url = Some("http://localhost:8080/v1/".to_string());
        let provider = GroqProvider::new(&cfg).unwrap();
        assert_eq!(provider.base_url, "http://localhost:8080/v1");

        let plain = serde_json::to_value(provider.build_request("hi", 1500, None)).unwrap();
        assert_eq!(plain["max_tokens"], 1500);
        assert_eq!(plain["temperature"], 0.0);
        assert_eq!(plain["messages"][0]["role"], "user");
        assert!(plain.get("response_format").is_none());

        let schema = json!({"type": "object"});
        let hinted = serde_json::to_value(provider.build_request("hi", 10, Some(&schema))).unwrap();
        assert_eq!(hinted["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_gemini_request_shape() {
        let mut cfg = config(LLMProviderType::Gemini, "AIza-test");
        cfg.model = Some("models/gemini-test".to_string());
        let provider = GeminiProvider::new(&cfg).unwrap();
        assert_eq!(provider.model_path(), "models/gemini-test");

        let schema = json!({"type": "object", "properties": {"topics": {"type": "array"}}});
        let body =
            serde_json::to_value(provider.build_request("prompt", 65_535, Some(&schema))).unwrap();
        let generation = &body["generationConfig"];
        assert_eq!(generation["maxOutputTokens"], 65_535);
        assert_eq!(generation["topK"], 40);
        assert_eq!(generation["responseMimeType"], "application/json");
        assert_eq!(generation["responseSchema"]["type"], "OBJECT");
        assert_eq!(
            generation["responseSchema"]["properties"]["topics"]["type"],
            "ARRAY"
        );
        assert_eq!(body["contents"][0]["parts"][0]["text"], "prompt");
        assert!(
            body["systemInstruction"]["parts"][0]["text"]
                .as_str()
                .is_some_and(|s| s.contains("Anki flashcards"))
        );
    }

    #[test]
    fn test_gemini_candidate_text_is_joined() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"parts": [{"text": "{\"topics\":"}, {"text": "[]}"}]}},
                {"content": {"parts": []}},
                {}
            ]
        }))
        .unwrap();
        assert_eq!(collect_candidate_text(response), "{\"topics\":\n[]}");
    }

    #[test]
    fn test_property_named_type_is_preserved() {
        let schema = json!({"properties": {"type": {"type": "string", "enum": ["qa"]}}});
        let converted = to_gemini_schema(&schema);
        assert_eq!(converted["properties"]["type"]["type"], "STRING");
        assert_eq!(converted["properties"]["type"]["enum"][0], "qa");
    }
}
