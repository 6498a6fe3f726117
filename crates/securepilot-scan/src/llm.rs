use std::time::Duration;

use securepilot_core::{AnalysisError, LlmConfig, ScanError};
use serde::{Deserialize, Serialize};

use crate::retry::is_transient_status;

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use securepilot_scan::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage {
///     role: Role::User,
///     content: "Scan this patch".into(),
/// };
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use securepilot_scan::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes the `/v1/chat/completions` endpoint:
/// OpenAI, Ollama, vLLM, LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use securepilot_core::LlmConfig;
/// use securepilot_scan::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "gpt-4o");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: Option<String>,
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// Falls back to the provider's API key environment variable (see
    /// [`api_key_env`]) when the config has no key.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ScanError::Config(format!("failed to create HTTP client: {e}")))?;
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(api_key_env(&config.provider)).ok())
            .filter(|k| !k.trim().is_empty());
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    /// Return the model name from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Whether requests will carry an API key.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Send a chat completion request and return the text response.
    ///
    /// Builds a request to `{base_url}/v1/chat/completions` with the given
    /// messages, temperature 0.1, and JSON response format.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::Unavailable`] for connection failures, 408, 429,
    ///   5xx, and undecodable response bodies.
    /// - [`AnalysisError::Refused`] for every other non-success status, a
    ///   content-filtered completion, or an explicit model refusal.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, AnalysisError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com")
            .trim_end_matches('/');
        let url = format!("{base_url}/v1/chat/completions");

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": 0.1,
            "response_format": { "type": "json_object" },
        });

        let mut request = self.client.post(&url);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        request = request.header("Content-Type", "application/json");

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let detail = format!("LLM API error {status}: {}", body_text.trim());
            return Err(if is_transient_status(status.as_u16()) {
                AnalysisError::Unavailable(detail)
            } else {
                AnalysisError::Refused(detail)
            });
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::Unavailable(format!("failed to parse response: {e}")))?;

        extract_content(&response_body)
    }
}

/// Pull the assistant text out of a chat completions response body.
fn extract_content(body: &serde_json::Value) -> Result<String, AnalysisError> {
    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| AnalysisError::Refused(format!("unexpected response structure: {body}")))?;

    if choice.get("finish_reason").and_then(|f| f.as_str()) == Some("content_filter") {
        return Err(AnalysisError::Refused(
            "completion blocked by content filter".into(),
        ));
    }

    let message = choice.get("message");
    if let Some(refusal) = message
        .and_then(|m| m.get("refusal"))
        .and_then(|r| r.as_str())
    {
        return Err(AnalysisError::Refused(format!("model refused: {refusal}")));
    }

    message
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| AnalysisError::Refused(format!("unexpected response structure: {body}")))
}

/// Environment variable holding the API key for a provider.
///
/// `provider` only picks which variable is read. Requests always use the
/// OpenAI chat-completions format, so non-OpenAI providers need a `base_url`
/// pointing at a compatible endpoint (an OpenAI-compatible gateway, Ollama,
/// vLLM, etc.).
///
/// # Examples
///
/// ```
/// use securepilot_scan::llm::api_key_env;
///
/// assert_eq!(api_key_env("openai"), "OPENAI_API_KEY");
/// assert_eq!(api_key_env("anthropic"), "ANTHROPIC_API_KEY");
/// ```
pub fn api_key_env(provider: &str) -> &'static str {
    match provider {
        "anthropic" => "ANTHROPIC_API_KEY",
        "gemini" => "GEMINI_API_KEY",
        _ => "OPENAI_API_KEY",
    }
}
