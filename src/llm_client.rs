//! Text-generation provider adapters.
//!
//! Each adapter turns its provider's error shape into a [`ProviderError`]
//! carrying the status code, error code and message it observed, so the
//! quota check in [`ProviderError::is_quota`] does not depend on any one
//! provider's format.

use crate::config::{Config, LlmProvider};
use crate::errors::AppError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Error code that marks an exhausted usage quota.
pub const INSUFFICIENT_QUOTA: &str = "insufficient_quota";

/// Normalized failure reported by a text provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// True when the provider signalled throttling or an exhausted quota.
    ///
    /// Checks the error code, then the status. The message text is only
    /// consulted when the provider reported no status at all.
    pub fn is_quota(&self) -> bool {
        if self.code.as_deref() == Some(INSUFFICIENT_QUOTA) {
            return true;
        }
        if let Some(status) = self.status {
            return status == 429;
        }
        let message = self.message.to_lowercase();
        message.contains("quota") || message.contains("rate limit")
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.code.as_deref()) {
            (Some(status), Some(code)) => write!(f, "[{} {}] {}", status, code, self.message),
            (Some(status), None) => write!(f, "[{}] {}", status, self.message),
            (None, Some(code)) => write!(f, "[{}] {}", code, self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// A black-box function from prompt to text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`. May return an empty string.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

fn build_http_client(timeout: Duration, provider: &str) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| {
            AppError::ExternalApiError(format!("Failed to create {} client: {}", provider, e))
        })
}

fn transport_error(provider: &str, err: reqwest::Error) -> ProviderError {
    let mut error = if err.is_timeout() {
        ProviderError::new(format!("{} request timed out: {}", provider, err))
    } else {
        ProviderError::new(format!("{} request failed: {}", provider, err))
    };
    error.status = err.status().map(|s| s.as_u16());
    error
}

// ============ OpenAI ============

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiCompletion {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the OpenAI chat completions API in JSON mode.
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: build_http_client(timeout, "OpenAI")?,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key,
            model,
        })
    }

    /// Point the client at another host (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!("Calling OpenAI model {}", self.model);

        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.3,
            "response_format": {"type": "json_object"}
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("OpenAI", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let mut error = match serde_json::from_str::<OpenAiErrorBody>(&error_text) {
                Ok(parsed) => {
                    let mut error = ProviderError::new(parsed.error.message);
                    // Quota failures sometimes only carry the code in `type`.
                    error.code = parsed.error.code.or(parsed.error.kind);
                    error
                }
                Err(_) => ProviderError::new(format!("OpenAI returned {}: {}", status, error_text)),
            };
            error.status = Some(status.as_u16());
            return Err(error);
        }

        let completion: OpenAiCompletion = response.json().await.map_err(|e| {
            ProviderError::new(format!("Failed to parse OpenAI response: {}", e))
        })?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============ Gemini ============

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

/// Client for the Gemini `generateContent` API with a JSON response MIME type.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: build_http_client(timeout, "Gemini")?,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key,
            model,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        tracing::debug!("Calling Gemini model {}", self.model);

        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": 0.3,
                "responseMimeType": "application/json"
            }
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Gemini", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let mut error = match serde_json::from_str::<GeminiErrorBody>(&error_text) {
                Ok(parsed) => {
                    let error = ProviderError::new(parsed.error.message);
                    match parsed.error.status.as_deref() {
                        Some("RESOURCE_EXHAUSTED") => error.with_code(INSUFFICIENT_QUOTA),
                        Some(other) => error.with_code(other),
                        None => error,
                    }
                }
                Err(_) => ProviderError::new(format!("Gemini returned {}: {}", status, error_text)),
            };
            error.status = Some(status.as_u16());
            return Err(error);
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| {
            ProviderError::new(format!("Failed to parse Gemini response: {}", e))
        })?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        Ok(text)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Build the single provider selected by configuration.
pub fn build_text_generator(config: &Config) -> Result<Arc<dyn TextGenerator>, AppError> {
    let timeout = Duration::from_secs(config.llm_timeout_secs);
    let generator: Arc<dyn TextGenerator> = match config.llm_provider {
        LlmProvider::OpenAi => Arc::new(OpenAiClient::new(
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            timeout,
        )?),
        LlmProvider::Gemini => Arc::new(GeminiClient::new(
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            timeout,
        )?),
    };
    tracing::info!("Text provider initialized: {}", generator.name());
    Ok(generator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_by_code() {
        let err = ProviderError::new("You exceeded your plan").with_code(INSUFFICIENT_QUOTA);
        assert!(err.is_quota());
    }

    #[test]
    fn test_quota_by_status() {
        let err = ProviderError::new("Too Many Requests").with_status(429);
        assert!(err.is_quota());
    }

    #[test]
    fn test_quota_by_message_substring() {
        assert!(ProviderError::new("Daily QUOTA reached").is_quota());
        assert!(ProviderError::new("Rate limit hit for model").is_quota());
    }

    #[test]
    fn test_other_failures_are_not_quota() {
        let err = ProviderError::new("internal server error").with_status(500);
        assert!(!err.is_quota());
        let err = ProviderError::new("request timed out");
        assert!(!err.is_quota());
    }

    #[test]
    fn test_quota_wording_ignored_when_status_present() {
        let err = ProviderError::new("internal error while checking quota service").with_status(500);
        assert!(!err.is_quota());
        let err = ProviderError::new("rate limit backend unavailable").with_status(503);
        assert!(!err.is_quota());
    }

    #[test]
    fn test_display_includes_status_and_code() {
        let err = ProviderError::new("boom").with_status(503).with_code("overloaded");
        assert_eq!(err.to_string(), "[503 overloaded] boom");
    }
}
