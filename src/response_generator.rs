//! Prompt construction, provider invocation and validation of the
//! structured response.

use crate::errors::AppError;
use crate::llm_client::{ProviderError, TextGenerator};
use crate::models::{LlmResponse, ResponseType};
use std::fmt;
use std::sync::Arc;

/// Failure while producing an [`LlmResponse`].
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationError {
    /// The provider is throttling or out of quota. Recoverable via fallback.
    QuotaExceeded(ProviderError),
    /// Any other provider failure (network, timeout, 5xx).
    Provider(ProviderError),
    /// The provider answered but the body is not a valid response.
    Parse(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::QuotaExceeded(e) => write!(f, "Provider quota exceeded: {}", e),
            GenerationError::Provider(e) => write!(f, "Provider failure: {}", e),
            GenerationError::Parse(msg) => write!(f, "Invalid provider response: {}", msg),
        }
    }
}

impl std::error::Error for GenerationError {}

impl From<ProviderError> for GenerationError {
    fn from(err: ProviderError) -> Self {
        if err.is_quota() {
            GenerationError::QuotaExceeded(err)
        } else {
            GenerationError::Provider(err)
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::QuotaExceeded(e) | GenerationError::Provider(e) => {
                AppError::ExternalApiError(e.to_string())
            }
            GenerationError::Parse(msg) => {
                AppError::InternalError(format!("Invalid provider response: {}", msg))
            }
        }
    }
}

/// Turns a user message into a validated [`LlmResponse`].
#[derive(Clone)]
pub struct ResponseGenerator {
    provider: Arc<dyn TextGenerator>,
}

impl ResponseGenerator {
    pub fn new(provider: Arc<dyn TextGenerator>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Generate a response for `message`.
    ///
    /// # Errors
    ///
    /// * `QuotaExceeded` when the provider signals throttling.
    /// * `Provider` for any other provider failure.
    /// * `Parse` when the body is empty, not JSON, carries an unknown tag,
    ///   an empty reply or a non-positive price.
    pub async fn generate(&self, message: &str) -> Result<LlmResponse, GenerationError> {
        let prompt = build_prompt(message);

        let raw = self.provider.generate(&prompt).await.map_err(|e| {
            let err = GenerationError::from(e);
            match &err {
                GenerationError::QuotaExceeded(e) => {
                    tracing::warn!("{} quota exceeded: {}", self.provider.name(), e)
                }
                other => tracing::error!("{} call failed: {}", self.provider.name(), other),
            }
            err
        })?;

        let response = parse_response(&raw).map_err(|e| {
            tracing::error!("{} returned an unusable body: {}", self.provider.name(), e);
            e
        })?;

        tracing::debug!(
            "{} produced a {} response",
            self.provider.name(),
            response.response_type()
        );
        Ok(response)
    }
}

/// Prompt asking for strict JSON in one of the four response shapes.
pub fn build_prompt(message: &str) -> String {
    let tags = ResponseType::ALL
        .iter()
        .map(|t| format!("\"{}\"", t.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are CarGenie, a car buying assistant for the Nigerian market.

User request:
"{message}"

Decide which kind of answer fits the request and return ONLY valid JSON,
with "responseType" set to one of {tags}:

{{"responseType": "car_recommendations", "reply": string, "cars": [{{"id": string, "name": string, "price": number, "color": string}}]}}
{{"responseType": "advice", "reply": string, "advice": [string]}}
{{"responseType": "clarification", "reply": string, "questions": [string]}}
{{"responseType": "general", "reply": string}}

Prices are whole numbers in kobo. "reply" must never be empty. Do not wrap the JSON in Markdown."#
    )
}

/// Remove a surrounding Markdown code fence, if present.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse and validate a provider body.
pub fn parse_response(raw: &str) -> Result<LlmResponse, GenerationError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(GenerationError::Parse("empty response body".to_string()));
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| GenerationError::Parse(format!("not valid JSON: {}", e)))?;

    let tag = value
        .get("responseType")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| GenerationError::Parse("missing responseType".to_string()))?;
    tag.parse::<ResponseType>().map_err(GenerationError::Parse)?;

    let response: LlmResponse = serde_json::from_value(value)
        .map_err(|e| GenerationError::Parse(format!("malformed {} response: {}", tag, e)))?;

    validate(&response)?;
    Ok(response)
}

fn validate(response: &LlmResponse) -> Result<(), GenerationError> {
    if response.reply().trim().is_empty() {
        return Err(GenerationError::Parse("reply is empty".to_string()));
    }
    if let LlmResponse::CarRecommendations { cars, .. } = response {
        if let Some(car) = cars.iter().find(|c| c.price == 0) {
            return Err(GenerationError::Parse(format!(
                "car '{}' has a non-positive price",
                car.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::INSUFFICIENT_QUOTA;
    use async_trait::async_trait;

    struct CannedProvider(Result<String, ProviderError>);

    #[async_trait]
    impl TextGenerator for CannedProvider {
        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.0.clone()
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn generator(result: Result<String, ProviderError>) -> ResponseGenerator {
        ResponseGenerator::new(Arc::new(CannedProvider(result)))
    }

    #[test]
    fn test_prompt_embeds_message_and_tags() {
        let prompt = build_prompt("I want a red sedan");
        assert!(prompt.contains("\"I want a red sedan\""));
        for tag in ResponseType::ALL {
            assert!(prompt.contains(tag.as_str()));
        }
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[test]
    fn test_parse_fenced_general() {
        let parsed =
            parse_response("```json\n{\"responseType\":\"general\",\"reply\":\"Hi\"}\n```").unwrap();
        assert_eq!(
            parsed,
            LlmResponse::General {
                reply: "Hi".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_tag_is_parse_failure() {
        let err = parse_response(r#"{"responseType":"poem","reply":"roses"}"#).unwrap_err();
        assert!(matches!(err, GenerationError::Parse(_)));
    }

    #[test]
    fn test_malformed_body_error_names_tag() {
        let err =
            parse_response(r#"{"responseType":"car_recommendations","reply":"Cars"}"#).unwrap_err();
        match err {
            GenerationError::Parse(msg) => assert!(msg.contains("malformed car_recommendations")),
            other => panic!("expected parse failure, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_reply_is_parse_failure() {
        let err = parse_response(r#"{"responseType":"general","reply":"  "}"#).unwrap_err();
        assert!(matches!(err, GenerationError::Parse(_)));
    }

    #[test]
    fn test_zero_price_is_parse_failure() {
        let err = parse_response(
            r#"{"responseType":"car_recommendations","reply":"x","cars":[{"id":"1","name":"A","price":0,"color":"red"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, GenerationError::Parse(_)));
    }

    #[test]
    fn test_empty_body_is_parse_failure() {
        assert!(matches!(parse_response(""), Err(GenerationError::Parse(_))));
    }

    #[tokio::test]
    async fn test_quota_error_is_classified() {
        let gen = generator(Err(
            ProviderError::new("exceeded").with_code(INSUFFICIENT_QUOTA)
        ));
        let err = gen.generate("hello").await.unwrap_err();
        assert!(matches!(err, GenerationError::QuotaExceeded(_)));
    }

    #[tokio::test]
    async fn test_other_provider_error_propagates_unchanged() {
        let original = ProviderError::new("upstream exploded").with_status(500);
        let gen = generator(Err(original.clone()));
        let err = gen.generate("hello").await.unwrap_err();
        assert_eq!(err, GenerationError::Provider(original));
    }

    #[tokio::test]
    async fn test_generate_returns_validated_variant() {
        let gen = generator(Ok(
            r#"{"responseType":"clarification","reply":"What budget?","questions":["Budget?"]}"#
                .to_string(),
        ));
        let response = gen.generate("I need a car").await.unwrap();
        assert_eq!(response.response_type(), ResponseType::Clarification);
    }
}
