use crate::auth::{optional_identity, require_identity, IdentityVerifier};
use crate::dealer_applications::DealerApplicationService;
use crate::dealers::attach_dealers;
use crate::errors::AppError;
use crate::fallback::FallbackSelector;
use crate::history::HistoryRecorder;
use crate::models::{ChatExchange, ChatRequest, ChatResponse, SendEmailPayload};
use crate::notifications::{LeadEmailRequest, NotificationService};
use crate::rate_limiter::RateLimiter;
use crate::response_generator::{GenerationError, ResponseGenerator};
use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Structured response generation through the active text provider.
    pub generator: ResponseGenerator,
    /// Substitute responses while the provider is out of quota.
    pub fallback: Arc<FallbackSelector>,
    /// Background writer for chat exchanges.
    pub history: HistoryRecorder,
    /// Bearer-token verification.
    pub identity: Arc<dyn IdentityVerifier>,
    /// Lead email delivery with retry.
    pub notifications: NotificationService,
    /// Dealer onboarding workflow.
    pub applications: DealerApplicationService,
    /// Per-client limiter for `POST /dealers/onboard`.
    pub onboarding_limiter: Arc<RateLimiter>,
    /// Shared secret for admin routes; `None` disables them.
    pub admin_token: Option<String>,
}

/// Health check endpoint.
///
/// Returns the service status, version, and health information.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with health status JSON.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "cargenie-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /chat
///
/// Turns the user's message into a structured response. When the text
/// provider is out of quota a fallback response is served with a normal 200.
/// The exchange is persisted in the background and never delays the reply.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `headers` - Request headers; an optional bearer token identifies the user.
/// * `payload` - `{ "message": string }`.
///
/// # Returns
///
/// * `Result<Json<ChatResponse>, AppError>` - The enriched response or an error.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<ChatRequest>>,
) -> Result<Json<ChatResponse>, AppError> {
    let user_id = optional_identity(state.identity.as_ref(), &headers).await?;

    let message = payload
        .and_then(|Json(request)| request.message)
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Message is required".to_string()))?;

    tracing::info!("POST /chat - user: {}, {} chars", user_id, message.len());

    let llm_response = match state.generator.generate(&message).await {
        Ok(response) => response,
        Err(GenerationError::QuotaExceeded(e)) => {
            tracing::warn!("Provider quota exceeded, serving fallback: {}", e);
            state.fallback.select()
        }
        Err(e) => return Err(e.into()),
    };

    let response = attach_dealers(llm_response);

    state
        .history
        .record(ChatExchange::new(user_id, message, &response));

    Ok(Json(response))
}

/// GET /chat/history
///
/// Returns the caller's exchanges, oldest first. Store failures yield an
/// empty list.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = require_identity(state.identity.as_ref(), &headers).await?;
    tracing::info!("GET /chat/history - user: {}", user_id);

    let messages = match state.history.store().list_for_user(&user_id).await {
        Ok(messages) => messages,
        Err(e) => {
            tracing::error!("Failed to load chat history for {}: {}", user_id, e);
            Vec::new()
        }
    };

    Ok(Json(json!({ "messages": messages })))
}

/// DELETE /chat/history
pub async fn clear_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = require_identity(state.identity.as_ref(), &headers).await?;
    tracing::info!("DELETE /chat/history - user: {}", user_id);

    let body = match state.history.store().clear_for_user(&user_id).await {
        Ok(deleted) => json!({ "success": true, "deleted": deleted }),
        Err(e) => {
            tracing::error!("Failed to clear chat history for {}: {}", user_id, e);
            json!({ "success": false, "deleted": 0 })
        }
    };

    Ok(Json(body))
}

/// POST /email/send-email
///
/// Validates the lead and emails it to the dealer. Transient transport
/// failures are retried before the request fails with 502.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `headers` - Request headers; a bearer token is required.
/// * `payload` - Lead fields (`dealerEmail`, `carName`, `senderName`, `senderEmail`, `senderPhone?`, `message`).
///
/// # Returns
///
/// * `Result<Json<serde_json::Value>, AppError>` - `{ success, message }` or an error.
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<SendEmailPayload>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = require_identity(state.identity.as_ref(), &headers).await?;

    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let request = LeadEmailRequest::try_from(payload)?;

    tracing::info!(
        "POST /email/send-email - user: {}, car: {}",
        user_id,
        request.car_name
    );

    state.notifications.send_dealer_email(&request).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Email sent successfully"
    })))
}
