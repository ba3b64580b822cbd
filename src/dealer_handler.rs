use crate::dealer_applications::SUBMITTED_MESSAGE;
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::{ApplicationStatus, DealerOnboardingRequest};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct ApplicationQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

/// POST /dealers/onboard
///
/// Public, rate limited per client. Stores a pending application with the
/// dealer's database password sealed.
pub async fn onboard(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<DealerOnboardingRequest>>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let request = payload.map(|Json(p)| p).unwrap_or_default();
    tracing::info!(
        "POST /dealers/onboard - dealership: {:?}",
        request.dealership_name
    );

    let application_id = state.applications.submit(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "applicationId": application_id,
            "message": SUBMITTED_MESSAGE
        })),
    ))
}

/// GET /dealers/applications?status=
pub async fn list_applications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ApplicationQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, &headers)?;

    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<ApplicationStatus>().map_err(AppError::BadRequest)?),
    };
    tracing::info!("GET /dealers/applications - status: {:?}", status);

    let applications = state.applications.list(status).await?;
    Ok(Json(json!({ "applications": applications })))
}

/// POST /dealers/applications/:id/approve
pub async fn approve_application(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, &headers)?;
    tracing::info!("POST /dealers/applications/{}/approve", id);

    state.applications.approve(parse_application_id(&id)?).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Dealer application approved"
    })))
}

/// POST /dealers/applications/:id/reject
///
/// Body `{ "reason"?: string }`; a default reason is recorded when omitted.
pub async fn reject_application(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Option<Json<RejectRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, &headers)?;
    tracing::info!("POST /dealers/applications/{}/reject", id);

    let reason = payload.and_then(|Json(body)| body.reason);
    state
        .applications
        .reject(parse_application_id(&id)?, reason)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Dealer application rejected"
    })))
}

fn parse_application_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound("Application not found".to_string()))
}

/// Check `X-Admin-Token` against the configured secret.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(AppError::Unauthorized("Admin access is disabled".to_string()));
    };

    let provided = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !constant_time_compare(provided, expected) {
        tracing::warn!("Rejected admin request with invalid token");
        return Err(AppError::Unauthorized("Invalid admin token".to_string()));
    }

    Ok(())
}

/// Length-checked XOR fold so comparison time does not depend on where
/// the inputs differ.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("secret", "secret"));
        assert!(!constant_time_compare("secret", "secreT"));
        assert!(!constant_time_compare("secret", "secret-longer"));
        assert!(!constant_time_compare("", "secret"));
    }

    #[test]
    fn test_bad_uuid_is_not_found() {
        assert!(matches!(
            parse_application_id("abc"),
            Err(AppError::NotFound(_))
        ));
    }
}
