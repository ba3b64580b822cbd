//! Bearer-token identity verification.

use crate::errors::AppError;
use crate::models::ANONYMOUS_USER;
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Resolve `token` to a subject id.
    ///
    /// Invalid or expired tokens yield `AppError::Unauthorized`.
    async fn verify(&self, token: &str) -> Result<String, AppError>;
}

// ============ Firebase ============

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
}

/// Verifies Firebase ID tokens via the Identity Toolkit `accounts:lookup` API.
///
/// Verified subjects are cached for five minutes, keyed by the SHA-256 of
/// the token so raw tokens are never retained.
pub struct FirebaseIdentityVerifier {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    cache: Cache<String, String>,
}

impl FirebaseIdentityVerifier {
    pub fn new(api_key: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create identity client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: "https://identitytoolkit.googleapis.com".to_string(),
            api_key,
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(300))
                .max_capacity(10_000)
                .build(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn cache_key(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<String, AppError> {
        let key = Self::cache_key(token);
        if let Some(uid) = self.cache.get(&key).await {
            return Ok(uid);
        }

        let url = format!("{}/v1/accounts:lookup", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({ "idToken": token }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Identity lookup failed: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("Token rejected by identity service: {}", error_text);
            return Err(AppError::Unauthorized("Invalid token".to_string()));
        }
        if !status.is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Identity service returned {}",
                status
            )));
        }

        let lookup: LookupResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse identity response: {}", e))
        })?;

        let uid = lookup
            .users
            .into_iter()
            .next()
            .map(|u| u.local_id)
            .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))?;

        self.cache.insert(key, uid.clone()).await;
        Ok(uid)
    }
}

// ============ Static ============

/// Fixed token table for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityVerifier {
    tokens: HashMap<String, String>,
}

impl StaticIdentityVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, uid: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), uid.into());
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<String, AppError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))
    }
}

// ============ Header helpers ============

/// The bearer token in `Authorization`, if the header is present.
///
/// A present header that is not a bearer token is rejected.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Some)
        .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))
}

/// Subject id of the caller, or `"anonymous"` when no token is sent.
pub async fn optional_identity(
    verifier: &dyn IdentityVerifier,
    headers: &HeaderMap,
) -> Result<String, AppError> {
    match bearer_token(headers)? {
        Some(token) => verifier.verify(token).await,
        None => Ok(ANONYMOUS_USER.to_string()),
    }
}

/// Subject id of the caller; a token is mandatory.
pub async fn require_identity(
    verifier: &dyn IdentityVerifier,
    headers: &HeaderMap,
) -> Result<String, AppError> {
    match bearer_token(headers)? {
        Some(token) => verifier.verify(token).await,
        None => Err(AppError::Unauthorized("Missing token".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(auth: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = auth {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        }
        headers
    }

    fn verifier() -> StaticIdentityVerifier {
        StaticIdentityVerifier::new().with_token("good", "user-1")
    }

    #[tokio::test]
    async fn test_optional_identity_defaults_to_anonymous() {
        let uid = optional_identity(&verifier(), &headers(None)).await.unwrap();
        assert_eq!(uid, ANONYMOUS_USER);
    }

    #[tokio::test]
    async fn test_optional_identity_rejects_bad_token() {
        let err = optional_identity(&verifier(), &headers(Some("Bearer bad")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_require_identity() {
        let uid = require_identity(&verifier(), &headers(Some("Bearer good")))
            .await
            .unwrap();
        assert_eq!(uid, "user-1");

        let err = require_identity(&verifier(), &headers(None)).await.unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized: Missing token");
    }

    #[test]
    fn test_non_bearer_header_is_rejected() {
        assert!(bearer_token(&headers(Some("Basic abc"))).is_err());
        assert!(bearer_token(&headers(Some("Bearer   "))).is_err());
    }

    #[test]
    fn test_cache_key_does_not_contain_token() {
        let key = FirebaseIdentityVerifier::cache_key("secret-token");
        assert_eq!(key.len(), 64);
        assert!(!key.contains("secret-token"));
    }
}
