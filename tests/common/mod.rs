//! Shared fixtures for router-level tests: in-memory stores, a static
//! identity table and a recording mail transport.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use cargenie_api::api::handlers::AppState;
use cargenie_api::api::routes::build_router;
use cargenie_api::auth::StaticIdentityVerifier;
use cargenie_api::crypto::SecretBoxCipher;
use cargenie_api::dealer_applications::{DealerApplicationService, InMemoryDealerApplicationStore};
use cargenie_api::fallback::FallbackSelector;
use cargenie_api::history::{HistoryRecorder, InMemoryChatHistoryStore};
use cargenie_api::llm_client::TextGenerator;
use cargenie_api::mailer::{DeliveryError, EmailMessage, MailTransport};
use cargenie_api::notifications::{NotificationService, NotificationSettings};
use cargenie_api::rate_limiter::{RateLimitConfig, RateLimiter};
use cargenie_api::response_generator::ResponseGenerator;
use cargenie_api::retry::RetryPolicy;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

pub const USER_TOKEN: &str = "user-token";
pub const USER_ID: &str = "user-1";
pub const OTHER_TOKEN: &str = "other-token";
pub const OTHER_ID: &str = "user-2";
pub const ADMIN_TOKEN: &str = "admin-secret";

/// Mail transport that records messages, optionally failing every send.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub fail_with: Option<DeliveryError>,
}

impl RecordingMailer {
    pub fn failing(err: DeliveryError) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(err),
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub struct TestApp {
    pub router: Router,
    pub history: Arc<InMemoryChatHistoryStore>,
    pub applications: Arc<InMemoryDealerApplicationStore>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn test_app(provider: Arc<dyn TextGenerator>) -> TestApp {
    test_app_with_mailer(provider, Arc::new(RecordingMailer::default()))
}

pub fn test_app_with_mailer(
    provider: Arc<dyn TextGenerator>,
    mailer: Arc<RecordingMailer>,
) -> TestApp {
    let history = Arc::new(InMemoryChatHistoryStore::new());
    let applications = Arc::new(InMemoryDealerApplicationStore::new());

    let state = Arc::new(AppState {
        generator: ResponseGenerator::new(provider),
        // Always the car recommendation entry, so fallback output is predictable.
        fallback: Arc::new(FallbackSelector::with_picker(Box::new(|_| 0))),
        history: HistoryRecorder::new(history.clone()),
        identity: Arc::new(
            StaticIdentityVerifier::new()
                .with_token(USER_TOKEN, USER_ID)
                .with_token(OTHER_TOKEN, OTHER_ID),
        ),
        notifications: NotificationService::with_policy(
            mailer.clone(),
            NotificationSettings {
                mail_from: "leads@cargenie.ng".to_string(),
                test_recipient: None,
                lead_copy: None,
            },
            RetryPolicy::linear(3, Duration::from_millis(1)),
        ),
        applications: DealerApplicationService::new(
            applications.clone(),
            Arc::new(SecretBoxCipher::from_key_material("integration test key").unwrap()),
        ),
        onboarding_limiter: Arc::new(RateLimiter::new(RateLimitConfig::onboarding())),
        admin_token: Some(ADMIN_TOKEN.to_string()),
    });

    TestApp {
        router: build_router(state),
        history,
        applications,
        mailer,
    }
}

/// Drive one request through the router and decode the JSON body.
pub async fn call(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, headers, body)
}

pub fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// Background history writes are not awaited by the handler.
pub async fn wait_for_history(store: &InMemoryChatHistoryStore, expected: usize) {
    for _ in 0..100 {
        if store.len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} history records, found {}",
        expected,
        store.len()
    );
}
