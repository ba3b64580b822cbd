//! Per-key fixed-window request limiter.
//!
//! Each key owns one window of `window` length starting at its first
//! request. The window's counter is replaced, not decremented, once the
//! window elapses. State is process-local and lost on restart.

use crate::errors::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max: NonZeroU32,
    pub message: String,
}

impl RateLimitConfig {
    /// Limits applied to `POST /dealers/onboard`: 3 per hour.
    pub fn onboarding() -> Self {
        Self {
            window: Duration::from_secs(60 * 60),
            max: NonZeroU32::new(3).unwrap_or(NonZeroU32::MIN),
            message: "Too many applications submitted. Please try again in an hour.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Rejected { retry_after_secs: u64 },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.config.message
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    /// Count one request for `key` at `now`.
    ///
    /// Sweeps expired windows first; an entry at or past its `reset_at`
    /// is treated as absent.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        entries.retain(|_, entry| now < entry.reset_at);

        let Some(entry) = entries.get_mut(key) else {
            entries.insert(
                key.to_string(),
                WindowEntry {
                    count: 1,
                    reset_at: now + self.config.window,
                },
            );
            return RateLimitDecision::Allowed;
        };

        entry.count = entry.count.saturating_add(1);
        if entry.count <= self.config.max.get() {
            return RateLimitDecision::Allowed;
        }

        let remaining = entry.reset_at.saturating_duration_since(now);
        let retry_after_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        RateLimitDecision::Rejected { retry_after_secs }
    }

    /// Number of live windows (expired ones are dropped on the next check).
    pub fn tracked_keys(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Client identity used as the limiter key.
///
/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware rejecting requests over the limit with 429 and `Retry-After`.
pub async fn enforce_rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer);

    match limiter.check(&key) {
        RateLimitDecision::Allowed => next.run(request).await,
        RateLimitDecision::Rejected { retry_after_secs } => {
            tracing::warn!(
                "Rate limit exceeded for {} on {}",
                key,
                request.uri().path()
            );
            AppError::RateLimited {
                message: limiter.message().to_string(),
                retry_after_secs,
            }
            .into_response()
        }
    }
}
