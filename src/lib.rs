//! CarGenie API Library
//!
//! Backend for the CarGenie car-matchmaking frontend: structured chat
//! responses from a text provider with quota fallback, dealer assignment,
//! best-effort chat history, lead emails with retry, and rate-limited
//! dealer onboarding.
//!
//! # Modules
//!
//! - `api`: HTTP handlers and routing.
//! - `core`: Response model, generation, fallback, limiter and delivery logic.
//! - `integrations`: Text providers, mail transports, identity, stores and cipher.
//! - `auth`: Bearer-token identity verification.
//! - `circuit_breaker`: Circuit breaker for store writes.
//! - `config`: Configuration management.
//! - `crypto`: Credential sealing.
//! - `db`: Database connection pool and schema.
//! - `dealer_applications`: Onboarding workflow and stores.
//! - `dealer_handler`: Dealer onboarding and admin handlers.
//! - `dealers`: Dealer assignment for recommendations.
//! - `errors`: Error handling types.
//! - `fallback`: Substitute responses on provider quota exhaustion.
//! - `handlers`: Chat, history and email handlers.
//! - `history`: Chat history stores and background recorder.
//! - `llm_client`: Text provider adapters.
//! - `mailer`: Outbound mail transports.
//! - `models`: Core data models.
//! - `notifications`: Lead email construction and delivery.
//! - `rate_limiter`: Per-key fixed-window limiter.
//! - `response_generator`: Prompting and response validation.
//! - `retry`: Bounded retry with backoff.
//! - `routes`: Router construction.
//! - `validation`: Shared input validation.

pub mod api;
pub mod core;
pub mod integrations;

// Re-export primary modules for shared use in tests and the binary
pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod crypto;
pub mod db;
pub mod dealer_applications;
pub mod dealer_handler;
pub mod dealers;
pub mod errors;
pub mod fallback;
pub mod handlers;
pub mod history;
pub mod llm_client;
pub mod mailer;
pub mod models;
pub mod notifications;
pub mod rate_limiter;
pub mod response_generator;
pub mod retry;
pub mod routes;
pub mod validation;
