//! Chat history persistence.
//!
//! Writes are best-effort: [`HistoryRecorder`] spawns them in the
//! background and only logs failures, so a broken store never affects the
//! chat reply.

use crate::circuit_breaker::{create_store_circuit_breaker, StoreCircuitBreaker};
use crate::errors::AppError;
use crate::models::{ChatExchange, ResponsePayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use failsafe::futures::CircuitBreaker;
use sqlx::PgPool;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[async_trait]
pub trait ChatHistoryStore: Send + Sync {
    async fn add(&self, exchange: &ChatExchange) -> Result<(), AppError>;

    /// All exchanges for `user_id`, oldest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ChatExchange>, AppError>;

    /// Delete every exchange for `user_id`, returning how many were removed.
    async fn clear_for_user(&self, user_id: &str) -> Result<u64, AppError>;
}

// ============ Postgres ============

pub struct PgChatHistoryStore {
    pool: PgPool,
}

impl PgChatHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type ExchangeRow = (
    Uuid,
    String,
    String,
    String,
    serde_json::Value,
    f64,
    DateTime<Utc>,
);

fn exchange_from_row(row: ExchangeRow) -> Result<ChatExchange, AppError> {
    let (id, user_id, user_message, assistant_reply, payload, confidence, created_at) = row;
    let payload: ResponsePayload = serde_json::from_value(payload).map_err(|e| {
        AppError::InternalError(format!("Corrupt payload on chat exchange {}: {}", id, e))
    })?;
    Ok(ChatExchange {
        id,
        user_id,
        user_message,
        assistant_reply,
        payload,
        confidence,
        created_at,
    })
}

#[async_trait]
impl ChatHistoryStore for PgChatHistoryStore {
    async fn add(&self, exchange: &ChatExchange) -> Result<(), AppError> {
        let payload = serde_json::to_value(&exchange.payload)
            .map_err(|e| AppError::InternalError(format!("Failed to encode payload: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO chat_exchanges
                (id, user_id, user_message, assistant_reply, response_type, payload, confidence, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(exchange.id)
        .bind(&exchange.user_id)
        .bind(&exchange.user_message)
        .bind(&exchange.assistant_reply)
        .bind(exchange.response_type().as_str())
        .bind(payload)
        .bind(exchange.confidence)
        .bind(exchange.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ChatExchange>, AppError> {
        let rows = sqlx::query_as::<_, ExchangeRow>(
            r#"
            SELECT id, user_id, user_message, assistant_reply, payload, confidence, created_at
            FROM chat_exchanges
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(exchange_from_row).collect()
    }

    async fn clear_for_user(&self, user_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM chat_exchanges WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// ============ In-memory ============

/// Process-local store for tests and local runs.
#[derive(Default)]
pub struct InMemoryChatHistoryStore {
    exchanges: Mutex<Vec<ChatExchange>>,
}

impl InMemoryChatHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChatHistoryStore for InMemoryChatHistoryStore {
    async fn add(&self, exchange: &ChatExchange) -> Result<(), AppError> {
        self.exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(exchange.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ChatExchange>, AppError> {
        let mut found: Vec<_> = self
            .exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }

    async fn clear_for_user(&self, user_id: &str) -> Result<u64, AppError> {
        let mut exchanges = self.exchanges.lock().unwrap_or_else(PoisonError::into_inner);
        let before = exchanges.len();
        exchanges.retain(|e| e.user_id != user_id);
        Ok((before - exchanges.len()) as u64)
    }
}

// ============ Recorder ============

/// Fire-and-forget writer in front of a [`ChatHistoryStore`].
#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn ChatHistoryStore>,
    breaker: StoreCircuitBreaker,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn ChatHistoryStore>) -> Self {
        Self {
            store,
            breaker: create_store_circuit_breaker(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ChatHistoryStore> {
        &self.store
    }

    /// Persist `exchange` in the background.
    ///
    /// The returned handle only exists so tests can wait for the write;
    /// callers are free to drop it.
    pub fn record(&self, exchange: ChatExchange) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let breaker = self.breaker.clone();

        tokio::spawn(async move {
            let id = exchange.id;
            match breaker.call(async { store.add(&exchange).await }).await {
                Ok(()) => tracing::debug!("Stored chat exchange {}", id),
                Err(failsafe::Error::Rejected) => {
                    tracing::warn!("History store circuit open, dropped chat exchange {}", id)
                }
                Err(failsafe::Error::Inner(e)) => {
                    tracing::error!("Failed to persist chat exchange {}: {}", id, e)
                }
            }
        })
    }
}
