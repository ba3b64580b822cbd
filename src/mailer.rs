//! Outbound mail transports.

use crate::config::{Config, MailProvider};
use crate::errors::AppError;
use crate::retry::Transient;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde_json::json;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// A fully addressed HTML email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub bcc: Option<String>,
    pub reply_to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Network, timeout, throttling or server-side failure.
    Transport(String),
    /// The provider refused the message outright.
    Rejected(String),
    InvalidAddress(String),
    Build(String),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Transport(msg) => write!(f, "Transport error: {}", msg),
            DeliveryError::Rejected(msg) => write!(f, "Message rejected: {}", msg),
            DeliveryError::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),
            DeliveryError::Build(msg) => write!(f, "Failed to build email: {}", msg),
        }
    }
}

impl std::error::Error for DeliveryError {}

impl Transient for DeliveryError {
    fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transport(_))
    }
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        AppError::DeliveryFailed(err.to_string())
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError>;

    fn name(&self) -> &str;
}

// ============ SMTP ============

/// Pooled STARTTLS SMTP transport with a send-rate ceiling.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl SmtpMailer {
    /// # Arguments
    ///
    /// * `host` / `port` - SMTP relay (STARTTLS).
    /// * `username` / `password` - Relay credentials.
    /// * `sends_per_minute` - Upper bound on outgoing messages.
    pub fn new(
        host: &str,
        port: u16,
        username: String,
        password: String,
        sends_per_minute: NonZeroU32,
    ) -> Result<Self, DeliveryError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?
            .port(port)
            .credentials(Credentials::new(username, password))
            .timeout(Some(Duration::from_secs(15)))
            .pool_config(
                PoolConfig::new()
                    .max_size(4)
                    .idle_timeout(Duration::from_secs(60)),
            )
            .build();

        tracing::info!("Created SMTP transport for {}:{}", host, port);

        Ok(Self {
            transport,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(sends_per_minute))),
        })
    }

    fn build_message(message: &EmailMessage) -> Result<Message, DeliveryError> {
        let mut builder = Message::builder()
            .from(parse_mailbox("From", &message.from)?)
            .reply_to(parse_mailbox("Reply-To", &message.reply_to)?)
            .to(parse_mailbox("To", &message.to)?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML);

        if let Some(bcc) = &message.bcc {
            builder = builder.bcc(parse_mailbox("Bcc", bcc)?);
        }

        builder
            .body(message.html.clone())
            .map_err(|e| DeliveryError::Build(e.to_string()))
    }
}

fn parse_mailbox(field: &str, value: &str) -> Result<Mailbox, DeliveryError> {
    value
        .parse()
        .map_err(|e| DeliveryError::InvalidAddress(format!("{} '{}': {}", field, value, e)))
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        let email = Self::build_message(message)?;

        self.limiter.until_ready().await;

        self.transport.send(email).await.map_err(|e| {
            if e.is_permanent() {
                DeliveryError::Rejected(e.to_string())
            } else {
                DeliveryError::Transport(e.to_string())
            }
        })?;

        tracing::info!("Email sent via SMTP to {}", message.to);
        Ok(())
    }

    fn name(&self) -> &str {
        "smtp"
    }
}

// ============ HTTP API ============

/// Transactional mail API speaking the Resend JSON format.
#[derive(Clone)]
pub struct HttpApiMailer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpApiMailer {
    pub fn new(api_key: String) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| DeliveryError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: "https://api.resend.com".to_string(),
            api_key,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl MailTransport for HttpApiMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        let url = format!("{}/emails", self.base_url);

        let mut body = json!({
            "from": message.from,
            "to": [message.to],
            "reply_to": message.reply_to,
            "subject": message.subject,
            "html": message.html,
        });
        if let Some(bcc) = &message.bcc {
            body["bcc"] = json!([bcc]);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(format!("Mail API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let detail = format!("Mail API returned {}: {}", status, error_text);
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                DeliveryError::Transport(detail)
            } else {
                DeliveryError::Rejected(detail)
            });
        }

        tracing::info!("Email sent via mail API to {}", message.to);
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============ No-op ============

/// Logs instead of sending. Used when no mail API key is configured.
pub struct LoggingMailer;

#[async_trait]
impl MailTransport for LoggingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        tracing::warn!(
            "Mail delivery disabled, dropping email to {} ({})",
            message.to,
            message.subject
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Build the single transport selected by configuration.
pub fn build_mail_transport(config: &Config) -> Result<Arc<dyn MailTransport>, AppError> {
    let transport: Arc<dyn MailTransport> = match config.mail_provider {
        MailProvider::Smtp => {
            let (Some(user), Some(password)) =
                (config.email_user.clone(), config.email_app_password.clone())
            else {
                return Err(AppError::InternalError(
                    "SMTP transport requires EMAIL_USER and EMAIL_APP_PASSWORD".to_string(),
                ));
            };
            let ceiling = NonZeroU32::new(30).unwrap_or(NonZeroU32::MIN);
            Arc::new(
                SmtpMailer::new(&config.smtp_host, config.smtp_port, user, password, ceiling)
                    .map_err(AppError::from)?,
            )
        }
        MailProvider::Http => match config.resend_api_key.clone() {
            Some(api_key) => Arc::new(HttpApiMailer::new(api_key).map_err(AppError::from)?),
            None => {
                tracing::warn!("MAIL_PROVIDER=http without RESEND_API_KEY, emails will only be logged");
                Arc::new(LoggingMailer)
            }
        },
    };
    tracing::info!("Mail transport initialized: {}", transport.name());
    Ok(transport)
}
