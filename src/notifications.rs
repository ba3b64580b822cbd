//! Lead notification emails to dealers.

use crate::errors::AppError;
use crate::mailer::{DeliveryError, EmailMessage, MailTransport};
use crate::models::SendEmailPayload;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::validation::{is_valid_email, non_blank};
use askama::Template;
use std::sync::Arc;
use std::time::Duration;

/// A validated lead, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadEmailRequest {
    pub dealer_email: String,
    pub car_name: String,
    pub sender_name: String,
    pub sender_email: String,
    pub sender_phone: Option<String>,
    pub message: String,
}

impl TryFrom<SendEmailPayload> for LeadEmailRequest {
    type Error = AppError;

    fn try_from(payload: SendEmailPayload) -> Result<Self, Self::Error> {
        let (Some(dealer_email), Some(car_name), Some(sender_name), Some(sender_email), Some(message)) = (
            non_blank(payload.dealer_email),
            non_blank(payload.car_name),
            non_blank(payload.sender_name),
            non_blank(payload.sender_email),
            non_blank(payload.message),
        ) else {
            return Err(AppError::BadRequest(
                "Missing required fields: dealerEmail, carName, senderName, senderEmail, message"
                    .to_string(),
            ));
        };

        if !is_valid_email(&sender_email) {
            return Err(AppError::BadRequest("Invalid sender email format".to_string()));
        }
        if !is_valid_email(&dealer_email) {
            return Err(AppError::BadRequest("Invalid dealer email format".to_string()));
        }

        Ok(Self {
            dealer_email,
            car_name,
            sender_name,
            sender_email,
            sender_phone: non_blank(payload.sender_phone),
            message,
        })
    }
}

#[derive(Template)]
#[template(path = "lead_email.html")]
struct LeadEmailTemplate<'a> {
    car_name: &'a str,
    dealer_email: &'a str,
    sender_name: &'a str,
    sender_email: &'a str,
    sender_phone: Option<&'a str>,
    message: &'a str,
}

/// Addressing rules for lead emails.
#[derive(Debug, Clone, Default)]
pub struct NotificationSettings {
    /// Bare sender address; shown as `"CarGenie" <address>`.
    pub mail_from: String,
    /// When set, every lead goes here instead of the dealer.
    pub test_recipient: Option<String>,
    /// Optional blind copy of every lead.
    pub lead_copy: Option<String>,
}

/// Render the HTML email for `request`. All fields are HTML-escaped.
pub fn build_lead_email(
    request: &LeadEmailRequest,
    settings: &NotificationSettings,
) -> Result<EmailMessage, DeliveryError> {
    let html = LeadEmailTemplate {
        car_name: &request.car_name,
        dealer_email: &request.dealer_email,
        sender_name: &request.sender_name,
        sender_email: &request.sender_email,
        sender_phone: request.sender_phone.as_deref(),
        message: &request.message,
    }
    .render()
    .map_err(|e| DeliveryError::Build(e.to_string()))?;

    Ok(EmailMessage {
        from: format!("\"CarGenie\" <{}>", settings.mail_from),
        to: settings
            .test_recipient
            .clone()
            .unwrap_or_else(|| request.dealer_email.clone()),
        bcc: settings.lead_copy.clone(),
        reply_to: request.sender_email.clone(),
        subject: format!(
            "New Lead: {} interested in {}",
            request.sender_name, request.car_name
        ),
        html,
    })
}

/// Delivers lead emails through the active transport with bounded retry.
#[derive(Clone)]
pub struct NotificationService {
    transport: Arc<dyn MailTransport>,
    settings: NotificationSettings,
    policy: RetryPolicy,
}

impl NotificationService {
    /// Three attempts with a 1s, 2s linear backoff.
    pub fn new(transport: Arc<dyn MailTransport>, settings: NotificationSettings) -> Self {
        Self::with_policy(
            transport,
            settings,
            RetryPolicy::linear(3, Duration::from_secs(1)),
        )
    }

    pub fn with_policy(
        transport: Arc<dyn MailTransport>,
        settings: NotificationSettings,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            settings,
            policy,
        }
    }

    /// Send the lead email to the dealer.
    ///
    /// Transient transport failures are retried; anything else, or the last
    /// error after all attempts, becomes `AppError::DeliveryFailed`.
    pub async fn send_dealer_email(&self, request: &LeadEmailRequest) -> Result<(), AppError> {
        let message = build_lead_email(request, &self.settings)?;
        let transport = &self.transport;
        let email = &message;

        retry_with_backoff(self.policy, |attempt| async move {
            tracing::debug!(
                "Sending lead email via {} (attempt {})",
                transport.name(),
                attempt
            );
            transport.send(email).await
        })
        .await?;

        tracing::info!(
            "Lead email for {} delivered to {}",
            request.car_name,
            message.to
        );
        Ok(())
    }
}
