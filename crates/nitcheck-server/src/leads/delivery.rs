//! Lead email delivery channels.
//!
//! One channel is active per deployment, chosen by `leads.provider`:
//! Resend and Postmark over their HTTP APIs, plain SMTP, or a no-op channel
//! that marks submissions as queued.

use async_trait::async_trait;
use serde_json::json;

use nitcheck_core::lead::DeliveryStatus;

use crate::config::{LeadProvider, LeadsConfig, PostmarkConfig, ResendConfig, SmtpConfig};
use crate::error::ApiError;

/// A fully addressed outbound message.
pub struct OutboundEmail<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub text: &'a str,
}

/// Where one delivery attempt ended up.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub status: DeliveryStatus,
    pub provider: &'static str,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn sent(provider: &'static str, message_id: Option<String>) -> Self {
        Self {
            status: DeliveryStatus::Sent,
            provider,
            message_id,
            error: None,
        }
    }

    pub fn queued(provider: &'static str) -> Self {
        Self {
            status: DeliveryStatus::Queued,
            provider,
            message_id: None,
            error: None,
        }
    }

    pub fn failed(provider: &'static str, error: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Failed,
            provider,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Heuristic split of delivery failures: configuration-shaped errors will
/// not fix themselves on retry, everything else is worth retrying.
pub fn classify_delivery_error(detail: Option<&str>) -> ApiError {
    let Some(detail) = detail else {
        return ApiError::DeliveryTransient;
    };
    let lower = detail.to_ascii_lowercase();
    if ["invalid", "missing", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        ApiError::DeliveryPermanent
    } else {
        ApiError::DeliveryTransient
    }
}

/// Trait for lead delivery channels.
#[async_trait]
pub trait LeadChannel: Send + Sync {
    /// Channel name for logging and reports.
    fn name(&self) -> &'static str;

    /// True for the no-op channel that only queues.
    fn is_noop(&self) -> bool {
        false
    }

    /// Deliver one email. Failures are folded into the report rather than
    /// returned as errors so callers always get a status to log.
    async fn send(&self, email: &OutboundEmail<'_>) -> DeliveryReport;
}

/// Build the configured channel.
pub fn channel_from_config(config: &LeadsConfig) -> Box<dyn LeadChannel> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .build()
        .expect("Failed to create HTTP client");

    match config.provider {
        LeadProvider::Resend => Box::new(ResendChannel {
            client,
            config: config.resend.clone(),
        }),
        LeadProvider::Postmark => Box::new(PostmarkChannel {
            client,
            config: config.postmark.clone(),
        }),
        LeadProvider::Smtp => Box::new(SmtpChannel {
            config: config.smtp.clone(),
        }),
        LeadProvider::None => Box::new(NullChannel),
    }
}

fn truncate_error(mut detail: String) -> String {
    detail.truncate(200);
    detail
}

// =============================================================================
// Resend
// =============================================================================

pub struct ResendChannel {
    client: reqwest::Client,
    config: ResendConfig,
}

#[async_trait]
impl LeadChannel for ResendChannel {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn send(&self, email: &OutboundEmail<'_>) -> DeliveryReport {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return DeliveryReport::failed(self.name(), "Missing Resend API key");
        };

        let url = format!("{}/emails", self.config.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&json!({
                "from": email.from,
                "to": [email.to],
                "subject": email.subject,
                "text": email.text,
            }))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let message_id = resp
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(String::from));
                DeliveryReport::sent(self.name(), message_id)
            }
            Ok(resp) => {
                let detail = resp.text().await.unwrap_or_default();
                DeliveryReport::failed(self.name(), truncate_error(detail))
            }
            Err(e) => DeliveryReport::failed(self.name(), e.to_string()),
        }
    }
}

// =============================================================================
// Postmark
// =============================================================================

pub struct PostmarkChannel {
    client: reqwest::Client,
    config: PostmarkConfig,
}

#[async_trait]
impl LeadChannel for PostmarkChannel {
    fn name(&self) -> &'static str {
        "postmark"
    }

    async fn send(&self, email: &OutboundEmail<'_>) -> DeliveryReport {
        let Some(token) = self.config.server_token.as_deref() else {
            return DeliveryReport::failed(self.name(), "Missing Postmark server token");
        };

        let url = format!("{}/email", self.config.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .header("X-Postmark-Server-Token", token)
            .json(&json!({
                "From": email.from,
                "To": email.to,
                "Subject": email.subject,
                "TextBody": email.text,
                "MessageStream": "outbound",
            }))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let message_id = resp.json::<serde_json::Value>().await.ok().and_then(|v| {
                    v.get("MessageID").and_then(|id| id.as_str()).map(String::from)
                });
                DeliveryReport::sent(self.name(), message_id)
            }
            Ok(resp) => {
                let detail = resp.text().await.unwrap_or_default();
                DeliveryReport::failed(self.name(), truncate_error(detail))
            }
            Err(e) => DeliveryReport::failed(self.name(), e.to_string()),
        }
    }
}

// =============================================================================
// SMTP
// =============================================================================

pub struct SmtpChannel {
    config: SmtpConfig,
}

#[async_trait]
impl LeadChannel for SmtpChannel {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, email: &OutboundEmail<'_>) -> DeliveryReport {
        use lettre::{
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
            message::header::ContentType, transport::smtp::authentication::Credentials,
        };

        let Some(host) = self.config.host.as_deref() else {
            return DeliveryReport::failed(self.name(), "Missing SMTP host");
        };

        let from = match email.from.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => return DeliveryReport::failed(self.name(), format!("Invalid from email: {e}")),
        };
        let to = match email.to.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => return DeliveryReport::failed(self.name(), format!("Invalid to email: {e}")),
        };

        let message = match Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.text.to_string())
        {
            Ok(message) => message,
            Err(e) => return DeliveryReport::failed(self.name(), e.to_string()),
        };

        let mut mailer_builder = match AsyncSmtpTransport::<Tokio1Executor>::relay(host) {
            Ok(builder) => builder,
            Err(e) => return DeliveryReport::failed(self.name(), e.to_string()),
        };
        mailer_builder = mailer_builder.port(self.config.port);

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            mailer_builder =
                mailer_builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        match mailer_builder.build().send(message).await {
            Ok(_) => DeliveryReport::sent(self.name(), None),
            Err(e) => DeliveryReport::failed(self.name(), format!("SMTP error: {e}")),
        }
    }
}

// =============================================================================
// No-op
// =============================================================================

/// No delivery provider configured: submissions are acknowledged as queued
/// and live only in the logs.
pub struct NullChannel;

#[async_trait]
impl LeadChannel for NullChannel {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_noop(&self) -> bool {
        true
    }

    async fn send(&self, _email: &OutboundEmail<'_>) -> DeliveryReport {
        DeliveryReport::queued(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_flags_configuration_errors_as_permanent() {
        assert!(matches!(
            classify_delivery_error(Some("401 Unauthorized")),
            ApiError::DeliveryPermanent
        ));
        assert!(matches!(
            classify_delivery_error(Some("invalid from address")),
            ApiError::DeliveryPermanent
        ));
        assert!(matches!(
            classify_delivery_error(Some("Missing RESEND_API_KEY")),
            ApiError::DeliveryPermanent
        ));
    }

    #[test]
    fn classifier_defaults_to_transient() {
        assert!(matches!(
            classify_delivery_error(Some("connection reset by peer")),
            ApiError::DeliveryTransient
        ));
        assert!(matches!(
            classify_delivery_error(None),
            ApiError::DeliveryTransient
        ));
    }

    #[tokio::test]
    async fn null_channel_queues() {
        let report = NullChannel
            .send(&OutboundEmail {
                from: "leads@nitnot.com",
                to: "clinic@example.com",
                subject: "s",
                text: "t",
            })
            .await;
        assert_eq!(report.status, DeliveryStatus::Queued);
        assert_eq!(report.provider, "none");
    }
}
