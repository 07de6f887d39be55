//! Delivery transports — where notifications actually go.
//!
//! The coordinator treats a transport as a black box: success, or failure
//! with a human-readable reason that ends up in the delivery log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use pledger_core::config::{EmailConfig, WebhookConfig};
use pledger_core::error::{PledgerError, Result};

use crate::kinds::NotificationKind;

/// Rendered notification content.
#[derive(Debug, Clone)]
pub struct Payload {
    pub subject: String,
    pub body: String,
}

impl Payload {
    /// Default copy per kind. Richer rendering (promise summaries, team
    /// rollups) is composed upstream and passed through unchanged.
    pub fn for_kind(kind: NotificationKind, period_key: &str) -> Self {
        let (subject, body) = match kind {
            NotificationKind::DailyBrief => (
                "Your daily brief".to_string(),
                "Here's where your promises stand today.".to_string(),
            ),
            NotificationKind::WeeklyReminder => (
                "Weekly promise check-in".to_string(),
                "A few promises could use your attention this week.".to_string(),
            ),
            NotificationKind::LeaderDailyRadar => (
                "Team radar".to_string(),
                "Today's snapshot of your team's commitments.".to_string(),
            ),
            NotificationKind::LeaderWeeklyReport => (
                "Weekly team report".to_string(),
                "How your team's promises moved this week.".to_string(),
            ),
            NotificationKind::PromiseCreated => (
                "New promise created".to_string(),
                "A promise involving you was just created.".to_string(),
            ),
            NotificationKind::PromiseClosed => (
                "Promise closed".to_string(),
                "A promise involving you was closed.".to_string(),
            ),
            NotificationKind::PromiseMissed => (
                "Promise missed".to_string(),
                format!("A promise passed its due date without completion (ref {period_key})."),
            ),
            NotificationKind::ReviewNeeded => (
                "Review needed".to_string(),
                "A completed promise is waiting for your verification.".to_string(),
            ),
            NotificationKind::PromiseVerified => (
                "Promise verified".to_string(),
                "Your completed promise was verified.".to_string(),
            ),
            NotificationKind::CompletionRejected => (
                "Completion rejected".to_string(),
                "A completion you submitted was rejected — take another look.".to_string(),
            ),
        };
        Self { subject, body }
    }
}

/// Black-box delivery transport.
/// Send errors carry only a reason string for the delivery log.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn send(
        &self,
        address: &str,
        kind: NotificationKind,
        payload: &Payload,
    ) -> std::result::Result<(), String>;
}

/// Log-only transport — records sends via tracing, never leaves the
/// process. Default in development.
pub struct LogTransport;

#[async_trait]
impl DeliveryTransport for LogTransport {
    async fn send(
        &self,
        address: &str,
        kind: NotificationKind,
        payload: &Payload,
    ) -> std::result::Result<(), String> {
        tracing::info!("📢 [{kind}] to {address}: {}", payload.subject);
        Ok(())
    }
}

/// Async SMTP transport.
pub struct EmailTransport {
    config: EmailConfig,
}

impl EmailTransport {
    pub fn new(config: EmailConfig) -> Result<Self> {
        if config.username.is_empty() {
            return Err(PledgerError::Transport(
                "Email transport selected but no SMTP username configured".into(),
            ));
        }
        Ok(Self { config })
    }
}

#[async_trait]
impl DeliveryTransport for EmailTransport {
    async fn send(
        &self,
        address: &str,
        kind: NotificationKind,
        payload: &Payload,
    ) -> std::result::Result<(), String> {
        use lettre::{
            AsyncSmtpTransport, AsyncTransport, Message, message::Mailbox,
            message::header::ContentType, transport::smtp::authentication::Credentials,
        };

        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.username)
            .parse()
            .map_err(|e| format!("Invalid from: {e}"))?;
        let to: Mailbox = address.parse().map_err(|e| format!("Invalid to: {e}"))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(&payload.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(payload.body.clone())
            .map_err(|e| format!("Build email: {e}"))?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer =
            AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(|e| format!("SMTP relay: {e}"))?
                .port(self.config.smtp_port)
                .credentials(creds)
                .build();

        mailer
            .send(email)
            .await
            .map_err(|e| format!("SMTP send: {e}"))?;

        tracing::info!("📤 [{kind}] email sent to {address}");
        Ok(())
    }
}

/// Generic HTTP webhook transport — POST with a JSON body.
pub struct WebhookTransport {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(PledgerError::Transport(
                "Webhook transport selected but no URL configured".into(),
            ));
        }
        Ok(Self {
            config,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl DeliveryTransport for WebhookTransport {
    async fn send(
        &self,
        address: &str,
        kind: NotificationKind,
        payload: &Payload,
    ) -> std::result::Result<(), String> {
        let timestamp: DateTime<Utc> = Utc::now();
        let mut req = self
            .client
            .post(&self.config.url)
            .json(&serde_json::json!({
                "address": address,
                "kind": kind.as_str(),
                "subject": payload.subject,
                "body": payload.body,
                "timestamp": timestamp.to_rfc3339(),
            }))
            .timeout(std::time::Duration::from_secs(10));

        for (key, value) in &self.config.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req.send().await.map_err(|e| format!("Webhook send: {e}"))?;
        if resp.status().is_success() {
            tracing::info!("✅ [{kind}] webhook delivered for {address}");
            Ok(())
        } else {
            Err(format!("Webhook error {}", resp.status()))
        }
    }
}
