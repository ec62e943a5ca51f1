//! Notification channel.
//!
//! One terminal message per deployment run, published to a webhook.
//! Delivery is best-effort: the orchestrator logs a failed publish
//! and moves on; it never fails a run over it.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("publish request failed: {0}")]
    Request(String),

    #[error("notification endpoint returned {0}")]
    Status(u16),
}

/// A terminal-outcome publisher.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), NotifyError>;
}

/// Publishes JSON `{subject, message}` to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "subject": subject,
            "message": message,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        if response.status().is_success() {
            debug!(subject, "notification published");
            Ok(())
        } else {
            Err(NotifyError::Status(response.status().as_u16()))
        }
    }
}

/// Stand-in when no channel is configured.
#[derive(Debug, Clone, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn publish(&self, subject: &str, _message: &str) -> Result<(), NotifyError> {
        debug!(subject, "no notification channel configured, dropping message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_notifier_accepts_everything() {
        let notifier = NullNotifier;
        notifier.publish("deploy ok", "active slot is b").await.unwrap();
    }

    #[tokio::test]
    async fn webhook_failure_is_reported_not_swallowed() {
        // Nothing listens here; the notifier must surface the error
        // so the caller can decide to swallow it.
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/hook");
        let result = notifier.publish("deploy failed", "reason").await;
        assert!(matches!(result, Err(NotifyError::Request(_))));
    }
}
