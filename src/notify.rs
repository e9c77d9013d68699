//! Health transition notifications.
//!
//! A [`Notifier`] receives every notable [`HealthTransition`]: a backend
//! becoming unhealthy or recovering. [`WebhookNotifier`] posts them to an
//! incoming-webhook URL such as a Slack app or a Zapier catch hook.

use crate::config::NotificationConfig;
use crate::error::{Error, Result};
use crate::server::{HealthStatus, HealthTransition};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

/// Receiver of health transitions
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one transition
    async fn notify(&self, transition: &HealthTransition) -> Result<()>;
}

/// POSTs transitions as JSON to a webhook
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::new(
            config.webhook_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[tracing::instrument(skip(self, transition), fields(server_name = %transition.server_name))]
    async fn notify(&self, transition: &HealthTransition) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&transition_payload(transition))
            .send()
            .await
            .map_err(|e| Error::Notification(format!("webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Notification(format!(
                "webhook returned HTTP {}",
                status.as_u16()
            )));
        }

        tracing::debug!("Health notification delivered");
        Ok(())
    }
}

/// Webhook body. `text` is what chat integrations display.
pub fn transition_payload(transition: &HealthTransition) -> Value {
    let text = match (transition.to, &transition.detail) {
        (HealthStatus::Unhealthy, Some(detail)) => format!(
            "[mcp-supervisor] {} is unhealthy (was {}): {}",
            transition.server_name, transition.from, detail
        ),
        (HealthStatus::Healthy, _) if transition.from == HealthStatus::Unhealthy => {
            format!("[mcp-supervisor] {} recovered", transition.server_name)
        }
        (to, _) => format!(
            "[mcp-supervisor] {} is {} (was {})",
            transition.server_name, to, transition.from
        ),
    };

    json!({
        "text": text,
        "server": transition.server_name,
        "from": transition.from,
        "to": transition.to,
        "detail": transition.detail,
        "timestamp": transition.at.to_rfc3339(),
    })
}
