//! Notification transports.
//!
//! - Log: writes notifications to the tracing output (default)
//! - Webhook: POSTs each notification as JSON to a push gateway

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Notification, Notifier, NotifyError};

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend")]
pub enum NotifierConfig {
    /// Log notifications instead of delivering them
    #[serde(rename = "log")]
    Log,

    /// HTTP push gateway
    #[serde(rename = "webhook")]
    Webhook {
        url: String,
        #[serde(default = "default_timeout")]
        timeout_seconds: u64,
    },
}

fn default_timeout() -> u64 {
    10
}

impl Default for NotifierConfig {
    fn default() -> Self {
        NotifierConfig::Log
    }
}

/// Build the configured transport.
pub fn build_notifier(config: &NotifierConfig) -> Arc<dyn Notifier> {
    match config {
        NotifierConfig::Log => Arc::new(LogNotifier),
        NotifierConfig::Webhook {
            url,
            timeout_seconds,
        } => Arc::new(WebhookNotifier::new(url.clone(), *timeout_seconds)),
    }
}

/// Transport that only logs.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            "Notification for {}: {} - {}",
            notification.recipient, notification.title, notification.body
        );
        Ok(())
    }
}

/// Transport posting JSON to a push gateway.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    timeout_seconds: u64,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .unwrap_or_default();

        Self {
            client,
            url,
            timeout_seconds,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        debug!(
            "Posting notification for {} to {}",
            notification.recipient, self.url
        );

        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout(self.timeout_seconds)
                } else {
                    NotifyError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            return Err(NotifyError::Unavailable(format!(
                "gateway returned {}",
                status
            )));
        }

        Ok(())
    }
}
