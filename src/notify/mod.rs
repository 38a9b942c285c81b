//! Notification transport.
//!
//! The engine hands finished notifications to a `Notifier`; how they reach a device is
//! the transport's business. Delivery is fire-and-forget from the engine's side.

pub mod transport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::PlayerId;

pub use transport::{build_notifier, LogNotifier, NotifierConfig, WebhookNotifier};

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Recipient rejected: {0}")]
    Rejected(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),
}

/// A message for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient: PlayerId,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(recipient: PlayerId, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient,
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Trait for notification transports.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &'static str;

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Records sent notifications and fails for chosen recipients.
#[cfg(test)]
#[derive(Default)]
pub struct MockNotifier {
    sent: std::sync::Mutex<Vec<Notification>>,
    failing: std::collections::HashSet<PlayerId>,
}

#[cfg(test)]
impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(recipients: &[&str]) -> Self {
        Self {
            sent: Default::default(),
            failing: recipients.iter().map(|r| PlayerId::from(*r)).collect(),
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.failing.contains(&notification.recipient) {
            return Err(NotifyError::Rejected(notification.recipient.to_string()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
