//! Notification channels for delivering booking confirmations
//!
//! A channel is one delivery target: a webhook, the log, and so on. The
//! dispatcher owns retry; a channel makes a single attempt per `send`.

pub mod log;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::notifications::BookingNotice;

pub use self::log::LogChannel;
pub use webhook::{WebhookChannel, WebhookConfig};

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur during channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Receiver answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Invalid channel configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Channel temporarily unavailable
    #[error("Channel temporarily unavailable: {0}")]
    Unavailable(String),
}

impl ChannelError {
    /// Whether another attempt could succeed
    ///
    /// Client errors other than 408/429 mean the payload itself was refused.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(_) | Self::Unavailable(_) => true,
            Self::Rejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            Self::InvalidConfig(_) => false,
        }
    }
}

/// Response from sending a notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatus {
    /// Whether the notification was successfully delivered
    pub success: bool,
    /// Channel that delivered (or failed to deliver) the notification
    pub channel: String,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Optional message about the delivery
    pub message: Option<String>,
    /// Timestamp of the last attempt
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl DeliveryStatus {
    pub fn success(channel: impl Into<String>) -> Self {
        Self {
            success: true,
            channel: channel.into(),
            attempts: 1,
            message: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn failure(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            channel: channel.into(),
            attempts: 1,
            message: Some(message.into()),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "SUCCESS" } else { "FAILED" };
        write!(f, "[{status}] {} after {} attempt(s)", self.channel, self.attempts)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// Trait for notification channels
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name
    fn name(&self) -> &str;

    /// Make one delivery attempt
    async fn send(&self, notice: &BookingNotice) -> ChannelResult<DeliveryStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_status_display() {
        let ok = DeliveryStatus::success("webhook");
        assert_eq!(ok.to_string(), "[SUCCESS] webhook after 1 attempt(s)");

        let failed = DeliveryStatus::failure("webhook", "HTTP 500: boom").with_attempts(3);
        assert!(!failed.success);
        assert_eq!(
            failed.to_string(),
            "[FAILED] webhook after 3 attempt(s): HTTP 500: boom"
        );
    }

    #[test]
    fn test_retryable_classification() {
        let server = ChannelError::Rejected {
            status: 503,
            body: String::new(),
        };
        let throttled = ChannelError::Rejected {
            status: 429,
            body: String::new(),
        };
        let refused = ChannelError::Rejected {
            status: 400,
            body: "bad payload".to_string(),
        };

        assert!(server.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!refused.is_retryable());
        assert!(!ChannelError::InvalidConfig("x".into()).is_retryable());
        assert!(ChannelError::Unavailable("queue".into()).is_retryable());
    }
}
