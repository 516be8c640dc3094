//! Webhook notification channel
//!
//! Posts booking confirmations as JSON to an HTTP endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::notifications::BookingNotice;

/// Webhook channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL endpoint
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            headers: std::collections::HashMap::new(),
            timeout_secs: default_timeout(),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let url = url::Url::parse(&self.url).map_err(|e| format!("Invalid webhook URL: {e}"))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err("Webhook URL must use http or https".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Webhook notification channel
///
/// # Payload Format
///
/// ```json
/// {
///   "event": "booking.confirmed",
///   "booking": { "id": "…", "crew_id": "alpha", "start": "2024-01-16T09:15:00", … },
///   "crew": { "name": "Alpha Crew", "email": "alpha@example.com", "phone": null },
///   "ics": "BEGIN:VCALENDAR\r\n…"
/// }
/// ```
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("crewbook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChannelError::InvalidConfig(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create a webhook channel with just a URL
    pub fn from_url(url: impl Into<String>) -> ChannelResult<Self> {
        Self::new(WebhookConfig::new(url))
    }

    fn build_payload(&self, notice: &BookingNotice) -> serde_json::Value {
        serde_json::json!({
            "event": "booking.confirmed",
            "booking": notice.booking,
            "crew": notice.crew,
            "ics": notice.calendar_invite(),
        })
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notice: &BookingNotice) -> ChannelResult<DeliveryStatus> {
        let mut request = self.client.post(&self.config.url);

        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.json(&self.build_payload(notice)).send().await?;
        let status = response.status();

        if status.is_success() {
            tracing::debug!(
                booking_id = %notice.booking.id,
                url = %self.config.url,
                status = status.as_u16(),
                "Webhook delivered"
            );
            return Ok(DeliveryStatus::success(self.name()));
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());
        Err(ChannelError::Rejected {
            status: status.as_u16(),
            body: crate::utils::truncate_text(&body, 200),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(WebhookConfig::new("https://hooks.example.com/bookings").validate().is_ok());
        assert!(WebhookConfig::new("").validate().is_err());
        assert!(WebhookConfig::new("ftp://example.com").validate().is_err());
        assert!(WebhookConfig::new("https://example.com")
            .with_timeout(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_invalid_url_rejected_at_construction() {
        let result = WebhookChannel::from_url("not a url");
        assert!(matches!(result, Err(ChannelError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_methods() {
        let config = WebhookConfig::new("https://example.com/hook")
            .with_auth_token("secret")
            .with_header("X-Crewbook-Source", "scheduler")
            .with_timeout(3);

        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.headers.len(), 1);
        assert_eq!(config.timeout_secs, 3);
    }
}
