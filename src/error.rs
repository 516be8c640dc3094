//! Unified error handling for the crewbook crate
//!
//! Domain modules keep their own error types; this module consolidates them
//! into a single `Error` enum for code that crosses module boundaries. The
//! CLI commands return [`Result`], and `main` reports failures by
//! [`CrewbookErrorTrait::code`] and [`CrewbookErrorTrait::category`].
//!
//! # Architecture
//!
//! - [`CrewbookErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use crewbook::error::{CrewbookErrorTrait, Error};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Try again: {} ({})", err, err.code());
//!     } else {
//!         eprintln!("Fatal error: {}", err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::api::ServerError;
pub use crate::config::ConfigError;
pub use crate::notifications::ChannelError;
pub use crate::scheduler::BookingError;

/// Common trait for all crewbook error types
pub trait CrewbookErrorTrait: std::error::Error {
    /// Check if this error is recoverable (the caller may retry)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;

    /// Stable machine-readable code, used in API responses
    fn code(&self) -> &'static str;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or out-of-range input
    Validation,
    /// No slot, slot taken, unknown crew
    Scheduling,
    /// Database and I/O errors
    Storage,
    /// Notification delivery errors
    Notification,
    /// Configuration errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Scheduling => "scheduling",
            Self::Storage => "storage",
            Self::Notification => "notification",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl CrewbookErrorTrait for BookingError {
    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoAvailability | Self::SlotConflict { .. } | Self::ServiceUnavailable(_)
        )
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::NoAvailability | Self::SlotConflict { .. } | Self::NotFound { .. } => {
                ErrorCategory::Scheduling
            }
            Self::ServiceUnavailable(_) => ErrorCategory::Storage,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::NoAvailability => "NoAvailability",
            Self::SlotConflict { .. } => "SlotConflict",
            Self::ServiceUnavailable(_) => "ServiceUnavailable",
            Self::NotFound { .. } => "NotFound",
        }
    }
}

/// Unified error type for the crewbook crate
#[derive(Error, Debug)]
pub enum Error {
    /// Propose/confirm failures
    #[error(transparent)]
    Booking(#[from] BookingError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Notification channel errors
    #[error("Notification error: {0}")]
    Notification(#[from] ChannelError),

    /// HTTP server startup and serving errors
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CrewbookErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Booking(e) => e.is_recoverable(),
            Self::Notification(e) => e.is_retryable(),
            Self::Server(e) => matches!(e, ServerError::Bind(_)),
            Self::Config(_) => false,
            Self::Database(_) => false,
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Booking(e) => e.category(),
            Self::Config(_) => ErrorCategory::Config,
            Self::Notification(_) => ErrorCategory::Notification,
            Self::Server(ServerError::Config(_)) => ErrorCategory::Config,
            Self::Server(_) => ErrorCategory::Other,
            Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Validation,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Booking(e) => e.code(),
            Self::Config(_) => "ConfigError",
            Self::Notification(_) => "NotificationError",
            Self::Server(_) => "ServerError",
            Self::Database(_) | Self::Io(_) => "ServiceUnavailable",
            Self::Json(_) => "ValidationError",
            Self::Other { .. } => "InternalError",
        }
    }
}

impl Error {
    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_error_codes() {
        assert_eq!(
            BookingError::validation("email", "bad").code(),
            "ValidationError"
        );
        assert_eq!(BookingError::NoAvailability.code(), "NoAvailability");
        assert_eq!(BookingError::conflict(None).code(), "SlotConflict");
        assert_eq!(BookingError::unavailable("db").code(), "ServiceUnavailable");
        assert_eq!(BookingError::not_found("x").code(), "NotFound");
    }

    #[test]
    fn test_error_category() {
        let err: Error = BookingError::validation("name", "empty").into();
        assert_eq!(err.category(), ErrorCategory::Validation);

        let err: Error = BookingError::NoAvailability.into();
        assert_eq!(err.category(), ErrorCategory::Scheduling);

        let err: Error = ConfigError::MissingField("crews").into();
        assert_eq!(err.category(), ErrorCategory::Config);
        assert_eq!(err.category().as_str(), "config");
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::from(BookingError::conflict(None)).is_recoverable());
        assert!(!Error::from(BookingError::validation("phone", "too short")).is_recoverable());
        assert!(Error::from(ChannelError::Unavailable("queue".into())).is_recoverable());
        assert!(!Error::from(ChannelError::InvalidConfig("url".into())).is_recoverable());
    }

    #[test]
    fn test_booking_error_is_transparent() {
        let err: Error = BookingError::not_found("gamma").into();
        assert_eq!(err.to_string(), "unknown crew: gamma");
    }

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let source = anyhow::anyhow!("disk full").context("writing booking");
        let err: Error = source.into();
        assert_eq!(err.to_string(), "writing booking: disk full");
        assert_eq!(err.code(), "InternalError");
    }

    #[test]
    fn test_server_error_classification() {
        let bind: Error = ServerError::Bind("address in use".into()).into();
        assert!(bind.is_recoverable());
        assert_eq!(bind.code(), "ServerError");
        assert_eq!(bind.to_string(), "Failed to bind: address in use");

        let config: Error = ServerError::Config("bad origin".into()).into();
        assert_eq!(config.category(), ErrorCategory::Config);
        assert!(!config.is_recoverable());
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
    }

    #[test]
    fn test_with_source_keeps_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "crews.toml");
        let err = Error::with_source("importing crews", io);

        assert_eq!(err.to_string(), "importing crews");
        let source = std::error::Error::source(&err).expect("source kept");
        assert_eq!(source.to_string(), "crews.toml");
    }
}
