//! Booking error types

use thiserror::Error;

use crate::models::SlotProposal;

/// Errors surfaced by propose and confirm
#[derive(Debug, Clone, Error)]
pub enum BookingError {
    /// Malformed or out-of-range input
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// No crew has a feasible slot within the search horizon
    #[error("no crew has a feasible slot within the search horizon")]
    NoAvailability,

    /// The chosen slot is no longer feasible
    #[error("the requested slot is no longer available")]
    SlotConflict {
        /// Freshly computed alternative, if any crew still has room
        proposal: Option<Box<SlotProposal>>,
    },

    /// Roster empty or storage unreachable
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Unknown crew id
    #[error("unknown crew: {crew_id}")]
    NotFound { crew_id: String },
}

impl BookingError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn conflict(proposal: Option<SlotProposal>) -> Self {
        Self::SlotConflict {
            proposal: proposal.map(Box::new),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::ServiceUnavailable(reason.into())
    }

    pub fn not_found(crew_id: impl Into<String>) -> Self {
        Self::NotFound {
            crew_id: crew_id.into(),
        }
    }

    /// Alternative slot carried by a conflict
    pub fn alternative(&self) -> Option<&SlotProposal> {
        match self {
            Self::SlotConflict { proposal } => proposal.as_deref(),
            _ => None,
        }
    }
}

/// Result type for booking operations
pub type BookingResult<T> = Result<T, BookingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BookingError::validation("email", "not a valid email address");
        assert_eq!(err.to_string(), "invalid email: not a valid email address");

        let err = BookingError::not_found("gamma");
        assert_eq!(err.to_string(), "unknown crew: gamma");
    }

    #[test]
    fn test_conflict_without_alternative() {
        let err = BookingError::conflict(None);
        assert!(err.alternative().is_none());
        assert!(BookingError::NoAvailability.alternative().is_none());
    }
}
