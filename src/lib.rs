//! crewbook - Field crew appointment scheduler
//!
//! Finds the earliest feasible working slot for a job across a roster of field
//! crews, accounting for existing commitments, setup/teardown buffers and the
//! travel time between consecutive jobs, then commits the chosen slot without
//! allowing double-booking under concurrent confirmations.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`geo`] - Postal code lookup and travel time estimation
//! - [`scheduler`] - Slot search algorithm and the booking coordinator
//! - [`storage`] - Crew roster and calendar repositories (SQLite, in-memory)
//! - [`notifications`] - Booking confirmation delivery (webhook, log)
//! - [`api`] - JSON HTTP API built on axum
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use crewbook::scheduler::BookingCoordinator;
//! use crewbook::storage::{InMemoryCalendarRepository, InMemoryCrewRepository};
//!
//! # fn main() -> anyhow::Result<()> {
//! let coordinator = BookingCoordinator::builder()
//!     .crews(Arc::new(InMemoryCrewRepository::new()))
//!     .calendar(Arc::new(InMemoryCalendarRepository::new()))
//!     .build()?;
//! // coordinator.propose(&request).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod geo;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{CrewbookErrorTrait, Error, ErrorCategory, Result};
    pub use crate::geo::{GeoEstimator, TravelEstimate, TravelModel};
    pub use crate::models::{
        BookingRecord, BookingRequest, CalendarEvent, Crew, CustomerContact, EventStatus,
        SlotProposal, SlotSelection,
    };
    pub use crate::scheduler::{BookingCoordinator, BookingError, SearchPolicy, SlotSearch};
    pub use crate::storage::{CalendarRepository, CrewRepository, SqliteStore};
}

// Direct re-exports for convenience
pub use error::{Error, Result};
pub use models::{BookingRecord, BookingRequest, CalendarEvent, Crew, SlotProposal};
