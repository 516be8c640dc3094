//! Travel-aware slot scheduling
//!
//! # Overview
//!
//! Given a job (location, duration, earliest start) and a roster of crews,
//! find the earliest start at which some crew can travel in, set up, do the
//! job, tear down and still reach its next commitment (or home) in time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    BookingCoordinator                        │
//! │   propose ─┬─▶ SlotSearch(crew 1) ─┐                         │
//! │            ├─▶ SlotSearch(crew 2) ─┼─▶ earliest start wins   │
//! │            └─▶ SlotSearch(crew n) ─┘   (ties: roster order)  │
//! │                                                              │
//! │   confirm ──▶ CrewLocks ──▶ fresh read ──▶ SlotSearch        │
//! │                                   │            │             │
//! │                                   ▼            ▼             │
//! │                 CalendarRepository::insert_booking_guarded   │
//! │                                   │                          │
//! │                                   ▼                          │
//! │                         NotificationGateway::enqueue         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`window`] - Grid alignment, working hours and working days
//! - [`search`] - Single-crew earliest-slot scan
//! - [`coordinator`] - Propose/confirm orchestration and per-crew locking
//! - [`clock`] - Local wall-clock source
//! - [`error`] - Booking error taxonomy

pub mod clock;
pub mod coordinator;
pub mod error;
pub mod search;
pub mod window;

pub use clock::{Clock, FixedClock, SystemClock};
pub use coordinator::{BookingCoordinator, BookingCoordinatorBuilder, CrewLocks};
pub use error::{BookingError, BookingResult};
pub use search::{DepartureRule, SearchOutcome, SlotGuard, SlotQuery, SlotSearch};
pub use window::SearchPolicy;
