//! Persistence for the crew roster, calendar events and booking records
//!
//! - [`repository`] - Repository traits plus in-memory implementations
//! - [`sqlite`] - SQLite implementation (WAL, guarded inserts)

pub mod repository;
pub mod sqlite;

pub use repository::{
    CalendarRepository, CrewRepository, InMemoryCalendarRepository, InMemoryCrewRepository,
    InsertGuard, InsertOutcome, SharedCalendarRepository, SharedCrewRepository,
    SharedInsertGuard,
};
pub use sqlite::SqliteStore;
