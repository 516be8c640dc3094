//! Repository pattern for crew roster and calendar storage
//!
//! The scheduler only sees these traits, so the same code runs against
//! SQLite in production and the in-memory implementations in tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::models::{BookingRecord, CalendarEvent, Crew};

// ============================================================================
// Types
// ============================================================================

/// Result of a conflict-aware insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Event (and booking) written
    Inserted,
    /// A non-cancelled event already overlaps the interval; nothing written
    Conflict,
}

/// Extra admission rule for a booking, checked by the store inside the same
/// write transaction as the insert
///
/// The store reads the crew's active events overlapping [`InsertGuard::window`]
/// after taking its write lock, so the rule sees every commit that landed
/// before it, including ones from other processes sharing the database.
pub trait InsertGuard: Send + Sync {
    /// Range of existing events the rule needs to see
    fn window(&self, event: &CalendarEvent) -> (NaiveDateTime, NaiveDateTime);

    /// Whether `event` still fits among `existing` (active, sorted by start)
    fn admits(&self, event: &CalendarEvent, existing: &[CalendarEvent]) -> bool;
}

pub type SharedInsertGuard = Arc<dyn InsertGuard>;

// ============================================================================
// Repository Traits
// ============================================================================

/// Crew roster (read-mostly)
#[async_trait]
pub trait CrewRepository: Send + Sync {
    /// All crews by `roster_order`, then registration order
    async fn list_crews(&self) -> Result<Vec<Crew>>;

    /// Look up one crew
    async fn get_crew(&self, id: &str) -> Result<Option<Crew>>;

    /// Insert or replace a crew, keeping its registration position
    async fn upsert_crew(&self, crew: &Crew) -> Result<()>;
}

/// Calendar events and booking records
#[async_trait]
pub trait CalendarRepository: Send + Sync {
    /// Non-cancelled events of one crew overlapping `[from, to)`, sorted by start
    async fn events_for_crew(
        &self,
        crew_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>>;

    /// Atomically insert a booked event and its record unless it overlaps
    async fn insert_booking(
        &self,
        event: &CalendarEvent,
        booking: &BookingRecord,
    ) -> Result<InsertOutcome>;

    /// [`CalendarRepository::insert_booking`], additionally refused unless
    /// `guard` admits the event against the crew's calendar at commit time
    async fn insert_booking_guarded(
        &self,
        event: &CalendarEvent,
        booking: &BookingRecord,
        guard: SharedInsertGuard,
    ) -> Result<InsertOutcome>;

    /// Insert a standalone event (blocked time, imported commitments)
    async fn insert_event(&self, event: &CalendarEvent) -> Result<InsertOutcome>;

    /// Look up a booking record
    async fn get_booking(&self, id: &str) -> Result<Option<BookingRecord>>;
}

/// Thread-safe shared repository handles
pub type SharedCrewRepository = Arc<dyn CrewRepository>;
pub type SharedCalendarRepository = Arc<dyn CalendarRepository>;

// ============================================================================
// In-Memory Implementations
// ============================================================================

/// In-memory crew roster
///
/// Useful for testing without database dependencies.
#[derive(Debug, Default)]
pub struct InMemoryCrewRepository {
    crews: RwLock<Vec<Crew>>,
}

impl InMemoryCrewRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of crews in registration order
    pub fn with_crews(crews: impl IntoIterator<Item = Crew>) -> Self {
        Self {
            crews: RwLock::new(crews.into_iter().collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.crews.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CrewRepository for InMemoryCrewRepository {
    async fn list_crews(&self) -> Result<Vec<Crew>> {
        let crews = self.crews.read().map_err(|_| anyhow!("crew lock poisoned"))?;
        let mut ordered = crews.clone();
        // stable sort keeps registration order within equal roster_order
        ordered.sort_by_key(|c| c.roster_order);
        Ok(ordered)
    }

    async fn get_crew(&self, id: &str) -> Result<Option<Crew>> {
        let crews = self.crews.read().map_err(|_| anyhow!("crew lock poisoned"))?;
        Ok(crews.iter().find(|c| c.id == id).cloned())
    }

    async fn upsert_crew(&self, crew: &Crew) -> Result<()> {
        let mut crews = self.crews.write().map_err(|_| anyhow!("crew lock poisoned"))?;
        match crews.iter_mut().find(|c| c.id == crew.id) {
            Some(existing) => *existing = crew.clone(),
            None => crews.push(crew.clone()),
        }
        Ok(())
    }
}

/// In-memory calendar
///
/// The write lock makes the overlap check and insert a single step.
#[derive(Debug, Default)]
pub struct InMemoryCalendarRepository {
    events: RwLock<Vec<CalendarEvent>>,
    bookings: RwLock<HashMap<String, BookingRecord>>,
}

impl InMemoryCalendarRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events, including cancelled ones
    pub fn event_count(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.read().map(|b| b.len()).unwrap_or(0)
    }

    fn try_insert(
        &self,
        event: &CalendarEvent,
        guard: Option<&dyn InsertGuard>,
    ) -> Result<InsertOutcome> {
        let mut events = self
            .events
            .write()
            .map_err(|_| anyhow!("calendar lock poisoned"))?;

        let clash = event.is_active()
            && events.iter().any(|e| {
                e.crew_id == event.crew_id
                    && e.is_active()
                    && (e.overlaps(event.start, event.end) || e.start == event.start)
            });
        if clash {
            return Ok(InsertOutcome::Conflict);
        }

        if let Some(guard) = guard {
            let (from, to) = guard.window(event);
            let mut existing: Vec<CalendarEvent> = events
                .iter()
                .filter(|e| e.crew_id == event.crew_id && e.is_active() && e.overlaps(from, to))
                .cloned()
                .collect();
            existing.sort_by_key(|e| e.start);
            if !guard.admits(event, &existing) {
                return Ok(InsertOutcome::Conflict);
            }
        }

        events.push(event.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn insert_with(
        &self,
        event: &CalendarEvent,
        booking: &BookingRecord,
        guard: Option<&dyn InsertGuard>,
    ) -> Result<InsertOutcome> {
        // hold the bookings lock across the event insert so both land together
        let mut bookings = self
            .bookings
            .write()
            .map_err(|_| anyhow!("booking lock poisoned"))?;

        let outcome = self.try_insert(event, guard)?;
        if outcome == InsertOutcome::Inserted {
            bookings.insert(booking.id.clone(), booking.clone());
        }
        Ok(outcome)
    }
}

#[async_trait]
impl CalendarRepository for InMemoryCalendarRepository {
    async fn events_for_crew(
        &self,
        crew_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>> {
        let events = self
            .events
            .read()
            .map_err(|_| anyhow!("calendar lock poisoned"))?;

        let mut found: Vec<CalendarEvent> = events
            .iter()
            .filter(|e| e.crew_id == crew_id && e.is_active() && e.overlaps(from, to))
            .cloned()
            .collect();
        found.sort_by_key(|e| e.start);
        Ok(found)
    }

    async fn insert_booking(
        &self,
        event: &CalendarEvent,
        booking: &BookingRecord,
    ) -> Result<InsertOutcome> {
        self.insert_with(event, booking, None)
    }

    async fn insert_booking_guarded(
        &self,
        event: &CalendarEvent,
        booking: &BookingRecord,
        guard: SharedInsertGuard,
    ) -> Result<InsertOutcome> {
        self.insert_with(event, booking, Some(guard.as_ref()))
    }

    async fn insert_event(&self, event: &CalendarEvent) -> Result<InsertOutcome> {
        self.try_insert(event, None)
    }

    async fn get_booking(&self, id: &str) -> Result<Option<BookingRecord>> {
        let bookings = self
            .bookings
            .read()
            .map_err(|_| anyhow!("booking lock poisoned"))?;
        Ok(bookings.get(id).cloned())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingRequest, CustomerContact, EventStatus, SlotProposal};
    use crate::storage::SqliteStore;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 16)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    // Helper to create test repositories: SQLite and in-memory side by side
    fn create_test_stores() -> Vec<(SharedCrewRepository, SharedCalendarRepository)> {
        let sqlite = Arc::new(SqliteStore::in_memory().unwrap());
        let sqlite_crews: SharedCrewRepository = sqlite.clone();
        let sqlite_calendar: SharedCalendarRepository = sqlite;
        let memory_crews: SharedCrewRepository = Arc::new(InMemoryCrewRepository::new());
        let memory_calendar: SharedCalendarRepository = Arc::new(InMemoryCalendarRepository::new());

        vec![(sqlite_crews, sqlite_calendar), (memory_crews, memory_calendar)]
    }

    fn booking_for(event: &CalendarEvent) -> BookingRecord {
        let proposal = SlotProposal {
            crew_id: event.crew_id.clone(),
            crew_name: "Alpha".to_string(),
            start: event.start,
            end: event.end,
            travel_minutes_from_previous: 12,
            travel_minutes_to_next: 12,
            travel_miles: 0.0,
            buffer_before_minutes: 0,
            buffer_after_minutes: 0,
        };
        let request = BookingRequest {
            customer: CustomerContact {
                name: "Dana".to_string(),
                email: "dana@example.com".to_string(),
                phone: "5125550100".to_string(),
            },
            location_code: event.location_code.clone(),
            service_type: "Repair".to_string(),
            duration_minutes: 60,
            earliest_start: None,
            notes: Some("gate code 4411".to_string()),
        };
        BookingRecord::new(&proposal, &request)
    }

    #[tokio::test]
    async fn test_roster_order_and_upsert() {
        for (crews, _) in create_test_stores() {
            crews.upsert_crew(&Crew::new("bravo", "Bravo", "Z2").with_roster_order(1)).await.unwrap();
            crews.upsert_crew(&Crew::new("alpha", "Alpha", "Z1").with_roster_order(0)).await.unwrap();
            crews.upsert_crew(&Crew::new("charlie", "Charlie", "Z3").with_roster_order(1)).await.unwrap();

            let ids: Vec<String> = crews.list_crews().await.unwrap().into_iter().map(|c| c.id).collect();
            assert_eq!(ids, vec!["alpha", "bravo", "charlie"]);

            crews
                .upsert_crew(&Crew::new("bravo", "Bravo Team", "Z3").with_buffers(10, 5).with_roster_order(1))
                .await
                .unwrap();
            let bravo = crews.get_crew("bravo").await.unwrap().unwrap();
            assert_eq!(bravo.name, "Bravo Team");
            assert_eq!(bravo.buffer_before_minutes, 10);
            assert_eq!(crews.list_crews().await.unwrap().len(), 3);
            assert!(crews.get_crew("delta").await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_range_query_filters_and_sorts() {
        for (_, calendar) in create_test_stores() {
            let late = CalendarEvent::new("alpha", at(14, 0), at(15, 0), "Z1");
            let early = CalendarEvent::new("alpha", at(9, 0), at(10, 0), "Z2").with_buffers(15, 15);
            let cancelled =
                CalendarEvent::new("alpha", at(11, 0), at(12, 0), "Z3").with_status(EventStatus::Cancelled);
            let other_crew = CalendarEvent::new("bravo", at(9, 0), at(10, 0), "Z1");

            for event in [&late, &early, &cancelled, &other_crew] {
                assert_eq!(calendar.insert_event(event).await.unwrap(), InsertOutcome::Inserted);
            }

            let found = calendar.events_for_crew("alpha", at(0, 0), at(23, 0)).await.unwrap();
            assert_eq!(found.len(), 2);
            assert_eq!(found[0].id, early.id);
            assert_eq!(found[0].buffer_before_minutes, Some(15));
            assert_eq!(found[1].id, late.id);

            let window = calendar.events_for_crew("alpha", at(10, 0), at(14, 0)).await.unwrap();
            assert!(window.is_empty());
        }
    }

    #[tokio::test]
    async fn test_insert_booking_rejects_overlap() {
        for (_, calendar) in create_test_stores() {
            let first = CalendarEvent::new("alpha", at(9, 0), at(10, 30), "Z1");
            let booking = booking_for(&first);
            assert_eq!(calendar.insert_booking(&first, &booking).await.unwrap(), InsertOutcome::Inserted);

            let stored = calendar.get_booking(&booking.id).await.unwrap().unwrap();
            assert_eq!(stored.notes.as_deref(), Some("gate code 4411"));
            assert_eq!(stored.start, at(9, 0));

            let clash = CalendarEvent::new("alpha", at(10, 0), at(11, 0), "Z2");
            let clash_booking = booking_for(&clash);
            assert_eq!(
                calendar.insert_booking(&clash, &clash_booking).await.unwrap(),
                InsertOutcome::Conflict
            );
            assert!(calendar.get_booking(&clash_booking.id).await.unwrap().is_none());

            // adjacent and other-crew events are fine
            let adjacent = CalendarEvent::new("alpha", at(10, 30), at(11, 0), "Z2");
            assert_eq!(calendar.insert_event(&adjacent).await.unwrap(), InsertOutcome::Inserted);
            let other = CalendarEvent::new("bravo", at(9, 0), at(10, 30), "Z2");
            assert_eq!(calendar.insert_event(&other).await.unwrap(), InsertOutcome::Inserted);
        }
    }

    /// Minimum slack, in minutes, between consecutive events
    struct GapGuard(i64);

    impl InsertGuard for GapGuard {
        fn window(&self, event: &CalendarEvent) -> (NaiveDateTime, NaiveDateTime) {
            (event.start - chrono::Duration::days(1), event.end + chrono::Duration::days(1))
        }

        fn admits(&self, event: &CalendarEvent, existing: &[CalendarEvent]) -> bool {
            let gap = chrono::Duration::minutes(self.0);
            existing
                .iter()
                .all(|e| e.end + gap <= event.start || event.end + gap <= e.start)
        }
    }

    #[tokio::test]
    async fn test_guard_sees_committed_neighbours() {
        for (_, calendar) in create_test_stores() {
            let first = CalendarEvent::new("alpha", at(9, 0), at(10, 0), "Z1");
            calendar.insert_booking(&first, &booking_for(&first)).await.unwrap();
            let cancelled =
                CalendarEvent::new("alpha", at(12, 0), at(13, 0), "Z1").with_status(EventStatus::Cancelled);
            calendar.insert_event(&cancelled).await.unwrap();
            let other_crew = CalendarEvent::new("bravo", at(11, 0), at(12, 0), "Z1");
            calendar.insert_event(&other_crew).await.unwrap();

            // no raw overlap, but inside the required slack
            let tight = CalendarEvent::new("alpha", at(10, 15), at(11, 0), "Z2");
            let tight_booking = booking_for(&tight);
            assert_eq!(
                calendar
                    .insert_booking_guarded(&tight, &tight_booking, Arc::new(GapGuard(30)))
                    .await
                    .unwrap(),
                InsertOutcome::Conflict
            );
            assert!(calendar.get_booking(&tight_booking.id).await.unwrap().is_none());
            assert_eq!(calendar.events_for_crew("alpha", at(0, 0), at(23, 0)).await.unwrap().len(), 1);

            // cancelled and other-crew events are not neighbours
            let roomy = CalendarEvent::new("alpha", at(11, 30), at(12, 30), "Z2");
            assert_eq!(
                calendar
                    .insert_booking_guarded(&roomy, &booking_for(&roomy), Arc::new(GapGuard(30)))
                    .await
                    .unwrap(),
                InsertOutcome::Inserted
            );
        }
    }

    #[tokio::test]
    async fn test_cancelled_event_does_not_block() {
        for (_, calendar) in create_test_stores() {
            let cancelled =
                CalendarEvent::new("alpha", at(9, 0), at(10, 0), "Z1").with_status(EventStatus::Cancelled);
            calendar.insert_event(&cancelled).await.unwrap();

            let replacement = CalendarEvent::new("alpha", at(9, 0), at(10, 0), "Z1");
            assert_eq!(
                calendar.insert_booking(&replacement, &booking_for(&replacement)).await.unwrap(),
                InsertOutcome::Inserted
            );
        }
    }
}
