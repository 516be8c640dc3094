//! Common test utilities
//!
//! Geography used throughout: Z1 is the reference point, Z2 and Z3 sit about
//! 7.5 miles north and south of it, so Z1↔Z2 and Z1↔Z3 are 15 minutes apart at
//! 30 mph and Z2↔Z3 is 30 minutes.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crewbook::geo::{Coordinates, GeoEstimator};
use crewbook::models::{BookingRecord, BookingRequest, CalendarEvent, Crew, CustomerContact};
use crewbook::notifications::{BookingNotice, ChannelError, ChannelResult, NotificationGateway};
use crewbook::scheduler::{BookingCoordinator, FixedClock};
use crewbook::storage::{
    CalendarRepository, CrewRepository, InMemoryCalendarRepository, InMemoryCrewRepository,
    InsertOutcome, SharedInsertGuard, SqliteStore,
};

/// 2024-01-`day` at `h:m`; the 15th is a Monday
pub fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

/// Tuesday 2024-01-16
pub fn tue(h: u32, m: u32) -> NaiveDateTime {
    at(16, h, m)
}

/// Clock reading used by every harness: Monday 07:00
pub fn test_now() -> NaiveDateTime {
    at(15, 7, 0)
}

pub fn geo() -> GeoEstimator {
    GeoEstimator::new(Coordinates::new(40.0, -75.0))
        .with_location("Z1", Coordinates::new(40.0, -75.0))
        .with_location("Z2", Coordinates::new(40.1085, -75.0))
        .with_location("Z3", Coordinates::new(39.8915, -75.0))
}

pub fn alpha() -> Crew {
    Crew::new("alpha", "Alpha Crew", "Z1")
        .with_contact(Some("alpha@example.com".to_string()), None)
}

pub fn bravo() -> Crew {
    Crew::new("bravo", "Bravo Crew", "Z2")
}

pub fn request(location: &str, minutes: u32, earliest: Option<NaiveDateTime>) -> BookingRequest {
    customer_request("Dana Whitfield", location, minutes, earliest)
}

pub fn customer_request(
    name: &str,
    location: &str,
    minutes: u32,
    earliest: Option<NaiveDateTime>,
) -> BookingRequest {
    BookingRequest {
        customer: CustomerContact {
            name: name.to_string(),
            email: "customer@example.com".to_string(),
            phone: "(512) 555-0100".to_string(),
        },
        location_code: location.to_string(),
        service_type: "Roof inspection".to_string(),
        duration_minutes: minutes,
        earliest_start: earliest,
        notes: None,
    }
}

// ============================================================================
// Gateways
// ============================================================================

/// Keeps every notice it is given
#[derive(Default)]
pub struct RecordingGateway {
    notices: Mutex<Vec<BookingNotice>>,
}

impl RecordingGateway {
    pub fn notices(&self) -> Vec<BookingNotice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn enqueue(&self, notice: BookingNotice) -> ChannelResult<()> {
        self.notices.lock().unwrap().push(notice);
        Ok(())
    }
}

/// Refuses every notice
pub struct FailingGateway;

#[async_trait]
impl NotificationGateway for FailingGateway {
    async fn enqueue(&self, _notice: BookingNotice) -> ChannelResult<()> {
        Err(ChannelError::Unavailable("gateway offline".to_string()))
    }
}

// ============================================================================
// Calendars
// ============================================================================

/// Reads see an empty calendar, writes reach the wrapped store
///
/// Stands in for a coordinator in another process whose calendar read
/// happened just before a competing booking committed.
pub struct StaleReadCalendar {
    inner: Arc<dyn CalendarRepository>,
}

#[async_trait]
impl CalendarRepository for StaleReadCalendar {
    async fn events_for_crew(
        &self,
        _crew_id: &str,
        _from: NaiveDateTime,
        _to: NaiveDateTime,
    ) -> anyhow::Result<Vec<CalendarEvent>> {
        Ok(Vec::new())
    }

    async fn insert_booking(
        &self,
        event: &CalendarEvent,
        booking: &BookingRecord,
    ) -> anyhow::Result<InsertOutcome> {
        self.inner.insert_booking(event, booking).await
    }

    async fn insert_booking_guarded(
        &self,
        event: &CalendarEvent,
        booking: &BookingRecord,
        guard: SharedInsertGuard,
    ) -> anyhow::Result<InsertOutcome> {
        self.inner.insert_booking_guarded(event, booking, guard).await
    }

    async fn insert_event(&self, event: &CalendarEvent) -> anyhow::Result<InsertOutcome> {
        self.inner.insert_event(event).await
    }

    async fn get_booking(&self, id: &str) -> anyhow::Result<Option<BookingRecord>> {
        self.inner.get_booking(id).await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub coordinator: Arc<BookingCoordinator>,
    pub crews: Arc<dyn CrewRepository>,
    pub calendar: Arc<dyn CalendarRepository>,
}

/// Coordinator over in-memory repositories with a fixed clock
pub async fn in_memory_harness(crews: &[Crew], notifier: Arc<dyn NotificationGateway>) -> Harness {
    let roster: Arc<dyn CrewRepository> = Arc::new(InMemoryCrewRepository::new());
    let calendar: Arc<dyn CalendarRepository> = Arc::new(InMemoryCalendarRepository::new());
    harness(roster, calendar, crews, notifier).await
}

/// Coordinator over an SQLite store with a fixed clock
pub async fn sqlite_harness(
    store: &SqliteStore,
    crews: &[Crew],
    notifier: Arc<dyn NotificationGateway>,
) -> Harness {
    let roster: Arc<dyn CrewRepository> = Arc::new(store.clone());
    let calendar: Arc<dyn CalendarRepository> = Arc::new(store.clone());
    harness(roster, calendar, crews, notifier).await
}

/// Coordinator over `store` whose calendar reads are always empty
pub async fn stale_read_harness(
    store: &SqliteStore,
    crews: &[Crew],
    notifier: Arc<dyn NotificationGateway>,
) -> Harness {
    let roster: Arc<dyn CrewRepository> = Arc::new(store.clone());
    let calendar: Arc<dyn CalendarRepository> = Arc::new(StaleReadCalendar {
        inner: Arc::new(store.clone()),
    });
    harness(roster, calendar, crews, notifier).await
}

async fn harness(
    roster: Arc<dyn CrewRepository>,
    calendar: Arc<dyn CalendarRepository>,
    crews: &[Crew],
    notifier: Arc<dyn NotificationGateway>,
) -> Harness {
    for (i, crew) in crews.iter().enumerate() {
        let crew = crew.clone().with_roster_order(i as i64);
        roster.upsert_crew(&crew).await.unwrap();
    }

    let coordinator = BookingCoordinator::builder()
        .crews(roster.clone())
        .calendar(calendar.clone())
        .travel(Arc::new(geo()))
        .notifier(notifier)
        .clock(Arc::new(FixedClock(test_now())))
        .build()
        .unwrap();

    Harness {
        coordinator: Arc::new(coordinator),
        crews: roster,
        calendar,
    }
}
