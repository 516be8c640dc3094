//! Repository behavior shared by the SQLite and in-memory backends

mod common;

use std::sync::Arc;

use chrono::Duration;

use common::*;
use crewbook::models::{BookingRecord, CalendarEvent, EventStatus, SlotProposal};
use crewbook::scheduler::{SearchPolicy, SlotGuard};
use crewbook::storage::{
    CalendarRepository, CrewRepository, InMemoryCalendarRepository, InsertOutcome, SqliteStore,
};

fn proposal(crew_id: &str, start_h: u32, start_m: u32, minutes: i64) -> SlotProposal {
    let start = tue(start_h, start_m);
    SlotProposal {
        crew_id: crew_id.to_string(),
        crew_name: "Alpha Crew".to_string(),
        start,
        end: start + Duration::minutes(minutes),
        travel_minutes_from_previous: 15,
        travel_minutes_to_next: 15,
        travel_miles: 7.5,
        buffer_before_minutes: 0,
        buffer_after_minutes: 0,
    }
}

fn booking_pair(p: &SlotProposal) -> (CalendarEvent, BookingRecord) {
    let record = BookingRecord::new(p, &request("Z2", 90, None));
    let event = CalendarEvent::for_booking(p, &record.location_code, &record.id);
    (event, record)
}

fn backends() -> Vec<Arc<dyn CalendarRepository>> {
    vec![
        Arc::new(InMemoryCalendarRepository::new()),
        Arc::new(SqliteStore::in_memory().unwrap()),
    ]
}

#[tokio::test]
async fn test_booking_record_round_trips() {
    for calendar in backends() {
        let (event, record) = booking_pair(&proposal("alpha", 9, 15, 90));
        assert_eq!(
            calendar.insert_booking(&event, &record).await.unwrap(),
            InsertOutcome::Inserted
        );

        let stored = calendar.get_booking(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.crew_id, "alpha");
        assert_eq!(stored.start, tue(9, 15));
        assert_eq!(stored.end, tue(10, 45));
        assert_eq!(stored.customer, record.customer);
        assert_eq!(stored.location_code, "Z2");

        let events = calendar.events_for_crew("alpha", tue(0, 0), tue(23, 59)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].booking_id.as_deref(), Some(record.id.as_str()));

        assert!(calendar.get_booking("missing").await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_overlapping_booking_writes_nothing() {
    for calendar in backends() {
        let (first_event, first) = booking_pair(&proposal("alpha", 9, 15, 90));
        let (clash_event, clash) = booking_pair(&proposal("alpha", 10, 0, 60));

        calendar.insert_booking(&first_event, &first).await.unwrap();
        assert_eq!(
            calendar.insert_booking(&clash_event, &clash).await.unwrap(),
            InsertOutcome::Conflict
        );
        assert!(calendar.get_booking(&clash.id).await.unwrap().is_none());

        // Touching intervals do not overlap, and other crews are independent
        let (adjacent_event, adjacent) = booking_pair(&proposal("alpha", 10, 45, 30));
        let (other_event, other) = booking_pair(&proposal("bravo", 10, 0, 60));
        assert_eq!(
            calendar.insert_booking(&adjacent_event, &adjacent).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            calendar.insert_booking(&other_event, &other).await.unwrap(),
            InsertOutcome::Inserted
        );
    }
}

#[tokio::test]
async fn test_cancelled_events_are_invisible() {
    for calendar in backends() {
        let cancelled = CalendarEvent::new("alpha", tue(9, 0), tue(12, 0), "Z1")
            .with_status(EventStatus::Cancelled);
        calendar.insert_event(&cancelled).await.unwrap();

        let events = calendar.events_for_crew("alpha", tue(0, 0), tue(23, 59)).await.unwrap();
        assert!(events.is_empty());

        let (event, record) = booking_pair(&proposal("alpha", 9, 15, 90));
        assert_eq!(
            calendar.insert_booking(&event, &record).await.unwrap(),
            InsertOutcome::Inserted
        );
    }
}

#[tokio::test]
async fn test_slot_guard_refuses_short_travel_gap() {
    for calendar in backends() {
        let (first_event, first) = booking_pair(&proposal("alpha", 9, 15, 90));
        calendar.insert_booking(&first_event, &first).await.unwrap();

        let guard = || Arc::new(SlotGuard::new(alpha(), SearchPolicy::default(), Arc::new(geo())));

        // 10:45 end in Z2, 30 minutes to Z3
        let mut short = proposal("alpha", 11, 0, 60);
        let (mut short_event, short_record) = booking_pair(&short);
        short_event.location_code = "Z3".to_string();
        assert_eq!(
            calendar
                .insert_booking_guarded(&short_event, &short_record, guard())
                .await
                .unwrap(),
            InsertOutcome::Conflict
        );
        assert!(calendar.get_booking(&short_record.id).await.unwrap().is_none());

        short.start = tue(11, 15);
        short.end = tue(12, 15);
        let (mut ok_event, ok_record) = booking_pair(&short);
        ok_event.location_code = "Z3".to_string();
        assert_eq!(
            calendar
                .insert_booking_guarded(&ok_event, &ok_record, guard())
                .await
                .unwrap(),
            InsertOutcome::Inserted
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_inserts_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("race.db")).unwrap();

    // Staggered starts that all overlap 10:00-10:30
    let mut tasks = Vec::new();
    for i in 0..10u32 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let (event, record) = booking_pair(&proposal("alpha", 9, 15 + i * 3, 90));
            store.insert_booking(&event, &record).await.unwrap()
        }));
    }

    let mut inserted = 0;
    for task in tasks {
        if task.await.unwrap() == InsertOutcome::Inserted {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1);

    let events = store.events_for_crew("alpha", tue(0, 0), tue(23, 59)).await.unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_bookings_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crewbook.db");
    let (event, record) = booking_pair(&proposal("alpha", 13, 0, 60));

    {
        let store = SqliteStore::open(&path).unwrap();
        store.upsert_crew(&alpha().with_roster_order(1)).await.unwrap();
        store.upsert_crew(&bravo().with_roster_order(0)).await.unwrap();
        store.insert_booking(&event, &record).await.unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    let crews = store.list_crews().await.unwrap();
    assert_eq!(
        crews.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
        vec!["bravo", "alpha"]
    );
    assert_eq!(crews[1].email.as_deref(), Some("alpha@example.com"));

    let stored = store.get_booking(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.start, tue(13, 0));
    assert_eq!(stored.created_at.timestamp(), record.created_at.timestamp());

    // The reopened store still guards the interval
    let (clash_event, clash) = booking_pair(&proposal("alpha", 13, 30, 60));
    assert_eq!(
        store.insert_booking(&clash_event, &clash).await.unwrap(),
        InsertOutcome::Conflict
    );
}
