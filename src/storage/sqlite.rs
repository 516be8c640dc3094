//! SQLite implementation of the crew and calendar repositories
//!
//! One connection behind a `Mutex`, WAL journal. Every call runs on the
//! blocking pool, so a dropped request future never interrupts a transaction
//! halfway: it either commits or rolls back as a whole.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::repository::{
    CalendarRepository, CrewRepository, InsertGuard, InsertOutcome, SharedInsertGuard,
};
use crate::models::{BookingRecord, CalendarEvent, Crew, CustomerContact, EventStatus};

/// Fixed-width local timestamp format; sorts lexicographically
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS crews (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT,
        phone TEXT,
        home_base TEXT NOT NULL,
        buffer_before_minutes INTEGER NOT NULL DEFAULT 0,
        buffer_after_minutes INTEGER NOT NULL DEFAULT 0,
        roster_order INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS calendar_events (
        id TEXT PRIMARY KEY,
        crew_id TEXT NOT NULL,
        start_at TEXT NOT NULL,
        end_at TEXT NOT NULL,
        location_code TEXT NOT NULL,
        buffer_before_minutes INTEGER,
        buffer_after_minutes INTEGER,
        status TEXT NOT NULL DEFAULT 'scheduled',
        booking_id TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_calendar_events_crew_start
        ON calendar_events(crew_id, start_at);

    CREATE UNIQUE INDEX IF NOT EXISTS idx_calendar_events_active_start
        ON calendar_events(crew_id, start_at) WHERE status != 'cancelled';

    CREATE TABLE IF NOT EXISTS bookings (
        id TEXT PRIMARY KEY,
        crew_id TEXT NOT NULL,
        crew_name TEXT NOT NULL,
        start_at TEXT NOT NULL,
        end_at TEXT NOT NULL,
        location_code TEXT NOT NULL,
        service_type TEXT NOT NULL,
        customer_name TEXT NOT NULL,
        customer_email TEXT NOT NULL,
        customer_phone TEXT NOT NULL,
        notes TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_bookings_crew
        ON bookings(crew_id, start_at);
"#;

/// SQLite-backed roster and calendar
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;")
            .context("Failed to configure SQLite")?;

        let store = Self::from_connection(conn)?;
        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create SQLite schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `op` against the connection on the blocking pool
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| anyhow!("SQLite connection mutex poisoned"))?;
            op(&mut guard)
        })
        .await
        .context("SQLite task failed")?
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn crew_from_row(row: &Row<'_>) -> rusqlite::Result<Crew> {
    Ok(Crew {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        home_base: row.get(4)?,
        buffer_before_minutes: row.get(5)?,
        buffer_after_minutes: row.get(6)?,
        roster_order: row.get(7)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<CalendarEvent> {
    let status: String = row.get(7)?;
    Ok(CalendarEvent {
        id: row.get(0)?,
        crew_id: row.get(1)?,
        start: parse_ts(2, &row.get::<_, String>(2)?)?,
        end: parse_ts(3, &row.get::<_, String>(3)?)?,
        location_code: row.get(4)?,
        buffer_before_minutes: row.get(5)?,
        buffer_after_minutes: row.get(6)?,
        status: EventStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                Type::Text,
                format!("unknown event status '{status}'").into(),
            )
        })?,
        booking_id: row.get(8)?,
    })
}

fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<BookingRecord> {
    let created_at: String = row.get(11)?;
    Ok(BookingRecord {
        id: row.get(0)?,
        crew_id: row.get(1)?,
        crew_name: row.get(2)?,
        start: parse_ts(3, &row.get::<_, String>(3)?)?,
        end: parse_ts(4, &row.get::<_, String>(4)?)?,
        location_code: row.get(5)?,
        service_type: row.get(6)?,
        customer: CustomerContact {
            name: row.get(7)?,
            email: row.get(8)?,
            phone: row.get(9)?,
        },
        notes: row.get(10)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?,
    })
}

fn write_event(conn: &Connection, event: &CalendarEvent) -> rusqlite::Result<usize> {
    conn.execute(
        r#"
        INSERT INTO calendar_events
            (id, crew_id, start_at, end_at, location_code,
             buffer_before_minutes, buffer_after_minutes, status, booking_id)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            event.id,
            event.crew_id,
            format_ts(&event.start),
            format_ts(&event.end),
            event.location_code,
            event.buffer_before_minutes,
            event.buffer_after_minutes,
            event.status.as_str(),
            event.booking_id,
        ],
    )
}

/// Active events of one crew overlapping `[from, to)`, sorted by start
fn select_events(
    conn: &Connection,
    crew_id: &str,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> Result<Vec<CalendarEvent>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, crew_id, start_at, end_at, location_code,
               buffer_before_minutes, buffer_after_minutes, status, booking_id
        FROM calendar_events
        WHERE crew_id = ?1 AND status != 'cancelled'
          AND end_at > ?2 AND start_at < ?3
        ORDER BY start_at
        "#,
    )?;
    let events = stmt
        .query_map(params![crew_id, format_ts(from), format_ts(to)], event_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read calendar events")?;
    Ok(events)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

/// Overlap check, optional guard, then insert, all inside one IMMEDIATE
/// transaction
fn insert_guarded(
    conn: &mut Connection,
    event: &CalendarEvent,
    booking: Option<&BookingRecord>,
    guard: Option<&dyn InsertGuard>,
) -> Result<InsertOutcome> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("Failed to begin transaction")?;

    if event.is_active() {
        let clash: bool = tx
            .query_row(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM calendar_events
                    WHERE crew_id = ?1 AND status != 'cancelled'
                      AND start_at < ?3 AND end_at > ?2
                )
                "#,
                params![
                    event.crew_id,
                    format_ts(&event.start),
                    format_ts(&event.end)
                ],
                |row| row.get(0),
            )
            .context("Failed to check for overlapping events")?;
        if clash {
            return Ok(InsertOutcome::Conflict);
        }
    }

    if let Some(guard) = guard {
        let (from, to) = guard.window(event);
        let existing = select_events(&tx, &event.crew_id, &from, &to)?;
        if !guard.admits(event, &existing) {
            return Ok(InsertOutcome::Conflict);
        }
    }

    match write_event(&tx, event) {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => return Ok(InsertOutcome::Conflict),
        Err(e) => return Err(e).context("Failed to insert calendar event"),
    }

    if let Some(booking) = booking {
        tx.execute(
            r#"
            INSERT INTO bookings
                (id, crew_id, crew_name, start_at, end_at, location_code, service_type,
                 customer_name, customer_email, customer_phone, notes, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                booking.id,
                booking.crew_id,
                booking.crew_name,
                format_ts(&booking.start),
                format_ts(&booking.end),
                booking.location_code,
                booking.service_type,
                booking.customer.name,
                booking.customer.email,
                booking.customer.phone,
                booking.notes,
                booking.created_at.to_rfc3339(),
            ],
        )
        .context("Failed to insert booking record")?;
    }

    tx.commit().context("Failed to commit booking")?;
    Ok(InsertOutcome::Inserted)
}

// ============================================================================
// Trait implementations
// ============================================================================

#[async_trait]
impl CrewRepository for SqliteStore {
    async fn list_crews(&self) -> Result<Vec<Crew>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id, name, email, phone, home_base,
                       buffer_before_minutes, buffer_after_minutes, roster_order
                FROM crews
                ORDER BY roster_order, rowid
                "#,
            )?;
            let crews = stmt
                .query_map([], crew_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read crews")?;
            Ok(crews)
        })
        .await
    }

    async fn get_crew(&self, id: &str) -> Result<Option<Crew>> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                r#"
                SELECT id, name, email, phone, home_base,
                       buffer_before_minutes, buffer_after_minutes, roster_order
                FROM crews WHERE id = ?1
                "#,
                params![id],
                crew_from_row,
            )
            .optional()
            .context("Failed to get crew")
        })
        .await
    }

    async fn upsert_crew(&self, crew: &Crew) -> Result<()> {
        let crew = crew.clone();
        self.run(move |conn| {
            conn.execute(
                r#"
                INSERT INTO crews
                    (id, name, email, phone, home_base,
                     buffer_before_minutes, buffer_after_minutes, roster_order)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    email = excluded.email,
                    phone = excluded.phone,
                    home_base = excluded.home_base,
                    buffer_before_minutes = excluded.buffer_before_minutes,
                    buffer_after_minutes = excluded.buffer_after_minutes,
                    roster_order = excluded.roster_order
                "#,
                params![
                    crew.id,
                    crew.name,
                    crew.email,
                    crew.phone,
                    crew.home_base,
                    crew.buffer_before_minutes,
                    crew.buffer_after_minutes,
                    crew.roster_order,
                ],
            )
            .context("Failed to upsert crew")?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CalendarRepository for SqliteStore {
    async fn events_for_crew(
        &self,
        crew_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>> {
        let crew_id = crew_id.to_string();
        self.run(move |conn| select_events(conn, &crew_id, &from, &to))
            .await
    }

    async fn insert_booking(
        &self,
        event: &CalendarEvent,
        booking: &BookingRecord,
    ) -> Result<InsertOutcome> {
        let event = event.clone();
        let booking = booking.clone();
        self.run(move |conn| insert_guarded(conn, &event, Some(&booking), None))
            .await
    }

    async fn insert_booking_guarded(
        &self,
        event: &CalendarEvent,
        booking: &BookingRecord,
        guard: SharedInsertGuard,
    ) -> Result<InsertOutcome> {
        let event = event.clone();
        let booking = booking.clone();
        self.run(move |conn| insert_guarded(conn, &event, Some(&booking), Some(guard.as_ref())))
            .await
    }

    async fn insert_event(&self, event: &CalendarEvent) -> Result<InsertOutcome> {
        let event = event.clone();
        self.run(move |conn| insert_guarded(conn, &event, None, None)).await
    }

    async fn get_booking(&self, id: &str) -> Result<Option<BookingRecord>> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                r#"
                SELECT id, crew_id, crew_name, start_at, end_at, location_code, service_type,
                       customer_name, customer_email, customer_phone, notes, created_at
                FROM bookings WHERE id = ?1
                "#,
                params![id],
                booking_from_row,
            )
            .optional()
            .context("Failed to get booking")
        })
        .await
    }
}
