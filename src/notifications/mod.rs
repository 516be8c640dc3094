//! Booking confirmation delivery
//!
//! The scheduler only ever talks to a [`NotificationGateway`]. Enqueueing is
//! cheap and never fails the booking; delivery happens later on a background
//! task with its own retry budget.
//!
//! # Architecture
//!
//! ```text
//!  BookingCoordinator::confirm
//!              │ enqueue(BookingNotice)
//!              ▼
//!   ┌──────────────────────┐
//!   │   DispatcherHandle   │  bounded mpsc queue
//!   └──────────────────────┘
//!              │
//!              ▼
//!   ┌──────────────────────┐
//!   │ NotificationDispatcher│  backoff per channel,
//!   │                      │  dead letters on exhaustion
//!   └──────────────────────┘
//!         │           │
//!         ▼           ▼
//!   ┌─────────┐ ┌─────────┐
//!   │ Webhook │ │   Log   │
//!   │ Channel │ │ Channel │
//!   └─────────┘ └─────────┘
//! ```

pub mod channels;
mod dispatcher;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{BookingRecord, Crew};

pub use channels::{Channel, ChannelError, ChannelResult, DeliveryStatus, LogChannel};
pub use channels::{WebhookChannel, WebhookConfig};
pub use dispatcher::{
    DeadLetter, DispatcherHandle, NotificationDispatcher, DEFAULT_DEAD_LETTER_CAPACITY,
    DEFAULT_ENQUEUE_TIMEOUT, QUEUE_CHANNEL,
};

// ============================================================================
// Notice
// ============================================================================

/// Crew contact details attached to a confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewContact {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A committed booking plus everything a channel needs to announce it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingNotice {
    pub booking: BookingRecord,
    pub crew: CrewContact,
}

const ICS_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

impl BookingNotice {
    pub fn new(booking: BookingRecord, crew: &Crew) -> Self {
        Self {
            booking,
            crew: CrewContact {
                name: crew.name.clone(),
                email: crew.email.clone(),
                phone: crew.phone.clone(),
            },
        }
    }

    /// Render an iCalendar invite for the booked visit
    ///
    /// Start and end are floating local times: they carry no zone and are
    /// read in the business's own local time.
    pub fn calendar_invite(&self) -> String {
        let b = &self.booking;
        let mut description = format!(
            "Customer: {} ({}, {})",
            b.customer.name, b.customer.email, b.customer.phone
        );
        if let Some(notes) = b.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            description.push_str("\nNotes: ");
            description.push_str(notes);
        }

        let mut lines = vec![
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            "PRODID:-//crewbook//booking//EN".to_string(),
            "METHOD:REQUEST".to_string(),
            "BEGIN:VEVENT".to_string(),
            format!("UID:{}@crewbook", b.id),
            format!("DTSTAMP:{}", b.created_at.format("%Y%m%dT%H%M%SZ")),
            format!("DTSTART:{}", ics_time(b.start)),
            format!("DTEND:{}", ics_time(b.end)),
            format!("SUMMARY:{}", escape_text(&format!("{} with {}", b.service_type, self.crew.name))),
            format!("LOCATION:{}", escape_text(&b.location_code)),
            format!("DESCRIPTION:{}", escape_text(&description)),
        ];
        if let Some(email) = &self.crew.email {
            lines.push(format!("ORGANIZER;CN={}:mailto:{email}", escape_text(&self.crew.name)));
        }
        lines.push(format!(
            "ATTENDEE;CN={};RSVP=TRUE:mailto:{}",
            escape_text(&b.customer.name),
            b.customer.email
        ));
        lines.push("END:VEVENT".to_string());
        lines.push("END:VCALENDAR".to_string());

        let mut out = lines.join("\r\n");
        out.push_str("\r\n");
        out
    }
}

fn ics_time(t: NaiveDateTime) -> String {
    t.format(ICS_TIME_FORMAT).to_string()
}

/// RFC 5545 TEXT escaping
fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

// ============================================================================
// Gateway
// ============================================================================

/// Port the scheduler uses to hand off confirmations
///
/// Implementations must return quickly. An error here is logged by the
/// caller and never affects the booking.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn enqueue(&self, notice: BookingNotice) -> ChannelResult<()>;
}

/// Gateway that drops every notice
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGateway;

#[async_trait]
impl NotificationGateway for NoopGateway {
    async fn enqueue(&self, notice: BookingNotice) -> ChannelResult<()> {
        tracing::debug!(booking_id = %notice.booking.id, "Notification discarded (no gateway)");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::sample_notice;
    use super::*;

    #[test]
    fn test_notice_carries_crew_contact() {
        let notice = sample_notice();
        assert_eq!(notice.crew.name, "Alpha Crew");
        assert_eq!(notice.crew.email.as_deref(), Some("alpha@example.com"));
        assert!(notice.crew.phone.is_none());
    }

    #[test]
    fn test_calendar_invite_fields() {
        let notice = sample_notice();
        let ics = notice.calendar_invite();

        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert!(ics.contains("DTSTART:20240116T091500\r\n"));
        assert!(ics.contains("DTEND:20240116T104500\r\n"));
        assert!(ics.contains(&format!("UID:{}@crewbook", notice.booking.id)));
        assert!(ics.contains("SUMMARY:Gutter cleaning\\, front side with Alpha Crew"));
        assert!(ics.contains("Gate code 1234\\; dog in yard"));
        assert!(ics.contains("ORGANIZER;CN=Alpha Crew:mailto:alpha@example.com"));
        assert!(ics.contains("ATTENDEE;CN=Dana Reyes;RSVP=TRUE:mailto:dana@example.com"));
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a,b;c\\d\ne"), "a\\,b\\;c\\\\d\\ne");
    }

    #[tokio::test]
    async fn test_noop_gateway_accepts() {
        assert!(NoopGateway.enqueue(sample_notice()).await.is_ok());
    }
}
