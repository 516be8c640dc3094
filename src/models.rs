// Core data structures for crewbook

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduler::error::BookingError;
use crate::utils;

/// A field crew that can be dispatched to jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crew {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Location code the crew leaves from each morning and returns to
    pub home_base: String,
    #[serde(default)]
    pub buffer_before_minutes: u32,
    #[serde(default)]
    pub buffer_after_minutes: u32,
    /// Position in the roster; lower values were registered first
    #[serde(default)]
    pub roster_order: i64,
}

impl Crew {
    /// Create a crew with zero default buffers
    pub fn new(id: impl Into<String>, name: impl Into<String>, home_base: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            phone: None,
            home_base: utils::normalize_location_code(home_base),
            buffer_before_minutes: 0,
            buffer_after_minutes: 0,
            roster_order: 0,
        }
    }

    pub fn with_buffers(mut self, before: u32, after: u32) -> Self {
        self.buffer_before_minutes = before;
        self.buffer_after_minutes = after;
        self
    }

    pub fn with_contact(mut self, email: Option<String>, phone: Option<String>) -> Self {
        self.email = email;
        self.phone = phone;
        self
    }

    pub fn with_roster_order(mut self, order: i64) -> Self {
        self.roster_order = order;
        self
    }
}

/// Lifecycle state of a calendar event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Scheduled,
    Cancelled,
}

impl EventStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "scheduled" => Some(Self::Scheduled),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether the event occupies crew time
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A commitment on a crew's calendar, in local wall-clock time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub crew_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub location_code: String,
    /// Overrides the crew's default pre-job buffer when set
    pub buffer_before_minutes: Option<u32>,
    /// Overrides the crew's default post-job buffer when set
    pub buffer_after_minutes: Option<u32>,
    pub status: EventStatus,
    pub booking_id: Option<String>,
}

impl CalendarEvent {
    /// Create a scheduled event with no buffer overrides
    pub fn new(
        crew_id: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        location_code: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            crew_id: crew_id.into(),
            start,
            end,
            location_code: utils::normalize_location_code(location_code),
            buffer_before_minutes: None,
            buffer_after_minutes: None,
            status: EventStatus::Scheduled,
            booking_id: None,
        }
    }

    pub fn with_buffers(mut self, before: u32, after: u32) -> Self {
        self.buffer_before_minutes = Some(before);
        self.buffer_after_minutes = Some(after);
        self
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    /// Event created by confirming a proposal; carries the crew's default buffers
    pub fn for_booking(proposal: &SlotProposal, location_code: &str, booking_id: &str) -> Self {
        let mut event = Self::new(
            proposal.crew_id.clone(),
            proposal.start,
            proposal.end,
            location_code,
        )
        .with_buffers(
            proposal.buffer_before_minutes,
            proposal.buffer_after_minutes,
        );
        event.booking_id = Some(booking_id.to_string());
        event
    }

    /// Effective pre-job buffer
    pub fn buffer_before(&self, crew: &Crew) -> Duration {
        Duration::minutes(i64::from(
            self.buffer_before_minutes
                .unwrap_or(crew.buffer_before_minutes),
        ))
    }

    /// Effective post-job buffer
    pub fn buffer_after(&self, crew: &Crew) -> Duration {
        Duration::minutes(i64::from(
            self.buffer_after_minutes.unwrap_or(crew.buffer_after_minutes),
        ))
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Raw interval overlap with `[start, end)`
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start < end && start < self.end
    }
}

/// Customer contact fields of a booking request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Bounds applied to incoming booking requests
#[derive(Debug, Clone)]
pub struct RequestLimits {
    pub min_duration_minutes: u32,
    pub max_duration_minutes: u32,
    pub max_name_chars: usize,
    pub max_service_type_chars: usize,
    pub max_notes_chars: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            min_duration_minutes: 30,
            max_duration_minutes: 480,
            max_name_chars: 120,
            max_service_type_chars: 80,
            max_notes_chars: 2000,
        }
    }
}

/// A customer's request for a job slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub customer: CustomerContact,
    pub location_code: String,
    pub service_type: String,
    pub duration_minutes: u32,
    /// Local wall-clock lower bound for the start
    pub earliest_start: Option<NaiveDateTime>,
    pub notes: Option<String>,
}

impl BookingRequest {
    /// Check field shapes and bounds
    ///
    /// Runs before any scheduling work; the first offending field is reported.
    pub fn validate(&self, limits: &RequestLimits) -> Result<(), BookingError> {
        let name = self.customer.name.trim();
        if name.is_empty() || name.chars().count() > limits.max_name_chars {
            return Err(BookingError::validation(
                "name",
                format!("must be 1-{} characters", limits.max_name_chars),
            ));
        }

        if !utils::is_valid_email(&self.customer.email) {
            return Err(BookingError::validation("email", "not a valid email address"));
        }

        match utils::phone_digits(&self.customer.phone) {
            Some(digits) if (7..=20).contains(&digits.len()) => {}
            _ => {
                return Err(BookingError::validation(
                    "phone",
                    "must contain 7-20 digits",
                ))
            }
        }

        if !utils::is_valid_location_code(&self.location_code) {
            return Err(BookingError::validation(
                "postalCode",
                "must be 2-10 letters or digits",
            ));
        }

        let service = self.service_type.trim();
        if service.is_empty() || service.chars().count() > limits.max_service_type_chars {
            return Err(BookingError::validation(
                "serviceType",
                format!("must be 1-{} characters", limits.max_service_type_chars),
            ));
        }

        if self.duration_minutes < limits.min_duration_minutes
            || self.duration_minutes > limits.max_duration_minutes
        {
            return Err(BookingError::validation(
                "durationMinutes",
                format!(
                    "must be between {} and {} minutes",
                    limits.min_duration_minutes, limits.max_duration_minutes
                ),
            ));
        }

        if let Some(notes) = &self.notes {
            if notes.chars().count() > limits.max_notes_chars {
                return Err(BookingError::validation(
                    "notes",
                    format!("must be at most {} characters", limits.max_notes_chars),
                ));
            }
        }

        Ok(())
    }

    /// Normalized target location code
    pub fn location(&self) -> String {
        utils::normalize_location_code(&self.location_code)
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// A candidate slot for one crew; not persisted until confirmed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotProposal {
    pub crew_id: String,
    pub crew_name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub travel_minutes_from_previous: u32,
    pub travel_minutes_to_next: u32,
    /// Inbound leg distance
    pub travel_miles: f64,
    pub buffer_before_minutes: u32,
    pub buffer_after_minutes: u32,
}

impl SlotProposal {
    pub fn selection(&self) -> SlotSelection {
        SlotSelection {
            crew_id: self.crew_id.clone(),
            start: self.start,
        }
    }
}

/// The slot a client picked from a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSelection {
    pub crew_id: String,
    pub start: NaiveDateTime,
}

/// Persisted result of a successful confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: String,
    pub crew_id: String,
    pub crew_name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub location_code: String,
    pub service_type: String,
    pub customer: CustomerContact,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BookingRecord {
    /// Build the record for a confirmed proposal
    pub fn new(proposal: &SlotProposal, request: &BookingRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            crew_id: proposal.crew_id.clone(),
            crew_name: proposal.crew_name.clone(),
            start: proposal.start,
            end: proposal.end,
            location_code: request.location(),
            service_type: request.service_type.trim().to_string(),
            customer: CustomerContact {
                name: request.customer.name.trim().to_string(),
                email: request.customer.email.trim().to_string(),
                phone: request.customer.phone.trim().to_string(),
            },
            notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
            created_at: Utc::now(),
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}
