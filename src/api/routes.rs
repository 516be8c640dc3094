//! REST API handlers
//!
//! All payloads are camelCase JSON. Times on the wire are RFC 3339 with the
//! business's UTC offset; internally they are local wall-clock times.

use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        MatchedPath, Path, Query, Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::CrewbookErrorTrait;
use crate::metrics;
use crate::models::{
    BookingRecord, BookingRequest, CalendarEvent, Crew, CustomerContact, SlotProposal,
    SlotSelection,
};
use crate::scheduler::BookingError;

use super::server::AppState;

// ============================================================================
// Wire Time
// ============================================================================

/// Local wall-clock time to an offset-aware timestamp
pub fn to_wire_time(local: NaiveDateTime, offset: FixedOffset) -> DateTime<FixedOffset> {
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}

/// Offset-aware timestamp to local wall-clock time
pub fn from_wire_time(t: DateTime<FixedOffset>, offset: FixedOffset) -> NaiveDateTime {
    t.with_timezone(&offset).naive_local()
}

// ============================================================================
// Request Types
// ============================================================================

/// `POST /api/booking` body, for both propose and confirm
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingPayload {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub postal_code: String,
    pub service_type: String,
    pub duration_minutes: u32,
    pub earliest_start: Option<DateTime<FixedOffset>>,
    pub notes: Option<String>,
    pub confirm: bool,
    pub slot: Option<SlotPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPayload {
    pub crew_id: String,
    pub start: DateTime<FixedOffset>,
}

impl BookingPayload {
    pub fn to_request(&self, offset: FixedOffset) -> BookingRequest {
        BookingRequest {
            customer: CustomerContact {
                name: self.name.clone(),
                email: self.email.clone(),
                phone: self.phone.clone(),
            },
            location_code: self.postal_code.clone(),
            service_type: self.service_type.clone(),
            duration_minutes: self.duration_minutes,
            earliest_start: self.earliest_start.map(|t| from_wire_time(t, offset)),
            notes: self.notes.clone(),
        }
    }

    pub fn selection(&self, offset: FixedOffset) -> Option<SlotSelection> {
        self.slot.as_ref().map(|slot| SlotSelection {
            crew_id: slot.crew_id.trim().to_string(),
            start: from_wire_time(slot.start, offset),
        })
    }
}

/// `GET /api/crews/{id}/events` query
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub from: Option<DateTime<FixedOffset>>,
    pub to: Option<DateTime<FixedOffset>>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalResponse {
    pub crew_id: String,
    pub crew_name: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub travel_minutes_from_previous: u32,
    pub travel_minutes_to_next: u32,
    pub travel_miles: f64,
    pub buffer_before_minutes: u32,
    pub buffer_after_minutes: u32,
}

impl ProposalResponse {
    pub fn new(p: &SlotProposal, offset: FixedOffset) -> Self {
        Self {
            crew_id: p.crew_id.clone(),
            crew_name: p.crew_name.clone(),
            start: to_wire_time(p.start, offset),
            end: to_wire_time(p.end, offset),
            travel_minutes_from_previous: p.travel_minutes_from_previous,
            travel_minutes_to_next: p.travel_minutes_to_next,
            travel_miles: p.travel_miles,
            buffer_before_minutes: p.buffer_before_minutes,
            buffer_after_minutes: p.buffer_after_minutes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProposeResponse {
    pub ok: bool,
    pub proposal: ProposalResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub ok: bool,
    pub booking_id: String,
    pub crew_name: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl ConfirmResponse {
    fn new(record: &BookingRecord, offset: FixedOffset) -> Self {
        Self {
            ok: true,
            booking_id: record.id.clone(),
            crew_name: record.crew_name.clone(),
            start: to_wire_time(record.start, offset),
            end: to_wire_time(record.end, offset),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewResponse {
    pub id: String,
    pub name: String,
    pub home_base: String,
    pub buffer_before_minutes: u32,
    pub buffer_after_minutes: u32,
    pub roster_order: i64,
}

impl From<&Crew> for CrewResponse {
    fn from(crew: &Crew) -> Self {
        Self {
            id: crew.id.clone(),
            name: crew.name.clone(),
            home_base: crew.home_base.clone(),
            buffer_before_minutes: crew.buffer_before_minutes,
            buffer_after_minutes: crew.buffer_after_minutes,
            roster_order: crew.roster_order,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CrewsResponse {
    pub ok: bool,
    pub crews: Vec<CrewResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub location_code: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
}

impl EventResponse {
    fn new(event: &CalendarEvent, offset: FixedOffset) -> Self {
        Self {
            id: event.id.clone(),
            start: to_wire_time(event.start, offset),
            end: to_wire_time(event.end, offset),
            location_code: event.location_code.clone(),
            status: event.status.as_str().to_string(),
            booking_id: event.booking_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub ok: bool,
    pub crew_id: String,
    pub events: Vec<EventResponse>,
}

/// Error body: `{ok: false, error, message, field?, proposal?}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Present (possibly null) only for conflicts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<Option<ProposalResponse>>,
}

/// A booking error rendered with its HTTP status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn from_booking(err: &BookingError, offset: FixedOffset) -> Self {
        let field = match err {
            BookingError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };
        let proposal = match err {
            BookingError::SlotConflict { proposal } => {
                Some(proposal.as_deref().map(|p| ProposalResponse::new(p, offset)))
            }
            _ => None,
        };

        Self {
            status: status_for(err),
            body: ErrorResponse {
                ok: false,
                error: err.code(),
                message: err.to_string(),
                field,
                proposal,
            },
        }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                ok: false,
                error: "ValidationError",
                message: message.into(),
                field: Some(field.to_string()),
                proposal: None,
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// HTTP status for an error, keyed on its stable code
pub fn status_for(err: &dyn CrewbookErrorTrait) -> StatusCode {
    match err.code() {
        "ValidationError" => StatusCode::BAD_REQUEST,
        "NoAvailability" => StatusCode::UNPROCESSABLE_ENTITY,
        "SlotConflict" => StatusCode::CONFLICT,
        "NotFound" => StatusCode::NOT_FOUND,
        "ServiceUnavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/booking", post(booking))
        .route("/api/crews", get(list_crews))
        .route("/api/crews/{id}/events", get(crew_events))
        .route("/metrics", get(prometheus_metrics))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Propose (`confirm` false) or confirm (`confirm` true) a booking
async fn booking(
    State(state): State<AppState>,
    payload: Result<Json<BookingPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(p) => p,
        Err(rejection) => return ApiError::validation("body", rejection.body_text()).into_response(),
    };

    let offset = state.utc_offset;
    let request = payload.to_request(offset);

    if !payload.confirm {
        return match state.coordinator.propose(&request).await {
            Ok(proposal) => Json(ProposeResponse {
                ok: true,
                proposal: ProposalResponse::new(&proposal, offset),
            })
            .into_response(),
            Err(e) => ApiError::from_booking(&e, offset).into_response(),
        };
    }

    let Some(selection) = payload.selection(offset) else {
        return ApiError::validation("slot", "confirm requires a slot with crewId and start")
            .into_response();
    };

    match state.coordinator.confirm(&request, &selection).await {
        Ok(record) => (
            StatusCode::CREATED,
            Json(ConfirmResponse::new(&record, offset)),
        )
            .into_response(),
        Err(e) => ApiError::from_booking(&e, offset).into_response(),
    }
}

/// Roster in tie-break order
async fn list_crews(State(state): State<AppState>) -> Response {
    match state.coordinator.roster().await {
        Ok(crews) => Json(CrewsResponse {
            ok: true,
            crews: crews.iter().map(CrewResponse::from).collect(),
        })
        .into_response(),
        Err(e) => ApiError::from_booking(&e, state.utc_offset).into_response(),
    }
}

/// One crew's non-cancelled events; defaults to today through the horizon
async fn crew_events(
    State(state): State<AppState>,
    Path(crew_id): Path<String>,
    query: Result<Query<EventsQuery>, QueryRejection>,
) -> Response {
    let offset = state.utc_offset;
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return ApiError::validation("query", rejection.body_text()).into_response(),
    };

    let policy = state.coordinator.policy();
    let from = match query.from {
        Some(t) => from_wire_time(t, offset),
        None => policy.open_at(state.coordinator.now().date()),
    };
    let to = match query.to {
        Some(t) => from_wire_time(t, offset),
        None => from + policy.horizon(),
    };
    if to <= from {
        return ApiError::validation("to", "must be after 'from'").into_response();
    }

    match state.coordinator.crew_events(&crew_id, from, to).await {
        Ok(events) => Json(EventsResponse {
            ok: true,
            crew_id,
            events: events.iter().map(|e| EventResponse::new(e, offset)).collect(),
        })
        .into_response(),
        Err(e) => ApiError::from_booking(&e, offset).into_response(),
    }
}

/// Prometheus text exposition
async fn prometheus_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
