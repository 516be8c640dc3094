//! Booking coordinator
//!
//! Orchestrates the two booking operations:
//!
//! - `propose` fans the slot search out across the roster and picks the
//!   earliest start. Read-only, lock-free.
//! - `confirm` re-validates the chosen slot against a fresh calendar read
//!   under a per-crew lock, then hands the insert to the repository, which
//!   re-runs the anchored search through a [`SlotGuard`] inside its own
//!   transaction. The lock only serializes this process; the guard covers
//!   other coordinators sharing the same database.
//!
//! Notification happens after the commit and never affects the result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDateTime};
use futures::future::join_all;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::error::{BookingError, BookingResult};
use super::search::{DepartureRule, SlotGuard, SlotQuery, SlotSearch};
use super::window::SearchPolicy;
use crate::config::ConfigError;
use crate::geo::{GeoEstimator, TravelModel};
use crate::metrics;
use crate::models::{
    BookingRecord, BookingRequest, CalendarEvent, Crew, RequestLimits, SlotProposal,
    SlotSelection,
};
use crate::notifications::{BookingNotice, NoopGateway, NotificationGateway};
use crate::storage::{CalendarRepository, CrewRepository, InsertOutcome};

/// Default lead time when a request has no earliest start
pub const DEFAULT_LEAD_TIME_MINUTES: u32 = 120;

// ============================================================================
// Per-crew locks
// ============================================================================

/// Async mutex per crew id; confirmations for one crew run one at a time
#[derive(Debug, Default)]
pub struct CrewLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CrewLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a crew's calendar
    pub async fn acquire(&self, crew_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(map.entry(crew_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Propose/confirm orchestration over injected repositories
pub struct BookingCoordinator {
    crews: Arc<dyn CrewRepository>,
    calendar: Arc<dyn CalendarRepository>,
    travel: Arc<dyn TravelModel>,
    notifier: Arc<dyn NotificationGateway>,
    clock: Arc<dyn Clock>,
    policy: SearchPolicy,
    limits: RequestLimits,
    lead_time: Duration,
    locks: CrewLocks,
}

impl BookingCoordinator {
    pub fn builder() -> BookingCoordinatorBuilder {
        BookingCoordinatorBuilder::default()
    }

    pub fn policy(&self) -> &SearchPolicy {
        &self.policy
    }

    /// Current local wall-clock time
    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Earliest feasible slot across all crews
    #[instrument(skip(self, request), fields(location = %request.location_code, duration = request.duration_minutes))]
    pub async fn propose(&self, request: &BookingRequest) -> BookingResult<SlotProposal> {
        let result = self.propose_inner(request).await;
        metrics::record_proposal(match &result {
            Ok(_) => "found",
            Err(BookingError::NoAvailability) => "no_availability",
            Err(BookingError::Validation { .. }) => "invalid",
            Err(_) => "error",
        });
        result
    }

    async fn propose_inner(&self, request: &BookingRequest) -> BookingResult<SlotProposal> {
        request.validate(&self.limits)?;
        let not_before = self.resolve_not_before(request)?;
        let location = request.location();

        let crews = self.roster().await?;
        if crews.is_empty() {
            return Err(BookingError::unavailable("crew roster is empty"));
        }

        let (from, to) = self.event_window(not_before);
        let reads = crews
            .iter()
            .map(|crew| self.calendar.events_for_crew(&crew.id, from, to));
        let calendars = join_all(reads).await;

        let search = SlotSearch::new(&self.policy, self.travel.as_ref());
        let query = SlotQuery::new(request.duration_minutes, &location, not_before);

        let mut best: Option<SlotProposal> = None;
        for (crew, events) in crews.iter().zip(calendars) {
            let events = events.map_err(|e| storage_failure("read calendar", &e))?;
            let outcome = search.search(crew, &events, &query);
            metrics::record_search_iterations(outcome.iterations);

            debug!(
                crew_id = %crew.id,
                iterations = outcome.iterations,
                start = ?outcome.proposal.as_ref().map(|p| p.start),
                "Crew search finished"
            );

            if let Some(proposal) = outcome.proposal {
                // strict comparison keeps the earlier roster entry on ties
                if best.as_ref().map_or(true, |b| proposal.start < b.start) {
                    best = Some(proposal);
                }
            }
        }

        match best {
            Some(proposal) => {
                info!(
                    crew_id = %proposal.crew_id,
                    start = %proposal.start,
                    end = %proposal.end,
                    "Proposed slot"
                );
                Ok(proposal)
            }
            None => {
                info!(crews = crews.len(), "No crew available within horizon");
                Err(BookingError::NoAvailability)
            }
        }
    }

    /// Re-validate and commit the chosen slot
    #[instrument(skip(self, request, selection), fields(crew_id = %selection.crew_id, start = %selection.start))]
    pub async fn confirm(
        &self,
        request: &BookingRequest,
        selection: &SlotSelection,
    ) -> BookingResult<BookingRecord> {
        let result = self.confirm_inner(request, selection).await;
        metrics::record_confirmation(match &result {
            Ok(_) => "booked",
            Err(BookingError::SlotConflict { .. }) => "conflict",
            Err(BookingError::Validation { .. }) => "invalid",
            Err(BookingError::NotFound { .. }) => "not_found",
            Err(_) => "error",
        });
        result
    }

    async fn confirm_inner(
        &self,
        request: &BookingRequest,
        selection: &SlotSelection,
    ) -> BookingResult<BookingRecord> {
        request.validate(&self.limits)?;
        if let Some(earliest) = request.earliest_start {
            if selection.start < earliest {
                return Err(BookingError::validation(
                    "slot.start",
                    "must not be before earliestStart",
                ));
            }
        }

        let crew = self
            .crews
            .get_crew(&selection.crew_id)
            .await
            .map_err(|e| storage_failure("load crew", &e))?
            .ok_or_else(|| BookingError::not_found(&selection.crew_id))?;

        if selection.start < self.clock.now() {
            info!(start = %selection.start, "Selected slot is in the past");
            return Err(self.conflict_with_alternative(request).await);
        }

        let location = request.location();
        let guard = self.locks.acquire(&crew.id).await;

        let fresh = self.revalidate(&crew, request, &location, selection).await?;
        let Some(proposal) = fresh else {
            drop(guard);
            return Err(self.conflict_with_alternative(request).await);
        };

        let record = BookingRecord::new(&proposal, request);
        let event = CalendarEvent::for_booking(&proposal, &location, &record.id);

        let slot_guard = SlotGuard::new(crew.clone(), self.policy.clone(), Arc::clone(&self.travel));
        let outcome = self
            .calendar
            .insert_booking_guarded(&event, &record, Arc::new(slot_guard))
            .await
            .map_err(|e| storage_failure("insert booking", &e))?;
        drop(guard);

        if outcome == InsertOutcome::Conflict {
            warn!(crew_id = %crew.id, start = %proposal.start, "Storage rejected booking against committed calendar");
            return Err(self.conflict_with_alternative(request).await);
        }

        info!(
            booking_id = %record.id,
            crew_id = %crew.id,
            start = %record.start,
            end = %record.end,
            "Booking confirmed"
        );

        let notice = BookingNotice::new(record.clone(), &crew);
        if let Err(e) = self.notifier.enqueue(notice).await {
            warn!(booking_id = %record.id, error = %e, "Failed to queue booking notification");
        }

        Ok(record)
    }

    /// Fresh search anchored at the selected start; `Some` only if it matches
    async fn revalidate(
        &self,
        crew: &Crew,
        request: &BookingRequest,
        location: &str,
        selection: &SlotSelection,
    ) -> BookingResult<Option<SlotProposal>> {
        let (from, to) = self.event_window(selection.start);
        let events = self
            .calendar
            .events_for_crew(&crew.id, from, to)
            .await
            .map_err(|e| storage_failure("read calendar", &e))?;

        let search = SlotSearch::new(&self.policy, self.travel.as_ref());
        let query = SlotQuery::new(request.duration_minutes, location, selection.start)
            .with_departure(DepartureRule::WorkdayOpen);

        match search.find_slot(crew, &events, &query) {
            Some(proposal) if proposal.start == selection.start => Ok(Some(proposal)),
            other => {
                info!(
                    requested = %selection.start,
                    earliest = ?other.map(|p| p.start),
                    "Selected slot failed re-validation"
                );
                Ok(None)
            }
        }
    }

    /// Conflict carrying a fresh proposal for the same request, if any
    async fn conflict_with_alternative(&self, request: &BookingRequest) -> BookingError {
        match self.propose_inner(request).await {
            Ok(proposal) => BookingError::conflict(Some(proposal)),
            Err(BookingError::NoAvailability) => BookingError::conflict(None),
            Err(e) => {
                warn!(error = %e, "Could not compute an alternative slot");
                BookingError::conflict(None)
            }
        }
    }

    /// Crews in roster order
    pub async fn roster(&self) -> BookingResult<Vec<Crew>> {
        self.crews
            .list_crews()
            .await
            .map_err(|e| storage_failure("list crews", &e))
    }

    /// Non-cancelled events for one crew overlapping `[from, to)`
    pub async fn crew_events(
        &self,
        crew_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> BookingResult<Vec<CalendarEvent>> {
        let exists = self
            .crews
            .get_crew(crew_id)
            .await
            .map_err(|e| storage_failure("load crew", &e))?;
        if exists.is_none() {
            return Err(BookingError::not_found(crew_id));
        }

        self.calendar
            .events_for_crew(crew_id, from, to)
            .await
            .map_err(|e| storage_failure("read calendar", &e))
    }

    fn resolve_not_before(&self, request: &BookingRequest) -> BookingResult<NaiveDateTime> {
        let now = self.clock.now();
        match request.earliest_start {
            Some(earliest) if earliest > now + self.policy.horizon() => Err(BookingError::validation(
                "earliestStart",
                format!("must be within {} days from now", self.policy.horizon_days),
            )),
            Some(earliest) => Ok(earliest.max(now)),
            None => Ok(now + self.lead_time),
        }
    }

    /// Calendar read window around a search anchor
    fn event_window(&self, anchor: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        let day = Duration::days(1);
        (anchor - day, anchor + self.policy.horizon() + day)
    }
}

fn storage_failure(operation: &str, err: &anyhow::Error) -> BookingError {
    error!(operation = operation, error = %format!("{err:#}"), "Storage failure");
    BookingError::unavailable(format!("storage unavailable during {operation}"))
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`BookingCoordinator`]
#[derive(Default)]
pub struct BookingCoordinatorBuilder {
    crews: Option<Arc<dyn CrewRepository>>,
    calendar: Option<Arc<dyn CalendarRepository>>,
    travel: Option<Arc<dyn TravelModel>>,
    notifier: Option<Arc<dyn NotificationGateway>>,
    clock: Option<Arc<dyn Clock>>,
    policy: Option<SearchPolicy>,
    limits: Option<RequestLimits>,
    lead_time_minutes: Option<u32>,
}

impl BookingCoordinatorBuilder {
    pub fn crews(mut self, crews: Arc<dyn CrewRepository>) -> Self {
        self.crews = Some(crews);
        self
    }

    pub fn calendar(mut self, calendar: Arc<dyn CalendarRepository>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn travel(mut self, travel: Arc<dyn TravelModel>) -> Self {
        self.travel = Some(travel);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationGateway>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn policy(mut self, policy: SearchPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn limits(mut self, limits: RequestLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn lead_time_minutes(mut self, minutes: u32) -> Self {
        self.lead_time_minutes = Some(minutes);
        self
    }

    /// Build the coordinator; repositories are required
    pub fn build(self) -> Result<BookingCoordinator, ConfigError> {
        let crews = self.crews.ok_or(ConfigError::MissingField("crews"))?;
        let calendar = self.calendar.ok_or(ConfigError::MissingField("calendar"))?;

        Ok(BookingCoordinator {
            crews,
            calendar,
            travel: self
                .travel
                .unwrap_or_else(|| Arc::new(GeoEstimator::default())),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(NoopGateway)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::utc())),
            policy: self.policy.unwrap_or_default(),
            limits: self.limits.unwrap_or_default(),
            lead_time: Duration::minutes(i64::from(
                self.lead_time_minutes.unwrap_or(DEFAULT_LEAD_TIME_MINUTES),
            )),
            locks: CrewLocks::new(),
        })
    }
}
