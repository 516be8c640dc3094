//! Earliest-feasible-slot search for a single crew
//!
//! A forward interval scan over one crew's calendar. Each iteration either
//! accepts the candidate or jumps it past a known-infeasible region, so the
//! work is bounded by the number of events and working days in the horizon,
//! never by the number of grid minutes.
//!
//! ```text
//!   prior event          candidate job                 next event
//! ├────────┤ after ─ travel ─ before ├═══════┤ after ─ travel ─ before ├────────┤
//!          └──── inbound bound ─────┘       └──────── ceiling ────────┘
//! ```

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use tracing::{debug, trace, warn};

use super::window::SearchPolicy;
use crate::geo::{TravelEstimate, TravelModel};
use crate::models::{CalendarEvent, Crew, SlotProposal};
use crate::storage::InsertGuard;

// ============================================================================
// Query
// ============================================================================

/// Where the crew starts its day when nothing precedes the candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepartureRule {
    /// Depart home at `max(open, not_before)` on the first searched day
    #[default]
    NotBefore,
    /// Depart home at workday open every day
    WorkdayOpen,
}

/// One slot search for one crew
#[derive(Debug, Clone)]
pub struct SlotQuery<'a> {
    pub duration_minutes: u32,
    /// Normalized target location code
    pub location: &'a str,
    pub not_before: NaiveDateTime,
    pub departure: DepartureRule,
}

impl<'a> SlotQuery<'a> {
    pub fn new(duration_minutes: u32, location: &'a str, not_before: NaiveDateTime) -> Self {
        Self {
            duration_minutes,
            location,
            not_before,
            departure: DepartureRule::NotBefore,
        }
    }

    pub fn with_departure(mut self, departure: DepartureRule) -> Self {
        self.departure = departure;
        self
    }
}

/// Result of a search with its iteration count
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub proposal: Option<SlotProposal>,
    pub iterations: usize,
}

// ============================================================================
// Search
// ============================================================================

/// Stateless slot search over a policy and a travel model
pub struct SlotSearch<'a> {
    policy: &'a SearchPolicy,
    travel: &'a dyn TravelModel,
}

impl<'a> SlotSearch<'a> {
    pub fn new(policy: &'a SearchPolicy, travel: &'a dyn TravelModel) -> Self {
        Self { policy, travel }
    }

    /// Earliest feasible slot for `crew`, or `None` within the horizon
    pub fn find_slot(
        &self,
        crew: &Crew,
        events: &[CalendarEvent],
        query: &SlotQuery<'_>,
    ) -> Option<SlotProposal> {
        self.search(crew, events, query).proposal
    }

    /// Run the scan and report how many iterations it took
    pub fn search(
        &self,
        crew: &Crew,
        events: &[CalendarEvent],
        query: &SlotQuery<'_>,
    ) -> SearchOutcome {
        let policy = self.policy;
        let horizon = query.not_before + policy.horizon();
        let first_day = query.not_before.date();
        let duration = Duration::minutes(i64::from(query.duration_minutes));
        let buffer_before = minutes(crew.buffer_before_minutes);
        let buffer_after = minutes(crew.buffer_after_minutes);
        let active: Vec<&CalendarEvent> = events.iter().filter(|e| e.is_active()).collect();

        let mut candidate = policy.align(query.not_before);
        let mut iterations = 0;

        while iterations < policy.max_iterations {
            iterations += 1;
            if candidate > horizon {
                return SearchOutcome {
                    proposal: None,
                    iterations,
                };
            }

            let day = candidate.date();
            let day_start = day.and_time(NaiveTime::MIN);

            // Inbound leg: from the prior event or from home
            let prior = active
                .iter()
                .filter(|e| e.start <= candidate && e.end >= day_start)
                .max_by_key(|e| e.end);
            let (origin, ready_at) = match prior {
                Some(event) => (event.location_code.as_str(), event.end + event.buffer_after(crew)),
                None => {
                    let open = policy.open_at(day);
                    let depart = match query.departure {
                        DepartureRule::NotBefore if day == first_day => open.max(query.not_before),
                        _ => open,
                    };
                    (crew.home_base.as_str(), depart)
                }
            };
            let inbound = self.travel.estimate(origin, query.location);
            let earliest = ready_at + minutes(inbound.minutes) + buffer_before;
            if candidate < earliest {
                trace!(crew_id = %crew.id, %candidate, %earliest, "Jumping to inbound bound");
                candidate = policy.align(earliest);
                continue;
            }

            // Outbound leg: to the next event today or back home
            let next = active
                .iter()
                .filter(|e| e.start > candidate && e.start.date() == day)
                .min_by_key(|e| e.start);
            let destination = next.map_or(crew.home_base.as_str(), |e| e.location_code.as_str());
            let outbound = self.travel.estimate(query.location, destination);

            let close = policy.close_at(day);
            let event_ceiling =
                next.map(|e| e.start - e.buffer_before(crew) - minutes(outbound.minutes));
            let ceiling = event_ceiling.map_or(close, |c| c.min(close));
            let job_end = candidate + duration;

            if job_end + buffer_after <= ceiling {
                return SearchOutcome {
                    proposal: Some(self.proposal(crew, candidate, job_end, inbound, outbound)),
                    iterations,
                };
            }

            candidate = match (next, event_ceiling) {
                (Some(event), Some(limit)) if limit < close => {
                    trace!(crew_id = %crew.id, %candidate, blocker = %event.id, "Jumping past next event");
                    policy.align(event.end)
                }
                _ => policy.next_working_open(day),
            };
        }

        warn!(
            crew_id = %crew.id,
            iterations = iterations,
            "Slot search hit the iteration cap"
        );
        SearchOutcome {
            proposal: None,
            iterations,
        }
    }

    fn proposal(
        &self,
        crew: &Crew,
        start: NaiveDateTime,
        end: NaiveDateTime,
        inbound: TravelEstimate,
        outbound: TravelEstimate,
    ) -> SlotProposal {
        SlotProposal {
            crew_id: crew.id.clone(),
            crew_name: crew.name.clone(),
            start,
            end,
            travel_minutes_from_previous: inbound.minutes,
            travel_minutes_to_next: outbound.minutes,
            travel_miles: inbound.miles,
            buffer_before_minutes: crew.buffer_before_minutes,
            buffer_after_minutes: crew.buffer_after_minutes,
        }
    }
}

// ============================================================================
// Commit-time guard
// ============================================================================

/// Anchored search re-run by the store against its own view of the calendar
///
/// Admits a booked event only if a search anchored at its start, departing
/// home at workday open, still lands exactly on that start. This holds the
/// buffer and travel gaps to both neighbours even when another process
/// committed between our calendar read and the insert.
pub struct SlotGuard {
    crew: Crew,
    policy: SearchPolicy,
    travel: Arc<dyn TravelModel>,
}

impl SlotGuard {
    pub fn new(crew: Crew, policy: SearchPolicy, travel: Arc<dyn TravelModel>) -> Self {
        Self {
            crew,
            policy,
            travel,
        }
    }
}

impl InsertGuard for SlotGuard {
    fn window(&self, event: &CalendarEvent) -> (NaiveDateTime, NaiveDateTime) {
        let day_start = event.start.date().and_time(NaiveTime::MIN);
        (day_start - Duration::days(1), day_start + Duration::days(1))
    }

    fn admits(&self, event: &CalendarEvent, existing: &[CalendarEvent]) -> bool {
        let Ok(duration) = u32::try_from((event.end - event.start).num_minutes()) else {
            return false;
        };
        let query = SlotQuery::new(duration, &event.location_code, event.start)
            .with_departure(DepartureRule::WorkdayOpen);
        let found = SlotSearch::new(&self.policy, self.travel.as_ref())
            .find_slot(&self.crew, existing, &query)
            .map(|p| p.start);

        let admitted = found == Some(event.start);
        if !admitted {
            debug!(crew_id = %self.crew.id, start = %event.start, earliest = ?found, "Guard refused booking");
        }
        admitted
    }
}

fn minutes(m: u32) -> Duration {
    Duration::minutes(i64::from(m))
}
