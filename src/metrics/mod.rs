//! Prometheus metrics for crewbook
//!
//! This module provides metrics tracking for:
//! - Booking: proposals and confirmations by outcome, slot search effort
//! - Notifications: deliveries per channel, exhausted retries, dead letters
//! - HTTP API: requests by endpoint and status, request latency
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Encoder,
    Histogram, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for scheduling metrics
struct BookingMetrics {
    proposals: CounterVec,
    confirmations: CounterVec,
    search_iterations: Histogram,
    notifications: CounterVec,
    dead_letters: CounterVec,
}

/// Container for HTTP API metrics
struct ApiMetrics {
    requests: CounterVec,
    duration: HistogramVec,
}

static BOOKING_METRICS: OnceLock<BookingMetrics> = OnceLock::new();

static API_METRICS: OnceLock<ApiMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Should be called once at application startup. If registration fails,
/// subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = crewbook::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let booking = BookingMetrics {
        proposals: register_counter_vec!(
            "crewbook_proposals_total",
            "Total slot proposals by outcome",
            &["outcome"]
        )?,
        confirmations: register_counter_vec!(
            "crewbook_confirmations_total",
            "Total booking confirmations by outcome",
            &["outcome"]
        )?,
        search_iterations: register_histogram!(
            "crewbook_slot_search_iterations",
            "Candidate positions examined per crew slot search",
            vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0, 4096.0]
        )?,
        notifications: register_counter_vec!(
            "crewbook_notifications_total",
            "Booking notifications by channel and outcome",
            &["channel", "outcome"]
        )?,
        dead_letters: register_counter_vec!(
            "crewbook_dead_letters_total",
            "Dead-lettered notices by event (recorded, evicted)",
            &["event"]
        )?,
    };

    let api = ApiMetrics {
        requests: register_counter_vec!(
            "crewbook_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        duration: register_histogram_vec!(
            "crewbook_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
        )?,
    };

    BOOKING_METRICS
        .set(booking)
        .map_err(|_| "Booking metrics already initialized")?;
    API_METRICS
        .set(api)
        .map_err(|_| "API metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    BOOKING_METRICS.get().is_some() && API_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a proposal outcome (`found`, `no_availability`, `invalid`, `error`)
pub fn record_proposal(outcome: &str) {
    if let Some(m) = BOOKING_METRICS.get() {
        m.proposals.with_label_values(&[outcome]).inc();
    }
}

/// Record a confirmation outcome (`booked`, `conflict`, `not_found`, `invalid`, `error`)
pub fn record_confirmation(outcome: &str) {
    if let Some(m) = BOOKING_METRICS.get() {
        m.confirmations.with_label_values(&[outcome]).inc();
    }
}

/// Record how many candidates one crew search examined
pub fn record_search_iterations(iterations: usize) {
    if let Some(m) = BOOKING_METRICS.get() {
        m.search_iterations.observe(iterations as f64);
    }
}

/// Record a notification delivery result for one channel
pub fn record_notification(channel: &str, delivered: bool) {
    let Some(m) = BOOKING_METRICS.get() else {
        return;
    };

    let outcome = if delivered { "delivered" } else { "exhausted" };
    m.notifications.with_label_values(&[channel, outcome]).inc();
}

/// Record a notice landing in the dead-letter log
pub fn record_dead_letter() {
    if let Some(m) = BOOKING_METRICS.get() {
        m.dead_letters.with_label_values(&["recorded"]).inc();
    }
}

/// Record the oldest dead letter being dropped to make room
pub fn record_dead_letter_evicted() {
    if let Some(m) = BOOKING_METRICS.get() {
        m.dead_letters.with_label_values(&["evicted"]).inc();
    }
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = API_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.requests
        .with_label_values(&[endpoint, status_str.as_str()])
        .inc();
    m.duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

// ============================================================================
// Tests
// ============================================================================
