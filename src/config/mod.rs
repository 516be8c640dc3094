//! Configuration management for crewbook
//!
//! Configuration is loaded from a TOML file (or defaults), then overridden
//! from `CREWBOOK_*` environment variables, then validated.
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0:8080"
//!
//! [scheduling]
//! utc_offset_minutes = -360
//! workday_open = "08:00"
//! workday_close = "18:00"
//!
//! [[geo.locations]]
//! code = "78701"
//! lat = 30.2711
//! lon = -97.7437
//!
//! [[crews]]
//! id = "alpha"
//! name = "Alpha Crew"
//! home_base = "78701"
//! ```

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::api::ServerConfig;
use crate::geo::{DEFAULT_MINIMUM_TRAVEL_MINUTES, DEFAULT_SPEED_MPH};
use crate::models::{Crew, RequestLimits};
use crate::scheduler::SearchPolicy;
use crate::utils::retry::RetryConfig;

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Working hours, grid and horizon
    pub scheduling: SchedulingConfig,

    /// Location table and travel model
    pub geo: GeoConfig,

    /// Booking confirmation delivery
    pub notifications: NotificationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Crews to seed with `import-crews`, in roster order
    pub crews: Vec<CrewSeed>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/crewbook.db"),
        }
    }
}

/// Scheduling policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Business local time relative to UTC
    pub utc_offset_minutes: i32,

    /// Workday open, `HH:MM`
    pub workday_open: String,

    /// Workday close, `HH:MM`
    pub workday_close: String,

    /// Candidate start granularity
    pub grid_minutes: u32,

    /// Three-letter weekday names (`mon`..`sun`)
    pub working_days: Vec<String>,

    /// Search horizon in days
    pub horizon_days: u32,

    /// Hard cap on search iterations per crew
    pub max_search_iterations: usize,

    /// Default earliest start offset from now
    pub lead_time_minutes: u32,

    /// Job duration bounds
    pub min_duration_minutes: u32,
    pub max_duration_minutes: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            workday_open: "08:00".to_string(),
            workday_close: "18:00".to_string(),
            grid_minutes: 15,
            working_days: ["mon", "tue", "wed", "thu", "fri", "sat"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            horizon_days: 14,
            max_search_iterations: 4096,
            lead_time_minutes: 120,
            min_duration_minutes: 30,
            max_duration_minutes: 480,
        }
    }
}

impl SchedulingConfig {
    /// Fixed offset of the business's wall clock
    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
            ConfigError::invalid("scheduling.utc_offset_minutes", "must be within ±24h")
        })
    }

    /// Build the search policy, validating every field
    pub fn search_policy(&self) -> Result<SearchPolicy, ConfigError> {
        if self.grid_minutes == 0 || self.grid_minutes > 60 || 60 % self.grid_minutes != 0 {
            return Err(ConfigError::invalid(
                "scheduling.grid_minutes",
                "must divide 60 and be between 1 and 60",
            ));
        }

        let day_open = parse_clock("scheduling.workday_open", &self.workday_open)?;
        let day_close = parse_clock("scheduling.workday_close", &self.workday_close)?;
        if day_open >= day_close {
            return Err(ConfigError::invalid(
                "scheduling.workday_open",
                "must be before workday_close",
            ));
        }
        if day_open.num_seconds_from_midnight() % (self.grid_minutes * 60) != 0 {
            return Err(ConfigError::invalid(
                "scheduling.workday_open",
                format!("must be aligned to the {}-minute grid", self.grid_minutes),
            ));
        }

        let mut working_days = Vec::new();
        for name in &self.working_days {
            let day = name.parse::<Weekday>().map_err(|_| {
                ConfigError::invalid("scheduling.working_days", format!("unknown weekday '{name}'"))
            })?;
            if !working_days.contains(&day) {
                working_days.push(day);
            }
        }
        if working_days.is_empty() {
            return Err(ConfigError::invalid(
                "scheduling.working_days",
                "at least one working day is required",
            ));
        }

        if !(1..=60).contains(&self.horizon_days) {
            return Err(ConfigError::invalid(
                "scheduling.horizon_days",
                "must be between 1 and 60",
            ));
        }
        if self.max_search_iterations == 0 {
            return Err(ConfigError::invalid(
                "scheduling.max_search_iterations",
                "must be positive",
            ));
        }

        Ok(SearchPolicy {
            grid_minutes: self.grid_minutes,
            day_open,
            day_close,
            working_days,
            horizon_days: self.horizon_days,
            max_iterations: self.max_search_iterations,
        })
    }

    /// Request bounds for validation
    pub fn request_limits(&self) -> RequestLimits {
        RequestLimits {
            min_duration_minutes: self.min_duration_minutes,
            max_duration_minutes: self.max_duration_minutes,
            ..RequestLimits::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.utc_offset()?;
        self.search_policy()?;
        if self.min_duration_minutes == 0 || self.min_duration_minutes > self.max_duration_minutes {
            return Err(ConfigError::invalid(
                "scheduling.min_duration_minutes",
                "must be positive and not exceed max_duration_minutes",
            ));
        }
        Ok(())
    }
}

fn parse_clock(field: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ConfigError::invalid(field, format!("expected HH:MM, got '{value}'")))
}


/// One entry of the postal code table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub code: String,
    pub lat: f64,
    pub lon: f64,
}

/// Geo lookup and travel model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub average_speed_mph: f64,
    pub minimum_travel_minutes: u32,
    /// Coordinates used when a code cannot be resolved
    pub default_lat: f64,
    pub default_lon: f64,
    pub locations: Vec<LocationEntry>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            average_speed_mph: DEFAULT_SPEED_MPH,
            minimum_travel_minutes: DEFAULT_MINIMUM_TRAVEL_MINUTES,
            default_lat: 30.2672,
            default_lon: -97.7431,
            locations: Vec::new(),
        }
    }
}

impl GeoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.average_speed_mph.is_nan() || self.average_speed_mph <= 0.0 {
            return Err(ConfigError::invalid("geo.average_speed_mph", "must be positive"));
        }
        let in_range = |lat: f64, lon: f64| (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon);
        if !in_range(self.default_lat, self.default_lon) {
            return Err(ConfigError::invalid("geo.default_lat", "coordinates out of range"));
        }
        for entry in &self.locations {
            if !in_range(entry.lat, entry.lon) {
                return Err(ConfigError::invalid(
                    "geo.locations",
                    format!("coordinates out of range for '{}'", entry.code),
                ));
            }
        }
        Ok(())
    }
}

/// Notification delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Webhook receiving booking confirmations (disabled when unset)
    pub webhook_url: Option<String>,

    /// Bearer token sent to the webhook
    pub webhook_auth_token: Option<String>,

    pub webhook_timeout_secs: u64,

    /// Log every confirmation through `tracing`
    pub log_channel: bool,

    /// Bounded queue between the booking path and the dispatcher
    pub queue_capacity: usize,

    /// How long a confirmation waits for queue room before dead-lettering
    pub enqueue_timeout_ms: u64,

    /// Most recent undeliverable notices kept for inspection
    pub dead_letter_capacity: usize,

    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_auth_token: None,
            webhook_timeout_secs: 10,
            log_channel: true,
            queue_capacity: 256,
            enqueue_timeout_ms: 2000,
            dead_letter_capacity: 256,
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
        }
    }
}

impl NotificationConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(self.max_retries, self.base_delay_ms, self.max_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid("notifications.queue_capacity", "must be positive"));
        }
        if self.dead_letter_capacity == 0 {
            return Err(ConfigError::invalid(
                "notifications.dead_letter_capacity",
                "must be positive",
            ));
        }
        if let Some(url) = &self.webhook_url {
            url::Url::parse(url).map_err(|e| {
                ConfigError::invalid("notifications.webhook_url", format!("invalid URL: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Crew entry in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewSeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub home_base: String,
    #[serde(default)]
    pub buffer_before_minutes: u32,
    #[serde(default)]
    pub buffer_after_minutes: u32,
}

impl CrewSeed {
    /// Convert to a crew at the given roster position
    pub fn to_crew(&self, roster_order: i64) -> Crew {
        Crew::new(self.id.trim(), self.name.trim(), &self.home_base)
            .with_contact(self.email.clone(), self.phone.clone())
            .with_buffers(self.buffer_before_minutes, self.buffer_after_minutes)
            .with_roster_order(roster_order)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from a file when given, otherwise defaults; then apply env and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `CREWBOOK_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(bind) = std::env::var("CREWBOOK_BIND") {
            self.server.bind_address = bind
                .parse()
                .map_err(|_| ConfigError::invalid("CREWBOOK_BIND", format!("invalid address: {bind}")))?;
        }

        if let Ok(path) = std::env::var("CREWBOOK_DB_PATH") {
            self.database.sqlite_path = PathBuf::from(path);
        }

        if let Ok(url) = std::env::var("CREWBOOK_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(url).filter(|u| !u.trim().is_empty());
        }

        if let Ok(level) = std::env::var("CREWBOOK_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = std::env::var("CREWBOOK_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Ok(offset) = std::env::var("CREWBOOK_UTC_OFFSET_MINUTES") {
            self.scheduling.utc_offset_minutes = offset.trim().parse().map_err(|_| {
                ConfigError::invalid("CREWBOOK_UTC_OFFSET_MINUTES", format!("not an integer: {offset}"))
            })?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.scheduling.validate()?;
        self.geo.validate()?;
        self.notifications.validate()?;

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::invalid("logging.format", "must be 'text' or 'json'"));
        }

        let mut seen = std::collections::HashSet::new();
        for seed in &self.crews {
            if seed.id.trim().is_empty() || !seen.insert(seed.id.trim()) {
                return Err(ConfigError::invalid(
                    "crews",
                    format!("crew ids must be unique and non-empty ('{}')", seed.id),
                ));
            }
        }

        Ok(())
    }

    /// Crews from `[[crews]]` in roster order
    pub fn seed_crews(&self) -> Vec<Crew> {
        self.crews
            .iter()
            .enumerate()
            .map(|(i, seed)| seed.to_crew(i as i64))
            .collect()
    }
}
