//! CLI command implementations
//!
//! Each command wires the same pieces from [`Config`]: a SQLite store seeded
//! with the configured crews, a geo estimator, and a [`BookingCoordinator`].
//! Commands return the crate-wide [`Result`](crate::Result) so `main` can
//! classify failures.

pub mod crews;
pub mod propose;
pub mod serve;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::config::{Config, NotificationConfig};
use crate::error::Result;
use crate::geo::GeoEstimator;
use crate::notifications::{
    LogChannel, NotificationDispatcher, NotificationGateway, WebhookChannel, WebhookConfig,
};
use crate::scheduler::{BookingCoordinator, SystemClock};
use crate::storage::{CrewRepository, SqliteStore};

// Re-export command functions for convenience
pub use crews::{events, import_crews, list_crews};
pub use propose::{propose, ProposeParams};
pub use serve::serve;

/// Open the configured database and upsert the `[[crews]]` seeds
pub async fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = &config.database.sqlite_path;
    let store = SqliteStore::open(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;

    let seeds = config.seed_crews();
    for crew in &seeds {
        store
            .upsert_crew(crew)
            .await
            .with_context(|| format!("Failed to seed crew '{}'", crew.id))?;
    }
    if !seeds.is_empty() {
        tracing::info!(crews = seeds.len(), "Seeded crews from configuration");
    }

    Ok(store)
}

/// Assemble a coordinator over `store`
pub fn build_coordinator(
    config: &Config,
    store: &SqliteStore,
    notifier: Arc<dyn NotificationGateway>,
) -> Result<BookingCoordinator> {
    let offset = config.scheduling.utc_offset()?;
    let geo = GeoEstimator::from_config(&config.geo);
    tracing::debug!(locations = geo.len(), "Geo estimator ready");

    let coordinator = BookingCoordinator::builder()
        .crews(Arc::new(store.clone()))
        .calendar(Arc::new(store.clone()))
        .travel(Arc::new(geo))
        .notifier(notifier)
        .clock(Arc::new(SystemClock::new(offset)))
        .policy(config.scheduling.search_policy()?)
        .limits(config.scheduling.request_limits())
        .lead_time_minutes(config.scheduling.lead_time_minutes)
        .build()?;

    Ok(coordinator)
}

/// Dispatcher with the channels named in `[notifications]`
pub fn build_dispatcher(config: &NotificationConfig) -> Result<NotificationDispatcher> {
    let mut dispatcher = NotificationDispatcher::new(config.retry_config())
        .with_dead_letter_capacity(config.dead_letter_capacity)
        .with_enqueue_timeout(Duration::from_millis(config.enqueue_timeout_ms));

    if config.log_channel {
        dispatcher.add_channel(Arc::new(LogChannel));
    }

    if let Some(url) = &config.webhook_url {
        let mut webhook = WebhookConfig::new(url).with_timeout(config.webhook_timeout_secs);
        if let Some(token) = &config.webhook_auth_token {
            webhook = webhook.with_auth_token(token);
        }
        let channel = WebhookChannel::new(webhook)?;
        dispatcher.add_channel(Arc::new(channel));
    }

    if dispatcher.channel_count() == 0 {
        tracing::warn!("No notification channels configured; confirmations will not be announced");
    }

    Ok(dispatcher)
}
