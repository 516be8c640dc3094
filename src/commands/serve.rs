//! `serve`: run the booking API

use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::{ApiServer, AppState};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics;

use super::{build_coordinator, build_dispatcher, open_store};

/// Start the HTTP server and the notification worker; stop on Ctrl+C
pub async fn serve(mut config: Config, bind: Option<SocketAddr>) -> Result<()> {
    if let Some(addr) = bind {
        config.server.bind_address = addr;
    }

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed; continuing without metrics");
    }

    let store = open_store(&config).await?;
    let (notifier, worker) = build_dispatcher(&config.notifications)?
        .spawn(config.notifications.queue_capacity);

    let coordinator = build_coordinator(&config, &store, Arc::new(notifier))?;
    let offset = config.scheduling.utc_offset()?;
    let crews = coordinator.roster().await?;
    if crews.is_empty() {
        tracing::warn!("Roster is empty; every proposal will be rejected until crews are imported");
    }

    let state = AppState::new(Arc::new(coordinator), offset);
    let server = ApiServer::new(config.server.clone(), state)?;

    println!("Starting crewbook API");
    println!("=====================");
    println!("  Bind Address: {}", config.server.bind_address);
    println!("  Database: {}", config.database.sqlite_path.display());
    println!("  Crews: {}", crews.len());
    println!("  UTC Offset: {offset}");
    println!();
    println!("API Endpoints:");
    println!("  POST /api/booking             - Propose or confirm a booking");
    println!("  GET  /api/health              - Health check");
    println!("  GET  /api/crews               - Crew roster");
    println!("  GET  /api/crews/{{id}}/events   - Crew calendar");
    println!("  GET  /metrics                 - Prometheus metrics endpoint");
    println!();

    server
        .start_with_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                }
                Err(e) => {
                    tracing::error!("Failed to wait for Ctrl+C: {}", e);
                }
            }
        })
        .await?;

    // The server owns the last queue sender
    drop(server);
    let failed = worker
        .await
        .map_err(|e| Error::with_source("Notification worker panicked", e))?;

    if !failed.is_empty() {
        tracing::warn!(count = failed.len(), "Notifications left undelivered at shutdown");
    }

    println!("crewbook API stopped.");
    Ok(())
}
