//! Booking API server

use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderValue;
use axum::Router;
use chrono::FixedOffset;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::scheduler::BookingCoordinator;

use super::config::ServerConfig;
use super::routes::create_router;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Propose/confirm orchestration
    pub coordinator: Arc<BookingCoordinator>,

    /// Business UTC offset for wire timestamps
    pub utc_offset: FixedOffset,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(coordinator: Arc<BookingCoordinator>, utc_offset: FixedOffset) -> Self {
        Self {
            coordinator,
            utc_offset,
            start_time: Instant::now(),
        }
    }
}

/// Build the router with all routes and configured layers
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let mut router = create_router(state);

    if config.enable_cors {
        router = router.layer(cors_layer(&config.allowed_origins));
    }

    if config.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim_end_matches('/')) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring unusable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

// ============================================================================
// Server
// ============================================================================

/// HTTP front end for a [`BookingCoordinator`]
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: AppState) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        Ok(Self { config, state })
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &self.config)
    }

    /// Serve until `shutdown_signal` resolves, then finish in-flight requests
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.router();
        let addr = self.config.bind_address;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!(address = %addr, "Booking API listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Booking API shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Server Errors
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to bind: {0}")]
    Bind(String),

    #[error("Server error: {0}")]
    Serve(String),
}

// ============================================================================
// Tests
// ============================================================================
