//! HTTP API for booking
//!
//! # Endpoints
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | POST | `/api/booking` | propose (`confirm: false`) or confirm a slot |
//! | GET | `/api/health` | liveness, version, uptime |
//! | GET | `/api/crews` | roster in tie-break order |
//! | GET | `/api/crews/{id}/events` | one crew's active events |
//! | GET | `/metrics` | Prometheus exposition |

pub mod config;
pub mod routes;
pub mod server;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use routes::{create_router, ApiError, BookingPayload};
pub use server::{build_router, ApiServer, AppState, ServerError};
