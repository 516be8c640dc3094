//! `propose`: one-shot slot search from the command line, optionally booking it

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::api::routes::{from_wire_time, to_wire_time, ProposalResponse};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{BookingRequest, CustomerContact};
use crate::notifications::{NoopGateway, NotificationGateway};

use super::{build_coordinator, build_dispatcher, open_store};

/// Parameters for the propose command
#[derive(Debug, Clone)]
pub struct ProposeParams {
    pub postal_code: String,
    pub duration_minutes: u32,
    pub service_type: String,
    pub earliest_start: Option<DateTime<FixedOffset>>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub notes: Option<String>,
    /// Book the proposed slot immediately
    pub confirm: bool,
}

impl ProposeParams {
    fn to_request(&self, offset: FixedOffset) -> BookingRequest {
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
}

/// Print the best proposal as JSON; with `confirm`, also commit it
pub async fn propose(config: Config, params: ProposeParams) -> Result<()> {
    let offset = config.scheduling.utc_offset()?;
    let store = open_store(&config).await?;

    let mut worker = None;
    let notifier: Arc<dyn NotificationGateway> = if params.confirm {
        let (handle, join) = build_dispatcher(&config.notifications)?
            .spawn(config.notifications.queue_capacity);
        worker = Some(join);
        Arc::new(handle)
    } else {
        Arc::new(NoopGateway)
    };

    let coordinator = build_coordinator(&config, &store, notifier)?;
    let request = params.to_request(offset);

    let proposal = coordinator.propose(&request).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&ProposalResponse::new(&proposal, offset))?
    );

    if params.confirm {
        let record = coordinator.confirm(&request, &proposal.selection()).await?;
        println!();
        println!("Booked {} with {}", record.id, record.crew_name);
        println!("  Start: {}", to_wire_time(record.start, offset).to_rfc3339());
        println!("  End:   {}", to_wire_time(record.end, offset).to_rfc3339());
    }

    // Release the queue so the worker can drain before exit
    drop(coordinator);
    if let Some(worker) = worker {
        let failed = worker
            .await
            .map_err(|e| Error::with_source("Notification worker panicked", e))?;
        if !failed.is_empty() {
            eprintln!("Warning: {} notification(s) could not be delivered", failed.len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrewbookErrorTrait;
    use crate::scheduler::BookingError;

    fn params() -> ProposeParams {
        ProposeParams {
            postal_code: "78701".to_string(),
            duration_minutes: 60,
            service_type: "Service visit".to_string(),
            earliest_start: None,
            name: "Walk-in customer".to_string(),
            email: "dispatch@crewbook.local".to_string(),
            phone: "5125550100".to_string(),
            notes: None,
            confirm: false,
        }
    }

    #[tokio::test]
    async fn test_empty_roster_surfaces_booking_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.sqlite_path = dir.path().join("crewbook.db");

        let err = propose(config, params()).await.unwrap_err();

        assert!(matches!(err, Error::Booking(BookingError::ServiceUnavailable(_))));
        assert_eq!(err.code(), "ServiceUnavailable");
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_invalid_request_is_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.sqlite_path = dir.path().join("crewbook.db");
        let mut params = params();
        params.duration_minutes = 5;

        let err = propose(config, params).await.unwrap_err();
        assert_eq!(err.code(), "ValidationError");
        assert!(!err.is_recoverable());
    }
}
