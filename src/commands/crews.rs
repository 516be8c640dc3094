//! Roster commands: `crews`, `events`, `import-crews`

use std::path::Path;

use chrono::Duration;
use serde::Deserialize;

use crate::api::routes::to_wire_time;
use crate::config::{Config, ConfigError, CrewSeed};
use crate::error::{Error, Result};
use crate::scheduler::BookingError;
use crate::storage::{CalendarRepository, CrewRepository};

use super::open_store;

/// Print the roster in tie-break order
pub async fn list_crews(config: Config) -> Result<()> {
    let store = open_store(&config).await?;
    let crews = store.list_crews().await?;

    if crews.is_empty() {
        println!("No crews configured.");
        return Ok(());
    }

    println!("{:<4} {:<16} {:<24} {:<10} {:>7}", "#", "ID", "NAME", "HOME", "BUFFERS");
    for crew in &crews {
        println!(
            "{:<4} {:<16} {:<24} {:<10} {:>3}/{:<3}",
            crew.roster_order,
            crew.id,
            crew.name,
            crew.home_base,
            crew.buffer_before_minutes,
            crew.buffer_after_minutes
        );
    }
    Ok(())
}

/// Print one crew's active events for the next `days` days
pub async fn events(config: Config, crew_id: &str, days: u32) -> Result<()> {
    let offset = config.scheduling.utc_offset()?;
    let store = open_store(&config).await?;

    if store.get_crew(crew_id).await?.is_none() {
        return Err(BookingError::not_found(crew_id).into());
    }

    let today = chrono::Utc::now().with_timezone(&offset).date_naive();
    let from = today.and_time(chrono::NaiveTime::MIN);
    let to = from + Duration::days(i64::from(days.max(1)));

    let events = store.events_for_crew(crew_id, from, to).await?;
    if events.is_empty() {
        println!("No events for {crew_id} in the next {days} day(s).");
        return Ok(());
    }

    for event in &events {
        println!(
            "{}  {}  {:<10} {:<9} {}",
            to_wire_time(event.start, offset).to_rfc3339(),
            to_wire_time(event.end, offset).format("%H:%M"),
            event.location_code,
            event.status,
            event.booking_id.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CrewFile {
    #[serde(default)]
    crews: Vec<CrewSeed>,
}

/// Upsert crews from a TOML file with `[[crews]]` tables
///
/// Crews already on the roster keep their position; new ones are appended.
pub async fn import_crews(config: Config, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file).map_err(|e| {
        Error::with_source(format!("Failed to read crew file: {}", file.display()), e)
    })?;
    let parsed: CrewFile = toml::from_str(&content).map_err(|e| {
        Error::with_source(format!("Failed to parse crew file: {}", file.display()), e)
    })?;

    if parsed.crews.is_empty() {
        return Err(ConfigError::MissingField("crews").into());
    }

    let store = open_store(&config).await?;
    let existing = store.list_crews().await?;
    let mut next_order = existing.iter().map(|c| c.roster_order).max().map_or(0, |m| m + 1);

    let mut added = 0usize;
    let mut updated = 0usize;
    for seed in &parsed.crews {
        if seed.id.trim().is_empty() {
            return Err(Error::other(format!(
                "Crew entry with empty id in {}",
                file.display()
            )));
        }

        let order = match existing.iter().find(|c| c.id == seed.id.trim()) {
            Some(current) => {
                updated += 1;
                current.roster_order
            }
            None => {
                added += 1;
                next_order += 1;
                next_order - 1
            }
        };
        store.upsert_crew(&seed.to_crew(order)).await?;
    }

    tracing::info!(added, updated, file = %file.display(), "Crews imported");
    println!("Imported {} crew(s): {added} added, {updated} updated.", parsed.crews.len());
    Ok(())
}
