use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crewbook::commands::{self, ProposeParams};
use crewbook::config::Config;
use crewbook::error::CrewbookErrorTrait;

#[derive(Parser)]
#[command(
    name = "crewbook",
    version,
    about = "Field crew appointment scheduler with travel-aware slot search",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the booking HTTP API
    Serve {
        /// Bind address, e.g. 127.0.0.1:8080
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Find the earliest slot for a job (and optionally book it)
    Propose {
        /// Job site postal code
        #[arg(short, long)]
        postal_code: String,

        /// Job length in minutes
        #[arg(short, long, default_value = "60")]
        duration: u32,

        /// Service description
        #[arg(short, long, default_value = "Service visit")]
        service: String,

        /// Earliest acceptable start (RFC 3339)
        #[arg(long)]
        earliest: Option<DateTime<FixedOffset>>,

        /// Customer name
        #[arg(long, default_value = "Walk-in customer")]
        name: String,

        /// Customer email
        #[arg(long, default_value = "dispatch@crewbook.local")]
        email: String,

        /// Customer phone
        #[arg(long, default_value = "0000000000")]
        phone: String,

        /// Free-text notes
        #[arg(long)]
        notes: Option<String>,

        /// Book the proposed slot
        #[arg(long, default_value = "false")]
        confirm: bool,
    },

    /// List the crew roster
    Crews,

    /// Show a crew's upcoming events
    Events {
        /// Crew id
        crew_id: String,

        /// Days ahead to show
        #[arg(short, long, default_value = "7")]
        days: u32,
    },

    /// Import crews from a TOML file with [[crews]] tables
    ImportCrews {
        /// Crew file path
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::debug!(config = ?cli.config, "Configuration loaded");

    if let Err(err) = run(cli.command, config).await {
        tracing::error!(
            code = err.code(),
            category = err.category().as_str(),
            recoverable = err.is_recoverable(),
            error = %err,
            "Command failed"
        );
        return Err(err.into());
    }

    Ok(())
}

async fn run(command: Commands, config: Config) -> crewbook::Result<()> {
    match command {
        Commands::Serve { bind } => {
            tracing::info!(bind = ?bind, "Starting serve command");
            commands::serve(config, bind).await?;
        }

        Commands::Propose {
            postal_code,
            duration,
            service,
            earliest,
            name,
            email,
            phone,
            notes,
            confirm,
        } => {
            tracing::info!(
                postal_code = %postal_code,
                duration = %duration,
                earliest = ?earliest,
                confirm = %confirm,
                "Starting propose command"
            );
            let params = ProposeParams {
                postal_code,
                duration_minutes: duration,
                service_type: service,
                earliest_start: earliest,
                name,
                email,
                phone,
                notes,
                confirm,
            };
            commands::propose(config, params).await?;
        }

        Commands::Crews => {
            commands::list_crews(config).await?;
        }

        Commands::Events { crew_id, days } => {
            commands::events(config, &crew_id, days).await?;
        }

        Commands::ImportCrews { file } => {
            tracing::info!(file = %file.display(), "Starting import-crews command");
            commands::import_crews(config, &file).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(filter) if !filter.trim().is_empty() => tracing_subscriber::EnvFilter::new(filter),
        _ if verbose => tracing_subscriber::EnvFilter::new("crewbook=debug,tower_http=debug,info"),
        _ => tracing_subscriber::EnvFilter::new(format!("crewbook={level},tower_http={level},warn")),
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
