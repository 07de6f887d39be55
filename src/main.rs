//! # Pledger — Promise & Accountability Tracker
//!
//! Runs the recurring notification scheduler and the missed-commitment
//! sweep, either as an HTTP-triggered server or as one-shot commands.
//!
//! Usage:
//!   pledger serve                  # Start the gateway (default port 8080)
//!   pledger tick                   # Run one scheduler tick now
//!   pledger tick --at <rfc3339>    # Run a tick as of a specific instant
//!   pledger sweep                  # Mark overdue open commitments missed

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pledger_core::PledgerConfig;
use pledger_scheduler::{
    DeliveryLedger, DeliveryTransport, DispatchCoordinator, EmailTransport, LogTransport,
    MissedSweep, PledgerDb, WebhookTransport,
};

#[derive(Parser)]
#[command(name = "pledger", version, about = "📋 Pledger — promise & accountability tracker")]
struct Cli {
    /// Config file path (default: ~/.pledger/config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP gateway the external trigger calls.
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one notification tick and exit.
    Tick {
        /// Tick instant, RFC 3339 (default: now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Run one missed-commitment sweep and exit.
    Sweep {
        /// Sweep instant, RFC 3339 (default: now)
        #[arg(long)]
        at: Option<String>,
    },
}

struct Components {
    ledger: Arc<DeliveryLedger>,
    coordinator: DispatchCoordinator,
    sweep: MissedSweep,
}

fn build_components(config: &PledgerConfig) -> Result<Components> {
    let db_path = shellexpand::tilde(&config.storage.db_path).to_string();
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = Arc::new(PledgerDb::open(std::path::Path::new(&db_path))?);
    let ledger = Arc::new(DeliveryLedger::open(std::path::Path::new(&db_path))?);

    let transport: Arc<dyn DeliveryTransport> = match config.transport.mode.as_str() {
        "email" => Arc::new(EmailTransport::new(config.transport.email.clone())?),
        "webhook" => Arc::new(WebhookTransport::new(config.transport.webhook.clone())?),
        "log" => Arc::new(LogTransport),
        other => {
            tracing::warn!("⚠️ Unknown transport mode '{other}' — falling back to log");
            Arc::new(LogTransport)
        }
    };

    let coordinator = DispatchCoordinator::new(
        db.clone(),
        ledger.clone(),
        transport,
        config.scheduler.max_concurrent_sends,
    );
    let sweep = MissedSweep::new(
        db.clone(),
        ledger.clone(),
        &config.scheduler.default_time_zone,
    );

    Ok(Components {
        ledger,
        coordinator,
        sweep,
    })
}

fn parse_instant(at: Option<String>) -> Result<DateTime<Utc>> {
    match at {
        None => Ok(Utc::now()),
        Some(s) => Ok(DateTime::parse_from_rfc3339(&s)
            .map_err(|e| anyhow::anyhow!("Invalid --at instant '{s}': {e}"))?
            .with_timezone(&Utc)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "pledger=debug,pledger_scheduler=debug,tower_http=debug"
    } else {
        "pledger=info,pledger_scheduler=info,pledger_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => {
            let expanded = shellexpand::tilde(path).to_string();
            PledgerConfig::load_from(std::path::Path::new(&expanded))?
        }
        None => PledgerConfig::load()?,
    };

    let components = build_components(&config)?;

    match cli.command {
        Command::Serve { port } => {
            let port = port.unwrap_or(config.gateway.port);
            println!("📋 Pledger v{}", env!("CARGO_PKG_VERSION"));
            println!("   🌐 Trigger:    POST http://{}:{}/api/v1/tick", config.gateway.host, port);
            println!("   🧹 Sweep:      POST http://{}:{}/api/v1/sweep", config.gateway.host, port);
            println!("   🗄️  Database:   {}", config.storage.db_path);
            println!("   📮 Transport:  {}", config.transport.mode);
            println!();

            let state = Arc::new(pledger_gateway::AppState {
                coordinator: components.coordinator,
                sweep: components.sweep,
                ledger: components.ledger,
                start_time: std::time::Instant::now(),
            });
            pledger_gateway::start(state, &config.gateway.host, port).await?;
        }
        Command::Tick { at } => {
            let now = parse_instant(at)?;
            let report = components.coordinator.run_tick(now).await?;
            println!("✅ Tick {}: {}", now.to_rfc3339(), report.summary());
        }
        Command::Sweep { at } => {
            let now = parse_instant(at)?;
            let transitioned = components.sweep.sweep_missed(now)?;
            println!(
                "✅ Sweep {}: {} commitment(s) marked missed",
                now.to_rfc3339(),
                transitioned.len()
            );
            for id in transitioned {
                println!("   📌 {id}");
            }
        }
    }

    Ok(())
}
