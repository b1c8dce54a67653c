use std::sync::Arc;

use clap::Subcommand;
use nterrupt_core::surface::format_remaining;
use nterrupt_core::{
    BlockService, Config, CountdownEngine, PresenceMonitor, SqliteCountdownStore, SurfaceManager,
    SystemClock,
};

use crate::host::{CommandProbe, DetachedScheduler, LogPresenter};

#[derive(Subcommand)]
pub enum BlockAction {
    /// Start (or replace) a block on an app
    Start {
        /// Entity identifier (e.g. "com.example.social")
        entity: String,
        /// Display name shown on the blocking surface
        #[arg(long)]
        name: Option<String>,
        /// Block length in minutes (defaults to blocks.default_duration_min)
        #[arg(long, conflicts_with = "duration_ms")]
        minutes: Option<u64>,
        /// Block length in milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,
    },
    /// Stop a block
    Stop {
        entity: String,
    },
    /// Print remaining time for an entity as JSON
    Remaining {
        entity: String,
    },
    /// Print whether an entity is blocked as JSON
    Active {
        entity: String,
    },
    /// Print every active block as JSON
    List,
    /// Print the status line
    Status,
}

/// Build a service over the on-disk store for a single command.
pub fn open_service(config: &Config) -> Result<BlockService, Box<dyn std::error::Error>> {
    let store = SqliteCountdownStore::open()?;
    let engine = CountdownEngine::new(
        Box::new(store),
        Box::new(DetachedScheduler),
        Arc::new(SystemClock),
        &config.engine,
    );
    let monitor = PresenceMonitor::new(
        Box::new(CommandProbe::new(
            config.monitor.foreground_command.clone(),
            config.monitor.probe_timeout_ms,
        )),
        &config.monitor,
    );
    let mut service = BlockService::new(engine, SurfaceManager::new(Box::new(LogPresenter)), monitor);

    let recovered = service.recover();
    tracing::debug!("Recovery produced {} event(s)", recovered.len());
    Ok(service)
}

fn resolve_duration_ms(config: &Config, minutes: Option<u64>, duration_ms: Option<u64>) -> u64 {
    match duration_ms {
        Some(ms) => ms,
        None => minutes
            .unwrap_or(config.blocks.default_duration_min)
            .saturating_mul(60_000),
    }
}

pub fn run(action: BlockAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let mut service = open_service(&config)?;

    match action {
        BlockAction::Start {
            entity,
            name,
            minutes,
            duration_ms,
        } => {
            let duration_ms = resolve_duration_ms(&config, minutes, duration_ms);
            let events = service.start_block(&entity, name.as_deref().unwrap_or(""), duration_ms)?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        BlockAction::Stop { entity } => {
            let events = service.stop_block(&entity);
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        BlockAction::Remaining { entity } => {
            let remaining_ms = service.query_remaining(&entity);
            let json = serde_json::json!({
                "entity_id": entity,
                "remaining_ms": remaining_ms,
                "countdown": format_remaining(remaining_ms),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        BlockAction::Active { entity } => {
            let json = serde_json::json!({
                "entity_id": entity,
                "active": service.query_active(&entity),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        BlockAction::List => {
            println!("{}", serde_json::to_string_pretty(&service.snapshot())?);
        }
        BlockAction::Status => {
            println!("{}", service.status_line());
        }
    }
    Ok(())
}
