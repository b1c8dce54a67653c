mod config;
pub mod countdown_store;
pub mod database;

pub use config::{BlockDefaults, Config, EngineConfig, MonitorConfig};
pub use countdown_store::{CountdownRecord, CountdownStore, MemoryCountdownStore};
pub use database::SqliteCountdownStore;

use std::path::PathBuf;

use crate::error::CoreError;

/// Returns `~/.config/nterrupt[-dev]/` based on NTERRUPT_ENV.
///
/// Set NTERRUPT_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, CoreError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("NTERRUPT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("nterrupt-dev")
    } else {
        base_dir.join("nterrupt")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
