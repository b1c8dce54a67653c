use clap::Subcommand;
use nterrupt_core::{Config, ConfigError};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value by dotted key
    Get {
        /// Dotted key, e.g. "engine.refresh_interval_ms"
        key: String,
    },
    /// Validate, store and save one value
    Set {
        key: String,
        /// Empty string clears an optional value
        value: String,
    },
    /// Print every key as `key = value`
    List,
    /// Overwrite config.toml with defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match action {
        ConfigAction::Reset => Config::default(),
        _ => Config::load()?,
    };

    match action {
        ConfigAction::Get { key } => {
            let value = config.get(&key).ok_or(ConfigError::UnknownKey(key))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            tracing::info!("Set {} = {}", key, value);
            println!("ok");
        }
        ConfigAction::List => {
            for (key, value) in config.entries() {
                println!("{key} = {value}");
            }
        }
        ConfigAction::Reset => {
            config.save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
