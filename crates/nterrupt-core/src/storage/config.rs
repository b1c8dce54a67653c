//! TOML-based application configuration.
//!
//! Stores tuning for:
//! - Periodic refresh of active countdowns
//! - Foreground presence polling
//! - Defaults for new blocks
//!
//! Configuration is stored at `~/.config/nterrupt/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::{ConfigError, CoreError};

/// Countdown engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Period of the refresh tick that persists and broadcasts countdowns.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

/// Foreground presence monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Shell command whose trimmed stdout names the foreground entity.
    #[serde(default)]
    pub foreground_command: Option<String>,
    /// A foreground command still running after this long is killed and
    /// counts as a failed probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

/// Defaults applied to new blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDefaults {
    #[serde(default = "default_duration_min")]
    pub default_duration_min: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/nterrupt/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub blocks: BlockDefaults,
}

fn default_refresh_interval_ms() -> u64 {
    1_000
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_probe_timeout_ms() -> u64 {
    1_000
}
fn default_duration_min() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            foreground_command: None,
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Default for BlockDefaults {
    fn default() -> Self {
        Self {
            default_duration_min: default_duration_min(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            monitor: MonitorConfig::default(),
            blocks: BlockDefaults::default(),
        }
    }
}

/// Keys whose values must be strictly positive.
const POSITIVE_KEYS: [&str; 4] = [
    "engine.refresh_interval_ms",
    "monitor.poll_interval_ms",
    "monitor.probe_timeout_ms",
    "blocks.default_duration_min",
];

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        if n == 0 && POSITIVE_KEYS.contains(&key) {
                            return Err(invalid("must be greater than zero".into()));
                        }
                        serde_json::Value::Number(n.into())
                    }
                    // Optional strings are stored as null until first set.
                    serde_json::Value::Null | serde_json::Value::String(_) => {
                        if value.is_empty() {
                            serde_json::Value::Null
                        } else {
                            serde_json::Value::String(value.into())
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, CoreError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, CoreError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults if the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), CoreError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), CoreError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Timings and the default duration must be positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (POSITIVE_KEYS[0], self.engine.refresh_interval_ms),
            (POSITIVE_KEYS[1], self.monitor.poll_interval_ms),
            (POSITIVE_KEYS[2], self.monitor.probe_timeout_ms),
            (POSITIVE_KEYS[3], self.blocks.default_duration_min),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Update a value by key in memory without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), CoreError> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json)?;
        Ok(())
    }

    /// Set a value by key and save. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), CoreError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Flattened `key = value` pairs for display.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
