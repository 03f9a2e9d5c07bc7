mod config;
pub mod counter;

pub use config::{AlarmConfig, DisciplineDefaults, EngineConfig, MonitorConfig};
pub use counter::{CounterRecord, CounterStore, MemoryCounterStore, SqliteCounterStore};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/focusguard[-dev]/` based on FOCUSGUARD_ENV.
///
/// Set FOCUSGUARD_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FOCUSGUARD_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("focusguard-dev")
    } else {
        base_dir.join("focusguard")
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
