use std::path::PathBuf;

use clap::Subcommand;
use focusguard_core::EngineConfig;

use super::resolve_data_dir;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "monitor.poll_interval_secs", "discipline.daily_limit_minutes")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction, data_dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = resolve_data_dir(data_dir)?.join("config.toml");
    match action {
        ConfigAction::Get { key } => {
            let config = EngineConfig::load_from(&path)?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = EngineConfig::load_from(&path)?;
            config.set(&key, &value)?;
            config.save_to(&path)?;
            println!("ok");
        }
        ConfigAction::List => {
            let config = EngineConfig::load_from(&path)?;
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
        ConfigAction::Reset => {
            EngineConfig::default().save_to(&path)?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
