use std::error::Error;
use std::path::PathBuf;

pub mod config;
pub mod evaluate;
pub mod simulate;
pub mod usage;

/// `--data-dir` if given (created on demand), else the default data directory.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf, Box<dyn Error>> {
    match explicit {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            Ok(dir)
        }
        None => Ok(focusguard_core::storage::data_dir()?),
    }
}
