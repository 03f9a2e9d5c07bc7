use std::path::PathBuf;

use chrono::Local;
use clap::Subcommand;
use focusguard_core::storage::{CounterRecord, CounterStore, SqliteCounterStore};

use super::resolve_data_dir;

#[derive(Subcommand)]
pub enum UsageAction {
    /// Print the persisted counter as JSON
    Show,
    /// Zero today's counter
    Reset,
}

pub fn run(action: UsageAction, data_dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = resolve_data_dir(data_dir)?.join("focusguard.db");
    let mut store = SqliteCounterStore::open_at(&path)?;
    match action {
        UsageAction::Show => {
            let record = store.load_counter()?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        UsageAction::Reset => {
            let today = Local::now().date_naive();
            // The raw total behind today's counter stays hidden after the reset.
            let reset_offset = match store.load_counter()? {
                Some(r) if r.date == today => r.reset_offset + r.cumulative,
                _ => Default::default(),
            };
            let record = CounterRecord {
                reset_offset,
                ..CounterRecord::zero(today)
            };
            store.save_counter(&record)?;
            println!("usage reset for {today}");
        }
    }
    Ok(())
}
