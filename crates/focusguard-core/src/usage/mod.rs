//! Usage monitoring and rule enforcement.
//!
//! - `tracker`: foreground-app inference from transition events
//! - `rules`: the pure blocking decision
//! - `accounting`: the platform usage source seam
//! - `monitor`: the periodic loop tying them to the counter store

mod accounting;
mod monitor;
mod rules;
mod tracker;

pub use accounting::{distracting_total, UsageAccountingSource};
pub use monitor::{start_of_day, MonitorParts, MonitorPhase, UsageMonitor, UsageState};
pub use rules::{evaluate, Verdict};
pub use tracker::{track_foreground, StaleForeground, TransitionKind, UsageEvent};
