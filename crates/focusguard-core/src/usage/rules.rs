//! The discipline rule, as a pure function of one settings snapshot and the
//! current usage state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::settings::{AppId, DisciplineSettings};

/// Result of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub limit_reached: bool,
    /// Reported on the status stream as `isBlocking`.
    pub should_block: bool,
    pub is_distracting: bool,
    /// Request the blocking surface this tick.
    pub block_now: bool,
}

pub fn evaluate(
    settings: &DisciplineSettings,
    cumulative: Duration,
    foreground: Option<&AppId>,
) -> Verdict {
    let limit_reached = cumulative >= settings.daily_limit;
    let should_block = settings.active
        && limit_reached
        && !settings.tasks_complete
        && settings.block_on_limit;
    let is_distracting =
        foreground.is_some_and(|app| settings.distracting_apps.contains(app.as_str()));

    Verdict {
        limit_reached,
        should_block,
        is_distracting,
        block_now: should_block && is_distracting,
    }
}
