//! Foreground-app inference from the transition event log.
//!
//! The accounting source only reports transitions, so "what is in front right
//! now" has to be reconstructed from a short look-back window. The window is
//! wider than the polling interval so a transition landing exactly on a
//! boundary is seen by at least one tick.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::settings::AppId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    ToForeground,
    ToBackground,
}

/// One entry of the accounting source's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub at: DateTime<Local>,
    pub app: AppId,
    pub kind: TransitionKind,
}

impl UsageEvent {
    pub fn foreground(at: DateTime<Local>, app: impl Into<AppId>) -> Self {
        Self {
            at,
            app: app.into(),
            kind: TransitionKind::ToForeground,
        }
    }

    pub fn background(at: DateTime<Local>, app: impl Into<AppId>) -> Self {
        Self {
            at,
            app: app.into(),
            kind: TransitionKind::ToBackground,
        }
    }
}

/// What to do with the last known foreground app when a window yields no
/// candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleForeground {
    /// Keep it: no events is not proof the app went to background.
    #[default]
    Retain,
    /// Forget it.
    Clear,
}

/// Compute the foreground app after `events` (chronological).
pub fn track_foreground(
    events: &[UsageEvent],
    previous: Option<&AppId>,
    policy: StaleForeground,
) -> Option<AppId> {
    let mut candidate: Option<&AppId> = None;
    for event in events {
        match event.kind {
            TransitionKind::ToForeground => candidate = Some(&event.app),
            TransitionKind::ToBackground => {
                if candidate.is_some_and(|c| c.matches(event.app.as_str())) {
                    candidate = None;
                }
            }
        }
    }

    match (candidate, policy) {
        (Some(app), _) => Some(app.clone()),
        (None, StaleForeground::Retain) => previous.cloned(),
        (None, StaleForeground::Clear) => None,
    }
}
