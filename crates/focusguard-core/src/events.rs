use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Every observable action of the engine produces an Event.
/// Hosts consume them through an [`EventSink`]; the status stream is the
/// `StatusSnapshot` subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    MonitorStarted {
        at: DateTime<Local>,
    },
    /// Usage access is missing; polling is suspended until it is granted.
    MonitorSuspended {
        at: DateTime<Local>,
    },
    MonitorStopped {
        cumulative_ms: u64,
        at: DateTime<Local>,
    },
    /// Emitted once per evaluation.
    #[serde(rename_all = "camelCase")]
    StatusSnapshot {
        cumulative_millis: u64,
        limit_millis: u64,
        tasks_complete: bool,
        is_blocking: bool,
        current_foreground_app: Option<String>,
        at: DateTime<Local>,
    },
    BlockingPromptRequested {
        message: String,
        app: String,
        at: DateTime<Local>,
    },
    /// A previously requested block no longer applies.
    BlockingCleared {
        at: DateTime<Local>,
    },
    UsageReset {
        at: DateTime<Local>,
    },
    AlarmSounding {
        session_id: String,
        task: String,
        snoozes_remaining: u8,
        at: DateTime<Local>,
    },
    /// Focus was lost; the tone stopped but the session is still live.
    AlarmPlaybackPaused {
        session_id: String,
        at: DateTime<Local>,
    },
    AlarmSnoozed {
        session_id: String,
        snoozes_remaining: u8,
        resume_at: DateTime<Local>,
        at: DateTime<Local>,
    },
    SnoozeRejected {
        session_id: String,
        at: DateTime<Local>,
    },
    AlarmDismissed {
        session_id: String,
        at: DateTime<Local>,
    },
    /// The session ended without a user dismiss (focus denied, player error...).
    AlarmAborted {
        session_id: String,
        reason: String,
        at: DateTime<Local>,
    },
}

impl Event {
    pub fn is_status(&self) -> bool {
        matches!(self, Event::StatusSnapshot { .. })
    }
}

/// Receives engine events. Implementations must not block.
pub trait EventSink: Send {
    fn emit(&self, event: Event);
}

impl EventSink for std::sync::mpsc::Sender<Event> {
    fn emit(&self, event: Event) {
        // A dropped receiver only means nobody is listening.
        let _ = self.send(event);
    }
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<Event> {
    fn emit(&self, event: Event) {
        let _ = self.send(event);
    }
}

impl EventSink for tokio::sync::broadcast::Sender<Event> {
    fn emit(&self, event: Event) {
        let _ = self.send(event);
    }
}

/// Keeps every emitted event in memory; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }

    /// Status snapshots only, oldest first.
    pub fn statuses(&self) -> Vec<Event> {
        self.events().into_iter().filter(Event::is_status).collect()
    }

    pub fn last_status(&self) -> Option<Event> {
        self.statuses().pop()
    }
}

impl EventSink for EventRecorder {
    fn emit(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
