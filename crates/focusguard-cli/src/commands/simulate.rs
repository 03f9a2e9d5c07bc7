//! Scenario replay in virtual time.
//!
//! A scenario is a JSON file:
//!
//! ```json
//! {
//!   "start": "2026-03-02T09:00:00",
//!   "settings": { "dailyLimitMinutes": 1, "distractingApps": ["app.x"] },
//!   "steps": [
//!     { "at_secs": 0, "action": "foreground", "app": "app.x" },
//!     { "at_secs": 1, "action": "start" },
//!     { "at_secs": 30, "action": "set_total", "app": "app.x", "secs": 60 }
//!   ]
//! }
//! ```
//!
//! The clock jumps straight from one deadline to the next (step, monitor
//! tick, snooze countdown, scheduled alarm). Every engine event is printed
//! to stdout as one JSON line.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use focusguard_core::alarm::{AlarmInput, AlarmParts, AlarmReceiver, AlarmScheduler, AlarmSession, FocusLoss};
use focusguard_core::settings::{PermissionChange, Permissions, SettingsUpdate};
use focusguard_core::sim::{SimAccounting, SimAlarmClock, SimAudio, SimHost, SimSurface, SimWakeLock};
use focusguard_core::storage::{EngineConfig, MemoryCounterStore};
use focusguard_core::usage::{MonitorParts, UsageEvent, UsageMonitor};
use focusguard_core::{Event, EventSink};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct Scenario {
    /// Local wall-clock start; defaults to 09:00 on 2026-01-05.
    #[serde(default)]
    start: Option<NaiveDateTime>,
    #[serde(default)]
    config: EngineConfig,
    /// Applied on top of the configured discipline defaults.
    #[serde(default)]
    settings: SettingsUpdate,
    #[serde(default = "Permissions::all")]
    permissions: Permissions,
    /// Keep running this long after the start; defaults to the last step.
    #[serde(default)]
    duration_secs: Option<u64>,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    at_secs: u64,
    #[serde(flatten)]
    action: Action,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Action {
    Start,
    Stop,
    SetTotal { app: String, secs: u64 },
    Foreground { app: String },
    Background { app: String },
    AccountingFails { failing: bool },
    AccountingUnavailable { unavailable: bool },
    ApplySettings { settings: SettingsUpdate },
    SetTasksComplete { complete: bool },
    ResetUsage,
    UsageStats { granted: bool },
    Overlay { granted: bool },
    FireAlarm { task: String },
    ScheduleAlarm { in_secs: u64, task: String },
    Snooze,
    Dismiss,
    FocusLost { kind: FocusLoss },
    FocusGranted,
}

/// Prints events as JSON lines.
struct JsonLines;

impl EventSink for JsonLines {
    fn emit(&self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "failed to serialize event"),
        }
    }
}

struct World {
    acct: SimAccounting,
    clock: SimAlarmClock,
    monitor: UsageMonitor,
    session: AlarmSession,
    receiver: AlarmReceiver,
    scheduler: AlarmScheduler<SimAlarmClock>,
    permissions: Permissions,
}

impl World {
    fn new(scenario: &Scenario, now: DateTime<Local>) -> Self {
        let config = &scenario.config;
        let acct = SimAccounting::new();
        let clock = SimAlarmClock::new();
        let settings = config.discipline.settings().merged(&scenario.settings);
        let monitor = UsageMonitor::new(
            config.monitor.clone(),
            config.discipline.block_message.clone(),
            settings,
            MonitorParts {
                source: Box::new(acct.clone()),
                store: Box::new(MemoryCounterStore::new()),
                wake_lock: Box::new(SimWakeLock::new()),
                host: Box::new(SimHost::new()),
                surface: Box::new(SimSurface::new()),
                sink: Box::new(JsonLines),
            },
            now,
        );
        let session = AlarmSession::new(
            config.alarm.clone(),
            AlarmParts {
                audio: Box::new(SimAudio::new()),
                wake_lock: Box::new(SimWakeLock::new()),
                host: Box::new(SimHost::new()),
                surface: Box::new(SimSurface::new()),
                sink: Box::new(JsonLines),
            },
        );
        let receiver = AlarmReceiver::new(
            Box::new(SimWakeLock::new()),
            config.alarm.receiver_wake_lock(),
        );
        Self {
            acct,
            scheduler: AlarmScheduler::new(clock.clone()),
            clock,
            monitor,
            session,
            receiver,
            permissions: scenario.permissions,
        }
    }

    fn apply(&mut self, action: &Action, now: DateTime<Local>) -> Result<(), Box<dyn std::error::Error>> {
        match action {
            Action::Start => {
                let settings = self.monitor.settings().clone();
                self.monitor.start(settings, self.permissions, now);
            }
            Action::Stop => self.monitor.stop(now),
            Action::SetTotal { app, secs } => self.acct.set_total(app, Duration::from_secs(*secs)),
            Action::Foreground { app } => self.acct.push_event(UsageEvent::foreground(now, app.as_str())),
            Action::Background { app } => self.acct.push_event(UsageEvent::background(now, app.as_str())),
            Action::AccountingFails { failing } => self.acct.set_failing(*failing),
            Action::AccountingUnavailable { unavailable } => self.acct.set_unavailable(*unavailable),
            Action::ApplySettings { settings } => self.monitor.apply_settings(settings, now),
            Action::SetTasksComplete { complete } => self.monitor.set_tasks_complete(*complete, now),
            Action::ResetUsage => self.monitor.reset_usage(now),
            Action::UsageStats { granted } => {
                self.permissions.usage_stats = *granted;
                self.monitor.push_permission(PermissionChange::UsageStats(*granted), now);
            }
            Action::Overlay { granted } => {
                self.permissions.overlay = *granted;
                self.monitor.push_permission(PermissionChange::Overlay(*granted), now);
            }
            Action::FireAlarm { task } => self.receiver.deliver(&mut self.session, task, now),
            Action::ScheduleAlarm { in_secs, task } => {
                self.scheduler.schedule_in(Duration::from_secs(*in_secs), task, now)?;
            }
            Action::Snooze => self.session.handle(AlarmInput::Snooze, now),
            Action::Dismiss => self.session.handle(AlarmInput::Dismiss, now),
            Action::FocusLost { kind } => self.session.handle(AlarmInput::FocusLost { kind: *kind }, now),
            Action::FocusGranted => self.session.handle(AlarmInput::FocusGranted, now),
        }
        Ok(())
    }

    /// Run every timer due at `now`.
    fn fire_timers(&mut self, now: DateTime<Local>) {
        for task in self.clock.take_due(now) {
            self.receiver.deliver(&mut self.session, &task, now);
        }
        self.session.poll(now);
        self.monitor.poll(now);
    }

    fn next_timer(&self) -> Option<DateTime<Local>> {
        [self.monitor.next_due(), self.session.next_due(), self.clock.next_due()]
            .into_iter()
            .flatten()
            .min()
    }
}

fn default_start() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2026, 1, 5)?.and_hms_opt(9, 0, 0)
}

pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let mut scenario: Scenario = serde_json::from_str(&raw)?;
    scenario.steps.sort_by_key(|s| s.at_secs);

    let start_naive = scenario
        .start
        .or_else(default_start)
        .ok_or("invalid start time")?;
    let start = start_naive
        .and_local_timezone(Local)
        .earliest()
        .ok_or_else(|| format!("start time {start_naive} does not exist locally"))?;

    let last_step = scenario.steps.last().map_or(0, |s| s.at_secs);
    let end = start + secs(scenario.duration_secs.unwrap_or(last_step).max(last_step));

    let mut world = World::new(&scenario, start);
    let mut steps = scenario.steps.iter().peekable();
    let mut now = start;

    loop {
        let next_step = steps.peek().map(|s| start + secs(s.at_secs));
        let next = [next_step, world.next_timer()].into_iter().flatten().min();
        let Some(next) = next.filter(|t| *t <= end) else {
            break;
        };
        now = next.max(now);

        while let Some(step) = steps.peek() {
            if start + secs(step.at_secs) > now {
                break;
            }
            world.apply(&step.action, now)?;
            steps.next();
        }
        world.fire_timers(now);
    }

    world.session.handle(AlarmInput::Dismiss, end);
    world.monitor.stop(end);
    Ok(())
}

/// Offsets are capped at ten years of virtual time.
fn secs(n: u64) -> chrono::Duration {
    const MAX_SECS: u64 = 10 * 365 * 24 * 60 * 60;
    chrono::Duration::seconds(n.min(MAX_SECS) as i64)
}
