//! Usage monitor loop.
//!
//! Like the alarm session, the monitor is a wall-clock state machine with no
//! thread of its own. The driver calls [`UsageMonitor::poll`] whenever it
//! wakes up (the runtime sleeps until [`UsageMonitor::next_due`]); each due
//! poll runs one tick to completion and re-arms the next one.
//!
//! ## Phases
//!
//! ```text
//! Stopped -> Polling <-> Suspended -> Stopped
//! ```
//!
//! `Suspended` means the loop is started but usage access is missing: no
//! polling happens until a permission change grants it again.

use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::accounting::{distracting_total, UsageAccountingSource};
use super::rules::{evaluate, Verdict};
use super::tracker::track_foreground;
use crate::events::{Event, EventSink};
use crate::platform::{BlockingSurface, ForegroundHost, WakeLock};
use crate::settings::{AppId, DisciplineSettings, PermissionChange, Permissions, SettingsUpdate};
use crate::storage::{CounterRecord, CounterStore, MonitorConfig};
use crate::timer::OneShot;

/// Collaborators owned by the monitor.
pub struct MonitorParts {
    pub source: Box<dyn UsageAccountingSource>,
    pub store: Box<dyn CounterStore>,
    pub wake_lock: Box<dyn WakeLock>,
    pub host: Box<dyn ForegroundHost>,
    pub surface: Box<dyn BlockingSurface>,
    pub sink: Box<dyn EventSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorPhase {
    Stopped,
    Polling,
    Suspended,
}

/// Engine-owned usage state. Only the monitor mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageState {
    pub tracking_date: NaiveDate,
    #[serde(serialize_with = "serialize_ms")]
    pub cumulative: Duration,
    #[serde(serialize_with = "serialize_ms")]
    pub reset_offset: Duration,
    pub current_foreground_app: Option<AppId>,
}

fn serialize_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl UsageState {
    fn fresh(date: NaiveDate) -> Self {
        Self {
            tracking_date: date,
            cumulative: Duration::ZERO,
            reset_offset: Duration::ZERO,
            current_foreground_app: None,
        }
    }

    fn record(&self) -> CounterRecord {
        CounterRecord {
            date: self.tracking_date,
            cumulative: self.cumulative,
            reset_offset: self.reset_offset,
        }
    }
}

/// Midnight of `now`'s calendar day in local time.
pub fn start_of_day(now: DateTime<Local>) -> DateTime<Local> {
    now.date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        // Midnight can fall into a DST gap; count back from `now` instead.
        .unwrap_or_else(|| now - chrono::Duration::seconds(i64::from(now.num_seconds_from_midnight())))
}

pub struct UsageMonitor {
    config: MonitorConfig,
    block_message: String,
    settings: DisciplineSettings,
    permissions: Permissions,
    permission_tx: Sender<PermissionChange>,
    permission_rx: Receiver<PermissionChange>,
    state: UsageState,
    /// Latest raw distracting total reported for the tracking date.
    last_raw_total: Option<Duration>,
    phase: MonitorPhase,
    schedule: OneShot,
    /// Last record the store accepted (or returned on load).
    persisted: Option<CounterRecord>,
    /// In-memory counter differs from what the store holds.
    dirty: bool,
    block_requested: bool,
    parts: MonitorParts,
}

impl UsageMonitor {
    /// Create a stopped monitor and load the persisted counter.
    ///
    /// A record from an earlier day is replaced by a zero counter for
    /// `now`'s date.
    pub fn new(
        config: MonitorConfig,
        block_message: impl Into<String>,
        settings: DisciplineSettings,
        parts: MonitorParts,
        now: DateTime<Local>,
    ) -> Self {
        let today = now.date_naive();
        let (state, persisted, dirty) = match parts.store.load_counter() {
            Ok(Some(record)) if record.date == today => {
                debug!(cumulative_ms = record.cumulative.as_millis() as u64, "loaded today's counter");
                (
                    UsageState {
                        tracking_date: record.date,
                        cumulative: record.cumulative,
                        reset_offset: record.reset_offset,
                        current_foreground_app: None,
                    },
                    Some(record),
                    false,
                )
            }
            Ok(Some(record)) => {
                info!(stored = %record.date, %today, "new day detected; resetting counter");
                (UsageState::fresh(today), None, true)
            }
            Ok(None) => (UsageState::fresh(today), None, true),
            Err(e) => {
                // Do not overwrite a record we could not read.
                warn!(error = %e, "failed to load usage counter; starting from zero");
                (UsageState::fresh(today), None, false)
            }
        };

        let (permission_tx, permission_rx) = mpsc::channel();
        let mut monitor = Self {
            config,
            block_message: block_message.into(),
            settings,
            permissions: Permissions::default(),
            permission_tx,
            permission_rx,
            state,
            last_raw_total: None,
            phase: MonitorPhase::Stopped,
            schedule: OneShot::new(),
            persisted,
            dirty,
            block_requested: false,
            parts,
        };
        if monitor.dirty {
            monitor.persist();
        }
        monitor
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase != MonitorPhase::Stopped
    }

    pub fn settings(&self) -> &DisciplineSettings {
        &self.settings
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn state(&self) -> &UsageState {
        &self.state
    }

    /// When the next scheduled tick is due, if any.
    pub fn next_due(&self) -> Option<DateTime<Local>> {
        self.schedule.due_at()
    }

    /// Queue for permission changes; drained at the top of every poll/tick.
    ///
    /// Sending does not wake a driver that is sleeping on [`Self::next_due`],
    /// and a suspended monitor has no deadline at all. Callers outside the
    /// crate go through [`crate::Engine`], whose permission commands poll
    /// right away.
    pub(crate) fn permission_sender(&self) -> Sender<PermissionChange> {
        self.permission_tx.clone()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start monitoring with a fresh settings snapshot and permission set.
    pub fn start(
        &mut self,
        settings: DisciplineSettings,
        permissions: Permissions,
        now: DateTime<Local>,
    ) {
        self.settings = settings;
        self.permissions = permissions;
        self.drain_permissions();

        if !self.settings.active {
            info!("discipline inactive; monitor not started");
            if self.is_running() {
                self.stop(now);
            }
            return;
        }
        match self.phase {
            MonitorPhase::Stopped => self.start_loop(now),
            MonitorPhase::Polling => {
                debug!("monitor already running; re-evaluating");
                self.tick(now);
            }
            // Resumes polling if the new permission set grants usage access.
            MonitorPhase::Suspended => self.poll(now),
        }
    }

    /// Merge a partial settings update into the current snapshot.
    pub fn apply_settings(&mut self, update: &SettingsUpdate, now: DateTime<Local>) {
        let next = self.settings.merged(update);
        self.update_settings(next, now);
    }

    /// Swap in a new settings snapshot.
    pub fn update_settings(&mut self, settings: DisciplineSettings, now: DateTime<Local>) {
        info!(
            active = settings.active,
            block = settings.block_on_limit,
            limit_ms = settings.daily_limit_ms(),
            apps = settings.distracting_apps.len(),
            "settings updated"
        );
        self.settings = settings;

        if !self.settings.active {
            if self.is_running() {
                info!("discipline deactivated; stopping monitor");
                self.stop(now);
            }
            return;
        }

        match self.phase {
            MonitorPhase::Stopped => self.start_loop(now),
            // New limits take effect without waiting for the next interval.
            MonitorPhase::Polling => self.tick(now),
            MonitorPhase::Suspended => {}
        }
    }

    pub fn set_tasks_complete(&mut self, tasks_complete: bool, now: DateTime<Local>) {
        info!(tasks_complete, "tasks status updated");
        self.settings = self.settings.with_tasks_complete(tasks_complete);
        if self.phase == MonitorPhase::Polling {
            self.tick(now);
        }
    }

    /// Queue a permission change and act on it right away.
    pub fn push_permission(&mut self, change: PermissionChange, now: DateTime<Local>) {
        let _ = self.permission_tx.send(change);
        self.poll(now);
    }

    /// Zero today's counter, persist it and publish the new status.
    pub fn reset_usage(&mut self, now: DateTime<Local>) {
        self.roll_over(now);
        let raw = self
            .last_raw_total
            .unwrap_or(self.state.reset_offset + self.state.cumulative);
        info!(
            previous_ms = self.state.cumulative.as_millis() as u64,
            "resetting cumulative usage"
        );
        self.state.reset_offset = raw;
        self.state.cumulative = Duration::ZERO;
        self.dirty = true;
        self.persist();

        self.parts.sink.emit(Event::UsageReset { at: now });
        let verdict = self.verdict();
        self.emit_status(&verdict, now);

        if self.phase == MonitorPhase::Polling {
            self.tick(now);
        }
    }

    /// Cancel the pending tick, release the wake-lock, persist. Idempotent.
    pub fn stop(&mut self, now: DateTime<Local>) {
        if !self.is_running() {
            debug!("monitor already stopped");
            return;
        }
        self.schedule.cancel();
        self.release_wake_lock();
        self.dirty = true;
        self.persist();
        self.parts.host.exit_foreground();
        self.phase = MonitorPhase::Stopped;
        self.block_requested = false;
        info!(cumulative_ms = self.cumulative_ms(), "monitor stopped");
        self.parts.sink.emit(Event::MonitorStopped {
            cumulative_ms: self.saved_cumulative_ms(),
            at: now,
        });
    }

    /// Drive the loop: apply queued permission changes and run the tick if
    /// one is due (or if polling just resumed).
    pub fn poll(&mut self, now: DateTime<Local>) {
        self.drain_permissions();
        match self.phase {
            MonitorPhase::Stopped => {}
            MonitorPhase::Suspended => {
                if self.permissions.usage_stats {
                    info!("usage access granted; resuming monitor");
                    self.phase = MonitorPhase::Polling;
                    self.run_scheduled(now);
                }
            }
            MonitorPhase::Polling => {
                if self.schedule.take_due(now).is_some() {
                    self.run_scheduled(now);
                }
            }
        }
    }

    /// One evaluation cycle. Out-of-cycle callers (settings, reset) use this
    /// directly; it does not touch the periodic schedule.
    pub fn tick(&mut self, now: DateTime<Local>) {
        self.drain_permissions();
        if !self.settings.active {
            debug!("tick skipped: discipline inactive");
            return;
        }
        if !self.permissions.usage_stats {
            if self.phase == MonitorPhase::Polling {
                warn!("usage access permission not granted; suspending polling");
                self.suspend(now);
            }
            return;
        }
        self.renew_wake_lock();

        // Date rollover first, so no rule sees yesterday's counter.
        self.roll_over(now);

        let day_start = start_of_day(now);
        match self.parts.source.query_aggregate_foreground_time(day_start, now) {
            Ok(totals) => {
                let raw = distracting_total(&totals, &self.settings.distracting_apps);
                self.observe_total(raw);
            }
            Err(e) => warn!(error = %e, "usage aggregate query failed; keeping counter"),
        }
        if self.dirty {
            self.persist();
        }

        self.refresh_foreground(now);

        let verdict = self.verdict();
        debug!(
            should_block = verdict.should_block,
            distracting = verdict.is_distracting,
            foreground = ?self.state.current_foreground_app,
            cumulative_ms = self.cumulative_ms(),
            limit_ms = self.settings.daily_limit_ms(),
            "tick evaluated"
        );
        self.emit_status(&verdict, now);

        if verdict.block_now {
            self.request_block(now);
        } else if self.block_requested {
            self.block_requested = false;
            self.parts.surface.clear_blocking_prompt();
            self.parts.sink.emit(Event::BlockingCleared { at: now });
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn start_loop(&mut self, now: DateTime<Local>) {
        if let Err(e) = self.parts.host.enter_foreground() {
            error!(error = %e, "cannot run monitor in foreground; staying stopped");
            self.release_wake_lock();
            return;
        }
        self.phase = MonitorPhase::Polling;
        info!("monitor started");
        self.parts.sink.emit(Event::MonitorStarted { at: now });

        if self.permissions.usage_stats {
            self.run_scheduled(now);
        } else {
            warn!("usage access permission not granted; waiting for it");
            self.suspend(now);
        }
    }

    fn run_scheduled(&mut self, now: DateTime<Local>) {
        self.tick(now);
        if self.phase == MonitorPhase::Polling {
            let interval = chrono::Duration::from_std(self.config.poll_interval())
                .unwrap_or_else(|_| chrono::Duration::seconds(15));
            self.schedule.arm(now + interval);
        }
    }

    fn suspend(&mut self, now: DateTime<Local>) {
        if self.phase == MonitorPhase::Suspended {
            return;
        }
        self.phase = MonitorPhase::Suspended;
        self.schedule.cancel();
        self.release_wake_lock();
        self.parts.sink.emit(Event::MonitorSuspended { at: now });
    }

    fn drain_permissions(&mut self) {
        while let Ok(change) = self.permission_rx.try_recv() {
            debug!(?change, "permission change applied");
            self.permissions.apply(change);
        }
    }

    fn roll_over(&mut self, now: DateTime<Local>) {
        let today = now.date_naive();
        if today != self.state.tracking_date {
            info!(
                from = %self.state.tracking_date,
                to = %today,
                "calendar day changed; counter restarts from zero"
            );
            let foreground = self.state.current_foreground_app.take();
            self.state = UsageState::fresh(today);
            self.state.current_foreground_app = foreground;
            self.last_raw_total = None;
            self.dirty = true;
        }
    }

    fn observe_total(&mut self, raw: Duration) {
        self.last_raw_total = Some(raw);
        let total = raw.saturating_sub(self.state.reset_offset);
        if total > self.state.cumulative {
            debug!(
                from_ms = self.cumulative_ms(),
                to_ms = total.as_millis() as u64,
                "cumulative distraction time updated"
            );
            self.state.cumulative = total;
            self.dirty = true;
        } else if total < self.state.cumulative {
            debug!(
                reported_ms = total.as_millis() as u64,
                kept_ms = self.cumulative_ms(),
                "source reported a lower total; keeping counter"
            );
        }
    }

    fn refresh_foreground(&mut self, now: DateTime<Local>) {
        let lookback = chrono::Duration::from_std(self.config.lookback())
            .unwrap_or_else(|_| chrono::Duration::seconds(20));
        match self.parts.source.query_foreground_events(now - lookback, now) {
            Ok(events) => {
                let next = track_foreground(
                    &events,
                    self.state.current_foreground_app.as_ref(),
                    self.config.stale_foreground,
                );
                if next != self.state.current_foreground_app {
                    info!(from = ?self.state.current_foreground_app, to = ?next, "foreground app changed");
                    self.state.current_foreground_app = next;
                }
            }
            Err(e) => warn!(error = %e, "usage event query failed; keeping foreground app"),
        }
    }

    fn verdict(&self) -> Verdict {
        evaluate(
            &self.settings,
            self.state.cumulative,
            self.state.current_foreground_app.as_ref(),
        )
    }

    fn emit_status(&self, verdict: &Verdict, now: DateTime<Local>) {
        if self.dirty {
            debug!(
                cumulative_ms = self.cumulative_ms(),
                "counter not yet saved; reporting the stored value"
            );
        }
        self.parts.sink.emit(Event::StatusSnapshot {
            cumulative_millis: self.saved_cumulative_ms(),
            limit_millis: self.settings.daily_limit_ms(),
            tasks_complete: self.settings.tasks_complete,
            is_blocking: verdict.should_block,
            current_foreground_app: self
                .state
                .current_foreground_app
                .as_ref()
                .map(|a| a.as_str().to_string()),
            at: now,
        });
    }

    fn request_block(&mut self, now: DateTime<Local>) {
        let Some(app) = self.state.current_foreground_app.clone() else {
            return;
        };
        if !self.permissions.overlay {
            warn!(%app, "blocking prompt needed but overlay permission is missing");
            return;
        }
        warn!(%app, "limit reached while distracting app is in foreground; requesting block");
        match self.parts.surface.show_blocking_prompt(&self.block_message) {
            Ok(()) => {
                self.block_requested = true;
                self.parts.sink.emit(Event::BlockingPromptRequested {
                    message: self.block_message.clone(),
                    app: app.to_string(),
                    at: now,
                });
            }
            Err(e) => error!(error = %e, "failed to request blocking prompt"),
        }
    }

    fn persist(&mut self) {
        let record = self.state.record();
        match self.parts.store.save_counter(&record) {
            Ok(()) => {
                self.persisted = Some(record);
                self.dirty = false;
            }
            Err(e) => warn!(error = %e, "failed to persist usage counter; will retry"),
        }
    }

    fn renew_wake_lock(&mut self) {
        if self.parts.wake_lock.is_held() {
            return;
        }
        match self.parts.wake_lock.acquire(self.config.wake_lock_ceiling()) {
            Ok(()) => debug!("monitor wake-lock acquired"),
            Err(e) => warn!(error = %e, "monitor wake-lock unavailable"),
        }
    }

    fn release_wake_lock(&mut self) {
        if self.parts.wake_lock.is_held() {
            self.parts.wake_lock.release();
            debug!("monitor wake-lock released");
        }
    }

    fn cumulative_ms(&self) -> u64 {
        self.state.cumulative.as_millis() as u64
    }

    /// Counter as the store holds it for the tracking date. Sink events
    /// report this so no observer sees a value that was never saved.
    fn saved_cumulative_ms(&self) -> u64 {
        if !self.dirty {
            return self.cumulative_ms();
        }
        match &self.persisted {
            Some(record) if record.date == self.state.tracking_date => {
                record.cumulative.as_millis() as u64
            }
            _ => 0,
        }
    }
}

impl Drop for UsageMonitor {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop(Local::now());
        }
    }
}
