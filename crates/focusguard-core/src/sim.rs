//! Deterministic in-process collaborators.
//!
//! Every type here is a cheap `Clone` over shared state: hand one clone to
//! the engine and keep another to script inputs and inspect what the engine
//! did. Used by the test-suite and by the CLI `simulate` command.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::alarm::{AlarmClock, AudioOutput, FocusResult, ToneKind};
use crate::error::{AccountingError, AudioError, PlatformError, ScheduleError};
use crate::platform::{AlarmSurface, BlockingSurface, ForegroundHost, WakeLock};
use crate::usage::{UsageAccountingSource, UsageEvent};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Accounting ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct AccountingInner {
    totals: HashMap<String, Duration>,
    events: Vec<UsageEvent>,
    failing: bool,
    unavailable: bool,
    aggregate_queries: usize,
}

/// Scripted usage accounting. Aggregates report the scripted totals as-is;
/// event queries filter the scripted log by the requested window.
#[derive(Debug, Clone, Default)]
pub struct SimAccounting {
    inner: Arc<Mutex<AccountingInner>>,
}

impl SimAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_total(&self, app: &str, total: Duration) {
        lock(&self.inner).totals.insert(app.to_string(), total);
    }

    pub fn add_total(&self, app: &str, extra: Duration) {
        *lock(&self.inner).totals.entry(app.to_string()).or_default() += extra;
    }

    /// Forget all totals (a new day in the accounting service).
    pub fn clear_totals(&self) {
        lock(&self.inner).totals.clear();
    }

    pub fn push_event(&self, event: UsageEvent) {
        lock(&self.inner).events.push(event);
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.inner).failing = failing;
    }

    /// The accounting service itself cannot be obtained.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.inner).unavailable = unavailable;
    }

    pub fn aggregate_queries(&self) -> usize {
        lock(&self.inner).aggregate_queries
    }
}

impl UsageAccountingSource for SimAccounting {
    fn query_aggregate_foreground_time(
        &self,
        _start: DateTime<Local>,
        _end: DateTime<Local>,
    ) -> Result<HashMap<String, Duration>, AccountingError> {
        let mut inner = lock(&self.inner);
        inner.aggregate_queries += 1;
        if inner.unavailable {
            return Err(AccountingError::Unavailable);
        }
        if inner.failing {
            return Err(AccountingError::QueryFailed("simulated failure".into()));
        }
        Ok(inner.totals.clone())
    }

    fn query_foreground_events(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<Vec<UsageEvent>, AccountingError> {
        let inner = lock(&self.inner);
        if inner.unavailable {
            return Err(AccountingError::Unavailable);
        }
        if inner.failing {
            return Err(AccountingError::QueryFailed("simulated failure".into()));
        }
        let mut events: Vec<UsageEvent> = inner
            .events
            .iter()
            .filter(|e| e.at >= start && e.at < end)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.at);
        Ok(events)
    }
}

// ── Wake-lock and foreground host ────────────────────────────────────

#[derive(Debug, Default)]
struct WakeInner {
    held: bool,
    acquisitions: usize,
    last_ceiling: Option<Duration>,
    failing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SimWakeLock {
    inner: Arc<Mutex<WakeInner>>,
}

impl SimWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held(&self) -> bool {
        lock(&self.inner).held
    }

    pub fn acquisitions(&self) -> usize {
        lock(&self.inner).acquisitions
    }

    pub fn last_ceiling(&self) -> Option<Duration> {
        lock(&self.inner).last_ceiling
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.inner).failing = failing;
    }

    /// Drop the lock as the platform does once its ceiling passes.
    pub fn expire(&self) {
        lock(&self.inner).held = false;
    }
}

impl WakeLock for SimWakeLock {
    fn acquire(&mut self, ceiling: Duration) -> Result<(), PlatformError> {
        let mut inner = lock(&self.inner);
        if inner.failing {
            return Err(PlatformError::WakeLock("simulated failure".into()));
        }
        inner.held = true;
        inner.acquisitions += 1;
        inner.last_ceiling = Some(ceiling);
        Ok(())
    }

    fn release(&mut self) {
        lock(&self.inner).held = false;
    }

    fn is_held(&self) -> bool {
        lock(&self.inner).held
    }
}

#[derive(Debug, Default)]
struct HostInner {
    foreground: bool,
    deny: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SimHost {
    inner: Arc<Mutex<HostInner>>,
}

impl SimHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_foreground(&self) -> bool {
        lock(&self.inner).foreground
    }

    pub fn set_deny(&self, deny: bool) {
        lock(&self.inner).deny = deny;
    }
}

impl ForegroundHost for SimHost {
    fn enter_foreground(&mut self) -> Result<(), PlatformError> {
        let mut inner = lock(&self.inner);
        if inner.deny {
            return Err(PlatformError::ForegroundDenied("simulated denial".into()));
        }
        inner.foreground = true;
        Ok(())
    }

    fn exit_foreground(&mut self) {
        lock(&self.inner).foreground = false;
    }
}

// ── Surfaces ─────────────────────────────────────────────────────────

/// One request made to a surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum SurfaceCall {
    BlockingPrompt { message: String },
    BlockingCleared,
    AlarmPrompt { task: String, snoozes_remaining: u8 },
    AlarmPromptRemoved,
    Notice { message: String },
}

/// Records every surface request. Implements both surface traits.
#[derive(Debug, Clone, Default)]
pub struct SimSurface {
    calls: Arc<Mutex<Vec<SurfaceCall>>>,
}

impl SimSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        lock(&self.calls).clone()
    }

    pub fn blocking_prompts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SurfaceCall::BlockingPrompt { .. }))
            .count()
    }

    pub fn notices(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Notice { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Whether the alarm prompt is currently requested.
    pub fn alarm_prompt_visible(&self) -> bool {
        let calls = lock(&self.calls);
        calls
            .iter()
            .rev()
            .find_map(|c| match c {
                SurfaceCall::AlarmPrompt { .. } => Some(true),
                SurfaceCall::AlarmPromptRemoved => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }

    fn push(&self, call: SurfaceCall) {
        lock(&self.calls).push(call);
    }
}

impl BlockingSurface for SimSurface {
    fn show_blocking_prompt(&mut self, message: &str) -> Result<(), PlatformError> {
        self.push(SurfaceCall::BlockingPrompt {
            message: message.to_string(),
        });
        Ok(())
    }

    fn clear_blocking_prompt(&mut self) {
        self.push(SurfaceCall::BlockingCleared);
    }
}

impl AlarmSurface for SimSurface {
    fn show_alarm_prompt(&mut self, task: &str, snoozes_remaining: u8) -> Result<(), PlatformError> {
        self.push(SurfaceCall::AlarmPrompt {
            task: task.to_string(),
            snoozes_remaining,
        });
        Ok(())
    }

    fn remove_alarm_prompt(&mut self) {
        self.push(SurfaceCall::AlarmPromptRemoved);
    }

    fn show_notice(&mut self, message: &str) {
        self.push(SurfaceCall::Notice {
            message: message.to_string(),
        });
    }
}

// ── Audio ────────────────────────────────────────────────────────────

#[derive(Debug)]
struct AudioInner {
    volume: u32,
    max_volume: u32,
    deny_focus: bool,
    focus_held: bool,
    alarm_tone: Option<String>,
    notification_tone: Option<String>,
    playing: Option<String>,
    fail_playback: bool,
    unavailable: bool,
    volume_locked: bool,
    plays: usize,
}

impl Default for AudioInner {
    fn default() -> Self {
        Self {
            volume: 3,
            max_volume: 7,
            deny_focus: false,
            focus_held: false,
            alarm_tone: Some("sim://tones/alarm".into()),
            notification_tone: Some("sim://tones/notification".into()),
            playing: None,
            fail_playback: false,
            unavailable: false,
            volume_locked: false,
            plays: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimAudio {
    inner: Arc<Mutex<AudioInner>>,
}

impl SimAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_volume(&self) -> u32 {
        lock(&self.inner).volume
    }

    pub fn set_levels(&self, volume: u32, max_volume: u32) {
        let mut inner = lock(&self.inner);
        inner.volume = volume;
        inner.max_volume = max_volume;
    }

    pub fn set_deny_focus(&self, deny: bool) {
        lock(&self.inner).deny_focus = deny;
    }

    pub fn set_fail_playback(&self, fail: bool) {
        lock(&self.inner).fail_playback = fail;
    }

    /// The audio system cannot be obtained at all.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.inner).unavailable = unavailable;
    }

    /// Volume changes are refused (do-not-disturb policy).
    pub fn set_volume_locked(&self, locked: bool) {
        lock(&self.inner).volume_locked = locked;
    }

    pub fn set_tones(&self, alarm: Option<&str>, notification: Option<&str>) {
        let mut inner = lock(&self.inner);
        inner.alarm_tone = alarm.map(str::to_string);
        inner.notification_tone = notification.map(str::to_string);
    }

    pub fn focus_held(&self) -> bool {
        lock(&self.inner).focus_held
    }

    /// URI currently looping, if any.
    pub fn playing(&self) -> Option<String> {
        lock(&self.inner).playing.clone()
    }

    pub fn plays(&self) -> usize {
        lock(&self.inner).plays
    }
}

impl AudioOutput for SimAudio {
    fn volume(&self) -> Result<u32, AudioError> {
        let inner = lock(&self.inner);
        if inner.unavailable {
            return Err(AudioError::Unavailable);
        }
        Ok(inner.volume)
    }

    fn max_volume(&self) -> Result<u32, AudioError> {
        let inner = lock(&self.inner);
        if inner.unavailable {
            return Err(AudioError::Unavailable);
        }
        Ok(inner.max_volume)
    }

    fn set_volume(&mut self, level: u32) -> Result<(), AudioError> {
        let mut inner = lock(&self.inner);
        if inner.unavailable {
            return Err(AudioError::Unavailable);
        }
        if inner.volume_locked {
            return Err(AudioError::PermissionDenied);
        }
        inner.volume = level;
        Ok(())
    }

    fn request_focus(&mut self) -> FocusResult {
        let mut inner = lock(&self.inner);
        if inner.deny_focus {
            return FocusResult::Denied;
        }
        inner.focus_held = true;
        FocusResult::Granted
    }

    fn abandon_focus(&mut self) {
        lock(&self.inner).focus_held = false;
    }

    fn default_tone(&self, kind: ToneKind) -> Option<String> {
        let inner = lock(&self.inner);
        match kind {
            ToneKind::Alarm => inner.alarm_tone.clone(),
            ToneKind::Notification => inner.notification_tone.clone(),
        }
    }

    fn play_looping(&mut self, uri: &str) -> Result<(), AudioError> {
        let mut inner = lock(&self.inner);
        if inner.fail_playback {
            return Err(AudioError::Playback("simulated player failure".into()));
        }
        inner.playing = Some(uri.to_string());
        inner.plays += 1;
        Ok(())
    }

    fn stop(&mut self) {
        lock(&self.inner).playing = None;
    }
}

// ── Alarm clock ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ClockInner {
    exact_allowed: bool,
    pending: Vec<(DateTime<Local>, String)>,
}

/// Alarm clock that keeps scheduled alarms until the driver collects them.
#[derive(Debug, Clone)]
pub struct SimAlarmClock {
    inner: Arc<Mutex<ClockInner>>,
}

impl Default for SimAlarmClock {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                exact_allowed: true,
                pending: Vec::new(),
            })),
        }
    }
}

impl SimAlarmClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_exact_allowed(&self, allowed: bool) {
        lock(&self.inner).exact_allowed = allowed;
    }

    pub fn pending(&self) -> Vec<(DateTime<Local>, String)> {
        lock(&self.inner).pending.clone()
    }

    pub fn next_due(&self) -> Option<DateTime<Local>> {
        lock(&self.inner).pending.iter().map(|(at, _)| *at).min()
    }

    /// Remove and return the tasks due at `now`, earliest first.
    pub fn take_due(&self, now: DateTime<Local>) -> Vec<String> {
        let mut inner = lock(&self.inner);
        let mut due: Vec<(DateTime<Local>, String)> = Vec::new();
        inner.pending.retain(|(at, task)| {
            if *at <= now {
                due.push((*at, task.clone()));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, task)| task).collect()
    }
}

impl AlarmClock for SimAlarmClock {
    fn can_schedule_exact(&self) -> bool {
        lock(&self.inner).exact_allowed
    }

    fn schedule_one_shot(&mut self, at: DateTime<Local>, task: &str) -> Result<(), ScheduleError> {
        lock(&self.inner).pending.push((at, task.to_string()));
        Ok(())
    }
}
