//! Scheduling alarms and receiving them when they fire.

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

use super::session::AlarmSession;
use crate::error::ScheduleError;
use crate::platform::{WakeGuard, WakeLock};

/// Platform alarm clock: wakes the device at an exact time and hands the
/// task to an [`AlarmReceiver`].
pub trait AlarmClock: Send {
    /// Whether exact alarms may be scheduled.
    fn can_schedule_exact(&self) -> bool;

    fn schedule_one_shot(&mut self, at: DateTime<Local>, task: &str) -> Result<(), ScheduleError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledAlarm {
    pub at: DateTime<Local>,
    pub task: String,
}

pub struct AlarmScheduler<C> {
    clock: C,
}

impl<C: AlarmClock> AlarmScheduler<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Schedule `task` to fire at `at`.
    ///
    /// # Errors
    /// `PermissionDenied` without exact-alarm permission, `InPast` when `at`
    /// is not after `now`, or whatever the clock reports.
    pub fn schedule_at(
        &mut self,
        at: DateTime<Local>,
        task: &str,
        now: DateTime<Local>,
    ) -> Result<ScheduledAlarm, ScheduleError> {
        if !self.clock.can_schedule_exact() {
            warn!(%task, "exact alarm permission missing");
            return Err(ScheduleError::PermissionDenied);
        }
        if at <= now {
            return Err(ScheduleError::InPast { at });
        }
        self.clock.schedule_one_shot(at, task)?;
        info!(%at, %task, "alarm scheduled");
        Ok(ScheduledAlarm {
            at,
            task: task.to_string(),
        })
    }

    /// Schedule `task` to fire `delay` from `now`.
    pub fn schedule_in(
        &mut self,
        delay: Duration,
        task: &str,
        now: DateTime<Local>,
    ) -> Result<ScheduledAlarm, ScheduleError> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| ScheduleError::Rejected(format!("delay out of range: {e}")))?;
        self.schedule_at(now + delay, task, now)
    }
}

/// The receiving edge of a fired alarm.
///
/// Holds its own short wake-lock while handing the alarm to the session so
/// the device cannot sleep before the session has taken its own.
pub struct AlarmReceiver {
    wake_lock: Box<dyn WakeLock>,
    ceiling: Duration,
}

impl AlarmReceiver {
    pub fn new(wake_lock: Box<dyn WakeLock>, ceiling: Duration) -> Self {
        Self { wake_lock, ceiling }
    }

    pub fn deliver(&mut self, session: &mut AlarmSession, task: &str, now: DateTime<Local>) {
        let _guard = match WakeGuard::acquire(&mut *self.wake_lock, self.ceiling) {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(error = %e, "receiver wake-lock unavailable; delivering anyway");
                None
            }
        };
        session.fire(task, now);
    }

    pub fn is_holding(&self) -> bool {
        self.wake_lock.is_held()
    }
}
