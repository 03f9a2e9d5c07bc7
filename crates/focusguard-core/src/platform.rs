//! Seams to the host platform.
//!
//! The engine requests things through these traits and never assumes a
//! request succeeded beyond the returned `Result`. Each subsystem gets its
//! own instances; a wake-lock or surface is never shared between the monitor
//! and the alarm session.

use std::time::Duration;

use crate::error::PlatformError;

/// A partial wake-lock with a timeout ceiling.
pub trait WakeLock: Send {
    /// Acquire (or re-acquire) the lock. The platform releases it on its own
    /// once `ceiling` elapses.
    fn acquire(&mut self, ceiling: Duration) -> Result<(), PlatformError>;

    fn release(&mut self);

    fn is_held(&self) -> bool;
}

/// Elevated, foreground execution for a long-running subsystem.
pub trait ForegroundHost: Send {
    fn enter_foreground(&mut self) -> Result<(), PlatformError>;

    fn exit_foreground(&mut self);
}

/// Where the monitor asks for the blocking prompt.
pub trait BlockingSurface: Send {
    fn show_blocking_prompt(&mut self, message: &str) -> Result<(), PlatformError>;

    /// Called when a previously requested block no longer applies. Hosts
    /// that detect dismissal on their own can ignore it.
    fn clear_blocking_prompt(&mut self) {}
}

/// Where the alarm session asks for its prompt and notices.
pub trait AlarmSurface: Send {
    fn show_alarm_prompt(
        &mut self,
        task: &str,
        snoozes_remaining: u8,
    ) -> Result<(), PlatformError>;

    fn remove_alarm_prompt(&mut self);

    /// Short user-visible notice ("No snoozes left!").
    fn show_notice(&mut self, message: &str);
}

/// RAII holder that releases a borrowed wake-lock on every exit path.
pub struct WakeGuard<'a> {
    lock: &'a mut dyn WakeLock,
}

impl<'a> WakeGuard<'a> {
    pub fn acquire(
        lock: &'a mut dyn WakeLock,
        ceiling: Duration,
    ) -> Result<Self, PlatformError> {
        lock.acquire(ceiling)?;
        Ok(Self { lock })
    }
}

impl Drop for WakeGuard<'_> {
    fn drop(&mut self) {
        if self.lock.is_held() {
            self.lock.release();
        }
    }
}
