//! Cancelable single-shot timer.
//!
//! Like the rest of the engine this timer has no thread of its own: the
//! owner asks [`OneShot::take_due`] whether the deadline has passed and acts
//! on the returned token. Every `arm`/`cancel` bumps a generation counter, so
//! a token taken before a cancel is recognised as stale by
//! [`OneShot::is_live`] and its action can be suppressed.
//!
//! ## Usage
//!
//! ```ignore
//! let mut timer = OneShot::new();
//! timer.arm(now + delay);
//! // later, from the driver:
//! if let Some(token) = timer.take_due(now) {
//!     if timer.is_live(token) { /* fire */ }
//! }
//! ```

use chrono::{DateTime, Local};

/// Identifies one arming of a [`OneShot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Default)]
pub struct OneShot {
    due: Option<DateTime<Local>>,
    generation: u64,
}

impl OneShot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule the timer, replacing any pending deadline.
    pub fn arm(&mut self, at: DateTime<Local>) -> TimerToken {
        self.generation = self.generation.wrapping_add(1);
        self.due = Some(at);
        TimerToken(self.generation)
    }

    /// Drop the pending deadline. Tokens handed out earlier become stale.
    pub fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.due.is_some()
    }

    pub fn due_at(&self) -> Option<DateTime<Local>> {
        self.due
    }

    /// Disarm and return the token if the deadline has passed.
    pub fn take_due(&mut self, now: DateTime<Local>) -> Option<TimerToken> {
        match self.due {
            Some(at) if at <= now => {
                self.due = None;
                Some(TimerToken(self.generation))
            }
            _ => None,
        }
    }

    /// True while no `arm`/`cancel` happened since `token` was issued.
    pub fn is_live(&self, token: TimerToken) -> bool {
        token.0 == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fires_once_at_deadline() {
        let now = Local::now();
        let mut timer = OneShot::new();
        timer.arm(now + Duration::seconds(30));

        assert!(timer.take_due(now).is_none());
        assert!(timer.take_due(now + Duration::seconds(29)).is_none());

        let token = timer.take_due(now + Duration::seconds(30)).unwrap();
        assert!(timer.is_live(token));
        assert!(!timer.is_armed());
        assert!(timer.take_due(now + Duration::seconds(60)).is_none());
    }

    #[test]
    fn cancel_after_take_makes_token_stale() {
        let now = Local::now();
        let mut timer = OneShot::new();
        timer.arm(now);
        let token = timer.take_due(now).unwrap();
        timer.cancel();
        assert!(!timer.is_live(token));
    }

    #[test]
    fn rearm_replaces_deadline() {
        let now = Local::now();
        let mut timer = OneShot::new();
        let first = timer.arm(now + Duration::seconds(10));
        let second = timer.arm(now + Duration::seconds(20));
        assert!(!timer.is_live(first));
        assert!(timer.is_live(second));
        assert!(timer.take_due(now + Duration::seconds(15)).is_none());
        assert_eq!(timer.due_at(), Some(now + Duration::seconds(20)));
    }
}
