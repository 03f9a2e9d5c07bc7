//! Alarm session: a sounding task reminder with snooze and dismiss.

pub mod audio;
mod scheduler;
mod session;

pub use audio::{resolve_tone, AudioOutput, FocusLoss, FocusResult, ToneKind};
pub use scheduler::{AlarmClock, AlarmReceiver, AlarmScheduler, ScheduledAlarm};
pub use session::{AlarmInput, AlarmParts, AlarmSession, AlarmState, NO_SNOOZES_LEFT};
