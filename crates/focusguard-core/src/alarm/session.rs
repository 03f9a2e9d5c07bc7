//! Alarm session state machine.
//!
//! One session at a time. A session is created by `fire`, survives snoozes
//! and focus changes, and ends on dismiss or on an unrecoverable audio
//! failure. Every exit path goes through the same teardown, so volume,
//! focus, wake-lock and prompt are always handed back.
//!
//! ## State Machine
//!
//! ```text
//!        fire                snooze (remaining > 0)
//! Idle ---------> Sounding ------------------------> Snoozed
//!  ^                 |  ^                               |
//!  |    dismiss /    |  +------- countdown elapsed ------+
//!  +--- abort -------+           (still snoozed)        |
//!  +---------------------- dismiss ---------------------+
//! ```
//!
//! The snooze countdown is a [`OneShot`]; the driver calls
//! [`AlarmSession::poll`] when [`AlarmSession::next_due`] passes.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::audio::{resolve_tone, AudioOutput, FocusLoss, FocusResult};
use crate::error::AudioError;
use crate::events::{Event, EventSink};
use crate::platform::{AlarmSurface, ForegroundHost, WakeLock};
use crate::storage::AlarmConfig;
use crate::timer::OneShot;

pub const NO_SNOOZES_LEFT: &str = "No snoozes left!";

/// Collaborators owned by the alarm session.
pub struct AlarmParts {
    pub audio: Box<dyn AudioOutput>,
    pub wake_lock: Box<dyn WakeLock>,
    pub host: Box<dyn ForegroundHost>,
    pub surface: Box<dyn AlarmSurface>,
    pub sink: Box<dyn EventSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmState {
    Idle,
    Sounding,
    Snoozed,
}

/// Named inputs of the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "input", rename_all = "snake_case")]
pub enum AlarmInput {
    Fire { task: String },
    Snooze,
    Dismiss,
    FocusGranted,
    FocusLost { kind: FocusLoss },
    PlaybackError { message: String },
}

#[derive(Debug)]
struct Live {
    id: String,
    task: String,
    snoozes_remaining: u8,
    original_volume: Option<u32>,
    tone: Option<String>,
    playing: bool,
    focus_held: bool,
    in_foreground: bool,
}

pub struct AlarmSession {
    config: AlarmConfig,
    state: AlarmState,
    live: Option<Live>,
    countdown: OneShot,
    parts: AlarmParts,
}

impl AlarmSession {
    pub fn new(config: AlarmConfig, parts: AlarmParts) -> Self {
        Self {
            config,
            state: AlarmState::Idle,
            live: None,
            countdown: OneShot::new(),
            parts,
        }
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.live.as_ref().map(|l| l.id.as_str())
    }

    pub fn task(&self) -> Option<&str> {
        self.live.as_ref().map(|l| l.task.as_str())
    }

    pub fn snoozes_remaining(&self) -> Option<u8> {
        self.live.as_ref().map(|l| l.snoozes_remaining)
    }

    pub fn is_playing(&self) -> bool {
        self.live.as_ref().is_some_and(|l| l.playing)
    }

    /// When the snooze countdown elapses, if one is pending.
    pub fn next_due(&self) -> Option<DateTime<Local>> {
        self.countdown.due_at()
    }

    /// Dispatch one named input.
    pub fn handle(&mut self, input: AlarmInput, now: DateTime<Local>) {
        match input {
            AlarmInput::Fire { task } => self.fire(task, now),
            AlarmInput::Snooze => self.snooze(now),
            AlarmInput::Dismiss => self.dismiss(now),
            AlarmInput::FocusGranted => self.focus_granted(now),
            AlarmInput::FocusLost { kind } => self.focus_lost(kind, now),
            AlarmInput::PlaybackError { message } => self.playback_error(&message, now),
        }
    }

    /// Start a session for `task`. Ignored while one is already live.
    pub fn fire(&mut self, task: impl Into<String>, now: DateTime<Local>) {
        let task = task.into();
        if self.state != AlarmState::Idle {
            info!(%task, state = ?self.state, "alarm already active; ignoring fire");
            return;
        }

        let id = Uuid::new_v4().to_string();
        info!(session = %id, %task, "alarm fired");
        self.live = Some(Live {
            id,
            task,
            snoozes_remaining: self.config.max_snoozes,
            original_volume: None,
            tone: None,
            playing: false,
            focus_held: false,
            in_foreground: false,
        });

        self.ensure_wake_lock();
        match self.parts.host.enter_foreground() {
            Ok(()) => {
                if let Some(live) = self.live.as_mut() {
                    live.in_foreground = true;
                }
            }
            Err(e) => {
                error!(error = %e, "alarm could not enter foreground mode");
                self.abort(&format!("foreground mode unavailable: {e}"), now);
                return;
            }
        }
        self.start_sounding(now);
    }

    pub fn snooze(&mut self, now: DateTime<Local>) {
        let Some(live) = self.live.as_mut() else {
            debug!("snooze without an alarm; ignoring");
            return;
        };
        if live.snoozes_remaining == 0 {
            info!(session = %live.id, "snooze rejected: none left");
            let id = live.id.clone();
            self.parts.surface.show_notice(NO_SNOOZES_LEFT);
            self.parts.sink.emit(Event::SnoozeRejected { session_id: id, at: now });
            return;
        }
        if self.state == AlarmState::Snoozed {
            debug!(session = %live.id, "already snoozed; ignoring");
            return;
        }

        live.snoozes_remaining -= 1;
        live.playing = false;
        live.focus_held = false;
        let (id, task, remaining) = (live.id.clone(), live.task.clone(), live.snoozes_remaining);

        self.parts.audio.stop();
        self.parts.audio.abandon_focus();
        self.state = AlarmState::Snoozed;

        let delay = chrono::Duration::from_std(self.config.snooze_delay())
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let resume_at = now + delay;
        self.countdown.arm(resume_at);

        if let Err(e) = self.parts.surface.show_alarm_prompt(&task, remaining) {
            warn!(error = %e, "failed to update alarm prompt");
        }
        info!(session = %id, remaining, %resume_at, "alarm snoozed");
        self.parts.sink.emit(Event::AlarmSnoozed {
            session_id: id,
            snoozes_remaining: remaining,
            resume_at,
            at: now,
        });
    }

    /// Resume a snoozed alarm once its countdown has elapsed.
    pub fn poll(&mut self, now: DateTime<Local>) {
        let Some(token) = self.countdown.take_due(now) else {
            return;
        };
        if !self.countdown.is_live(token) || self.state != AlarmState::Snoozed {
            debug!(state = ?self.state, "stale snooze countdown; ignoring");
            return;
        }
        info!(session = ?self.session_id(), "snooze elapsed; sounding again");
        self.start_sounding(now);
    }

    pub fn dismiss(&mut self, now: DateTime<Local>) {
        if self.live.is_none() {
            debug!("dismiss without an alarm; ignoring");
            return;
        }
        if let Some(id) = self.teardown() {
            info!(session = %id, "alarm dismissed");
            self.parts.sink.emit(Event::AlarmDismissed { session_id: id, at: now });
        }
    }

    fn focus_lost(&mut self, kind: FocusLoss, now: DateTime<Local>) {
        if self.state != AlarmState::Sounding {
            debug!(?kind, state = ?self.state, "focus loss outside sounding; ignoring");
            return;
        }
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if !live.playing {
            return;
        }
        live.playing = false;
        let id = live.id.clone();
        self.parts.audio.stop();
        info!(session = %id, ?kind, "audio focus lost; tone paused");
        self.parts.sink.emit(Event::AlarmPlaybackPaused { session_id: id, at: now });
    }

    fn focus_granted(&mut self, now: DateTime<Local>) {
        if self.state != AlarmState::Sounding {
            debug!(state = ?self.state, "focus gain outside sounding; ignoring");
            return;
        }
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if live.playing {
            return;
        }
        let Some(tone) = live.tone.clone() else {
            return;
        };
        match self.parts.audio.play_looping(&tone) {
            Ok(()) => {
                live.playing = true;
                info!(session = %live.id, "audio focus regained; tone resumed");
            }
            Err(e) => self.abort(&format!("playback failed: {e}"), now),
        }
    }

    fn playback_error(&mut self, message: &str, now: DateTime<Local>) {
        if self.live.is_none() {
            return;
        }
        error!(%message, "alarm player error");
        self.abort(&format!("playback failed: {message}"), now);
    }

    /// Entry actions of `Sounding`.
    fn start_sounding(&mut self, now: DateTime<Local>) {
        self.ensure_wake_lock();
        if let Err(e) = self.raise_volume() {
            error!(error = %e, "audio system unavailable; aborting alarm");
            self.abort(&e.to_string(), now);
            return;
        }

        let Some(tone) = resolve_tone(self.parts.audio.as_ref()) else {
            error!("no alarm or notification tone available");
            self.abort("no tone available", now);
            return;
        };

        if self.parts.audio.request_focus() == FocusResult::Denied {
            warn!("audio focus denied; aborting alarm");
            self.abort("audio focus denied", now);
            return;
        }
        if let Some(live) = self.live.as_mut() {
            live.focus_held = true;
        }

        if let Err(e) = self.parts.audio.play_looping(&tone) {
            error!(error = %e, "failed to start alarm tone");
            self.abort(&format!("playback failed: {e}"), now);
            return;
        }

        let Some(live) = self.live.as_mut() else {
            return;
        };
        live.tone = Some(tone);
        live.playing = true;
        self.state = AlarmState::Sounding;
        let (id, task, remaining) = (live.id.clone(), live.task.clone(), live.snoozes_remaining);

        if let Err(e) = self.parts.surface.show_alarm_prompt(&task, remaining) {
            warn!(error = %e, "failed to show alarm prompt");
        }
        self.parts.sink.emit(Event::AlarmSounding {
            session_id: id,
            task,
            snoozes_remaining: remaining,
            at: now,
        });
    }

    fn ensure_wake_lock(&mut self) {
        if self.parts.wake_lock.is_held() {
            return;
        }
        if let Err(e) = self.parts.wake_lock.acquire(self.config.wake_lock_ceiling()) {
            warn!(error = %e, "alarm wake-lock unavailable");
        }
    }

    /// Capture the current volume once per session, then go to max.
    /// Only an unavailable audio system is an error; refused or failed
    /// volume calls leave the alarm at its current level.
    fn raise_volume(&mut self) -> Result<(), AudioError> {
        let Some(live) = self.live.as_mut() else {
            return Ok(());
        };
        if live.original_volume.is_none() {
            match self.parts.audio.volume() {
                Ok(v) => live.original_volume = Some(v),
                Err(AudioError::Unavailable) => return Err(AudioError::Unavailable),
                Err(e) => warn!(error = %e, "could not read alarm volume"),
            }
        }
        match self.parts.audio.max_volume() {
            Ok(max) => match self.parts.audio.set_volume(max) {
                Ok(()) => {}
                Err(AudioError::Unavailable) => return Err(AudioError::Unavailable),
                Err(e) => warn!(error = %e, "could not raise alarm volume"),
            },
            Err(AudioError::Unavailable) => return Err(AudioError::Unavailable),
            Err(e) => warn!(error = %e, "could not read max alarm volume"),
        }
        Ok(())
    }

    fn abort(&mut self, reason: &str, now: DateTime<Local>) {
        if let Some(id) = self.teardown() {
            warn!(session = %id, %reason, "alarm aborted");
            self.parts.sink.emit(Event::AlarmAborted {
                session_id: id,
                reason: reason.to_string(),
                at: now,
            });
        }
    }

    /// Release everything the session holds and return to `Idle`.
    fn teardown(&mut self) -> Option<String> {
        let live = self.live.take()?;
        self.countdown.cancel();
        self.parts.audio.stop();
        if live.focus_held {
            self.parts.audio.abandon_focus();
        }
        self.parts.surface.remove_alarm_prompt();

        if let Some(original) = live.original_volume {
            let level = match self.parts.audio.max_volume() {
                Ok(max) => original.min(max),
                Err(_) => original,
            };
            if let Err(e) = self.parts.audio.set_volume(level) {
                warn!(error = %e, "could not restore alarm volume");
            }
        }
        if self.parts.wake_lock.is_held() {
            self.parts.wake_lock.release();
        }
        if live.in_foreground {
            self.parts.host.exit_foreground();
        }
        self.state = AlarmState::Idle;
        Some(live.id)
    }
}

impl Drop for AlarmSession {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventRecorder;
    use crate::sim::{SimAudio, SimHost, SimSurface, SimWakeLock};
    use chrono::TimeZone;

    struct Rig {
        audio: SimAudio,
        wake: SimWakeLock,
        host: SimHost,
        surface: SimSurface,
        events: EventRecorder,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                audio: SimAudio::new(),
                wake: SimWakeLock::new(),
                host: SimHost::new(),
                surface: SimSurface::new(),
                events: EventRecorder::new(),
            }
        }

        fn session(&self) -> AlarmSession {
            AlarmSession::new(
                AlarmConfig::default(),
                AlarmParts {
                    audio: Box::new(self.audio.clone()),
                    wake_lock: Box::new(self.wake.clone()),
                    host: Box::new(self.host.clone()),
                    surface: Box::new(self.surface.clone()),
                    sink: Box::new(self.events.clone()),
                },
            )
        }
    }

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap()
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn fire_sounds_at_max_volume() {
        let rig = Rig::new();
        let mut s = rig.session();
        s.fire("Write report", t0());

        assert_eq!(s.state(), AlarmState::Sounding);
        assert_eq!(s.snoozes_remaining(), Some(3));
        assert_eq!(rig.audio.current_volume(), 7);
        assert_eq!(rig.audio.playing().as_deref(), Some("sim://tones/alarm"));
        assert!(rig.wake.held());
        assert!(rig.host.in_foreground());
        assert!(rig.surface.alarm_prompt_visible());
    }

    #[test]
    fn second_fire_is_ignored() {
        let rig = Rig::new();
        let mut s = rig.session();
        s.fire("a", t0());
        let id = s.session_id().map(str::to_string);
        s.fire("b", t0() + secs(1));
        assert_eq!(s.session_id().map(str::to_string), id);
        assert_eq!(s.task(), Some("a"));
    }

    #[test]
    fn notification_tone_is_the_fallback() {
        let rig = Rig::new();
        rig.audio.set_tones(None, Some("sim://n"));
        let mut s = rig.session();
        s.fire("t", t0());
        assert_eq!(rig.audio.playing().as_deref(), Some("sim://n"));
    }

    #[test]
    fn missing_tones_abort() {
        let rig = Rig::new();
        rig.audio.set_tones(None, None);
        let mut s = rig.session();
        s.fire("t", t0());
        assert_eq!(s.state(), AlarmState::Idle);
        assert!(!rig.wake.held());
        assert!(matches!(rig.events.events().last(), Some(Event::AlarmAborted { .. })));
    }

    #[test]
    fn snooze_pauses_and_resumes_after_delay() {
        let rig = Rig::new();
        let mut s = rig.session();
        s.fire("t", t0());
        s.snooze(t0() + secs(5));

        assert_eq!(s.state(), AlarmState::Snoozed);
        assert_eq!(s.snoozes_remaining(), Some(2));
        assert!(rig.audio.playing().is_none());
        assert!(!rig.audio.focus_held());
        assert!(rig.wake.held());
        assert_eq!(s.next_due(), Some(t0() + secs(35)));

        s.poll(t0() + secs(34));
        assert_eq!(s.state(), AlarmState::Snoozed);
        s.poll(t0() + secs(35));
        assert_eq!(s.state(), AlarmState::Sounding);
        assert!(rig.audio.playing().is_some());
    }

    #[test]
    fn snooze_while_snoozed_is_a_no_op() {
        let rig = Rig::new();
        let mut s = rig.session();
        s.fire("t", t0());
        s.snooze(t0());
        s.snooze(t0() + secs(1));
        assert_eq!(s.snoozes_remaining(), Some(2));
        assert_eq!(s.next_due(), Some(t0() + secs(30)));
    }

    #[test]
    fn dismiss_during_snooze_cancels_the_countdown() {
        let rig = Rig::new();
        let mut s = rig.session();
        s.fire("t", t0());
        s.snooze(t0());
        s.dismiss(t0() + secs(10));
        s.poll(t0() + secs(30));

        assert_eq!(s.state(), AlarmState::Idle);
        assert!(rig.audio.playing().is_none());
        assert_eq!(rig.audio.plays(), 1);
    }

    #[test]
    fn dismiss_restores_everything() {
        let rig = Rig::new();
        rig.audio.set_levels(2, 7);
        let mut s = rig.session();
        s.fire("t", t0());
        s.dismiss(t0() + secs(1));

        assert_eq!(s.state(), AlarmState::Idle);
        assert!(s.session_id().is_none());
        assert_eq!(rig.audio.current_volume(), 2);
        assert!(!rig.audio.focus_held());
        assert!(!rig.wake.held());
        assert!(!rig.host.in_foreground());
        assert!(!rig.surface.alarm_prompt_visible());
        assert!(matches!(rig.events.events().last(), Some(Event::AlarmDismissed { .. })));
    }

    #[test]
    fn dismiss_when_idle_does_nothing() {
        let rig = Rig::new();
        let mut s = rig.session();
        s.dismiss(t0());
        assert!(rig.events.events().is_empty());
        assert!(rig.surface.calls().is_empty());
    }

    #[test]
    fn focus_loss_pauses_and_gain_resumes() {
        let rig = Rig::new();
        let mut s = rig.session();
        s.fire("t", t0());
        s.handle(AlarmInput::FocusLost { kind: FocusLoss::TransientCanDuck }, t0() + secs(1));
        assert_eq!(s.state(), AlarmState::Sounding);
        assert!(!s.is_playing());
        assert!(rig.wake.held());

        s.handle(AlarmInput::FocusGranted, t0() + secs(2));
        assert!(s.is_playing());
        assert_eq!(rig.audio.plays(), 2);
    }

    #[test]
    fn focus_gain_while_snoozed_does_not_resume() {
        let rig = Rig::new();
        let mut s = rig.session();
        s.fire("t", t0());
        s.snooze(t0());
        s.handle(AlarmInput::FocusGranted, t0() + secs(1));
        assert_eq!(s.state(), AlarmState::Snoozed);
        assert!(rig.audio.playing().is_none());
    }

    #[test]
    fn playback_error_tears_down() {
        let rig = Rig::new();
        let mut s = rig.session();
        s.fire("t", t0());
        s.handle(
            AlarmInput::PlaybackError {
                message: "decoder died".into(),
            },
            t0() + secs(1),
        );
        assert_eq!(s.state(), AlarmState::Idle);
        assert!(!rig.wake.held());
        assert_eq!(rig.audio.current_volume(), 3);
    }

    #[test]
    fn foreground_denial_aborts_fire() {
        let rig = Rig::new();
        rig.host.set_deny(true);
        let mut s = rig.session();
        s.fire("t", t0());
        assert_eq!(s.state(), AlarmState::Idle);
        assert!(!rig.wake.held());
        assert_eq!(rig.audio.plays(), 0);
    }

    #[test]
    fn restored_volume_is_clamped_to_max() {
        let rig = Rig::new();
        rig.audio.set_levels(9, 9);
        let mut s = rig.session();
        s.fire("t", t0());
        rig.audio.set_levels(9, 5);
        s.dismiss(t0() + secs(1));
        assert_eq!(rig.audio.current_volume(), 5);
    }

    #[test]
    fn unavailable_audio_aborts_the_session() {
        let rig = Rig::new();
        rig.audio.set_unavailable(true);
        let mut s = rig.session();
        s.fire("t", t0());

        assert_eq!(s.state(), AlarmState::Idle);
        assert!(rig.audio.playing().is_none());
        assert!(!rig.wake.held());
        assert!(!rig.host.in_foreground());
        assert!(matches!(
            rig.events.events().last(),
            Some(Event::AlarmAborted { .. })
        ));
    }

    #[test]
    fn refused_volume_change_still_sounds() {
        let rig = Rig::new();
        rig.audio.set_volume_locked(true);
        let mut s = rig.session();
        s.fire("t", t0());

        assert_eq!(s.state(), AlarmState::Sounding);
        assert_eq!(rig.audio.current_volume(), 3);
        assert!(rig.audio.playing().is_some());

        s.dismiss(t0() + secs(1));
        assert_eq!(s.state(), AlarmState::Idle);
        assert_eq!(rig.audio.current_volume(), 3);
    }
}
