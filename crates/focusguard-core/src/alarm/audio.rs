//! Audio collaborator used by the alarm session.

use serde::{Deserialize, Serialize};

use crate::error::AudioError;

/// Outcome of an exclusive audio-focus request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusResult {
    Granted,
    Denied,
}

/// How focus was taken away. Every kind stops the alarm tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusLoss {
    Permanent,
    Transient,
    /// The system would let us keep playing quietly; an alarm does not duck.
    TransientCanDuck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneKind {
    Alarm,
    Notification,
}

/// The alarm audio stream: volume, focus and a looping player.
pub trait AudioOutput: Send {
    fn volume(&self) -> Result<u32, AudioError>;

    fn max_volume(&self) -> Result<u32, AudioError>;

    fn set_volume(&mut self, level: u32) -> Result<(), AudioError>;

    fn request_focus(&mut self) -> FocusResult;

    fn abandon_focus(&mut self);

    /// URI of the system default tone of `kind`, if one is configured.
    fn default_tone(&self, kind: ToneKind) -> Option<String>;

    fn play_looping(&mut self, uri: &str) -> Result<(), AudioError>;

    /// Stop and release the player. Safe to call when nothing is playing.
    fn stop(&mut self);
}

/// First available tone: the alarm tone, then the notification tone.
pub fn resolve_tone(audio: &dyn AudioOutput) -> Option<String> {
    audio
        .default_tone(ToneKind::Alarm)
        .or_else(|| audio.default_tone(ToneKind::Notification))
}
