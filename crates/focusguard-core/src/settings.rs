//! Discipline settings snapshot and permission flags.
//!
//! Settings are owned by the caller and swapped into the engine as a whole.
//! The engine never mutates a snapshot in place; every change produces a new
//! [`DisciplineSettings`] value.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable identifier of an installed application (package/bundle id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive identity used for every membership test.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AppId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AppId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Set of distracting application ids, compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct DistractingApps {
    folded: BTreeSet<String>,
}

impl DistractingApps {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let folded = ids
            .into_iter()
            .map(|s| s.as_ref().trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { folded }
    }

    pub fn contains(&self, app: &str) -> bool {
        self.folded.contains(&app.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.folded.is_empty()
    }

    pub fn len(&self) -> usize {
        self.folded.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.folded.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for DistractingApps {
    fn from(ids: Vec<String>) -> Self {
        Self::new(ids)
    }
}

impl From<DistractingApps> for Vec<String> {
    fn from(apps: DistractingApps) -> Self {
        apps.folded.into_iter().collect()
    }
}

/// One consistent settings snapshot read by a single evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisciplineSettings {
    /// Master enable switch.
    pub active: bool,
    /// Whether reaching the limit blocks, or only tracks.
    pub block_on_limit: bool,
    /// Budget for distracting-app usage per calendar day.
    #[serde(with = "duration_ms")]
    pub daily_limit: Duration,
    pub distracting_apps: DistractingApps,
    /// External override: blocking is suppressed while true.
    pub tasks_complete: bool,
}

impl Default for DisciplineSettings {
    fn default() -> Self {
        Self {
            active: true,
            block_on_limit: true,
            daily_limit: Duration::from_secs(30 * 60),
            distracting_apps: DistractingApps::default(),
            tasks_complete: false,
        }
    }
}

impl DisciplineSettings {
    pub fn daily_limit_ms(&self) -> u64 {
        self.daily_limit.as_millis() as u64
    }

    /// Produce the next snapshot by overlaying the fields present in `update`.
    pub fn merged(&self, update: &SettingsUpdate) -> Self {
        Self {
            active: update.active.unwrap_or(self.active),
            block_on_limit: update.block_on_limit.unwrap_or(self.block_on_limit),
            daily_limit: update
                .daily_limit_minutes
                .map(|m| Duration::from_secs(u64::from(m) * 60))
                .unwrap_or(self.daily_limit),
            distracting_apps: update
                .distracting_apps
                .as_ref()
                .map(DistractingApps::new)
                .unwrap_or_else(|| self.distracting_apps.clone()),
            tasks_complete: self.tasks_complete,
        }
    }

    pub fn with_tasks_complete(&self, tasks_complete: bool) -> Self {
        Self {
            tasks_complete,
            ..self.clone()
        }
    }
}

/// Settings ingress payload. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub block_on_limit: Option<bool>,
    #[serde(default)]
    pub daily_limit_minutes: Option<u32>,
    #[serde(default)]
    pub distracting_apps: Option<Vec<String>>,
}

impl SettingsUpdate {
    /// Full update, as sent by `applySettings`.
    pub fn full(
        active: bool,
        block_on_limit: bool,
        daily_limit_minutes: u32,
        distracting_apps: Vec<String>,
    ) -> Self {
        Self {
            active: Some(active),
            block_on_limit: Some(block_on_limit),
            daily_limit_minutes: Some(daily_limit_minutes),
            distracting_apps: Some(distracting_apps),
        }
    }
}

/// Capability flags pushed by the host whenever it re-checks permissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    #[serde(default)]
    pub usage_stats: bool,
    #[serde(default)]
    pub overlay: bool,
}

impl Permissions {
    pub fn all() -> Self {
        Self {
            usage_stats: true,
            overlay: true,
        }
    }
}

/// A single permission change, queued until the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "permission", content = "granted", rename_all = "snake_case")]
pub enum PermissionChange {
    UsageStats(bool),
    Overlay(bool),
}

impl Permissions {
    pub fn apply(&mut self, change: PermissionChange) {
        match change {
            PermissionChange::UsageStats(granted) => self.usage_stats = granted,
            PermissionChange::Overlay(granted) => self.overlay = granted,
        }
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distracting_apps_match_case_insensitively() {
        let apps = DistractingApps::new(["Com.Instagram.Android", " app.x "]);
        assert!(apps.contains("com.instagram.android"));
        assert!(apps.contains("APP.X"));
        assert!(!apps.contains("app.y"));
        assert_eq!(apps.len(), 2);
    }

    #[test]
    fn empty_ids_are_dropped() {
        let apps = DistractingApps::new(["", "   "]);
        assert!(apps.is_empty());
    }

    #[test]
    fn merged_keeps_absent_fields() {
        let base = DisciplineSettings {
            distracting_apps: DistractingApps::new(["app.x"]),
            tasks_complete: true,
            ..DisciplineSettings::default()
        };
        let update = SettingsUpdate {
            daily_limit_minutes: Some(45),
            ..SettingsUpdate::default()
        };
        let next = base.merged(&update);
        assert_eq!(next.daily_limit, Duration::from_secs(45 * 60));
        assert!(next.active);
        assert!(next.tasks_complete);
        assert!(next.distracting_apps.contains("app.x"));
    }

    #[test]
    fn full_update_replaces_everything_but_tasks_flag() {
        let base = DisciplineSettings::default().with_tasks_complete(true);
        let next = base.merged(&SettingsUpdate::full(false, false, 10, vec!["a".into()]));
        assert!(!next.active);
        assert!(!next.block_on_limit);
        assert_eq!(next.daily_limit_ms(), 10 * 60 * 1000);
        assert!(next.distracting_apps.contains("A"));
        assert!(next.tasks_complete);
    }

    #[test]
    fn settings_serialize_limit_as_millis() {
        let json = serde_json::to_value(DisciplineSettings::default()).unwrap();
        assert_eq!(json["dailyLimit"], 1_800_000);
        assert_eq!(json["blockOnLimit"], true);
    }

    #[test]
    fn permission_change_applies() {
        let mut perms = Permissions::default();
        perms.apply(PermissionChange::UsageStats(true));
        assert!(perms.usage_stats);
        assert!(!perms.overlay);
        perms.apply(PermissionChange::Overlay(true));
        assert_eq!(perms, Permissions::all());
    }
}
