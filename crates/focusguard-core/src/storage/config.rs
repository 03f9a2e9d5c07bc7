//! TOML-based engine configuration.
//!
//! Stores:
//! - Usage monitor cadence and wake-lock ceilings
//! - Alarm snooze policy
//! - Default discipline settings applied before the host sends its own
//!
//! Configuration is stored at `~/.config/focusguard/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::settings::{DisciplineSettings, DistractingApps};
use crate::usage::StaleForeground;

/// Usage monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Extra look-back added to the event window on top of one interval.
    #[serde(default = "default_lookback_slack_secs")]
    pub lookback_slack_secs: u64,
    #[serde(default = "default_wake_lock_ceiling_secs")]
    pub wake_lock_ceiling_secs: u64,
    #[serde(default)]
    pub stale_foreground: StaleForeground,
}

/// Alarm session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmConfig {
    #[serde(default = "default_max_snoozes")]
    pub max_snoozes: u8,
    #[serde(default = "default_snooze_delay_secs")]
    pub snooze_delay_secs: u64,
    #[serde(default = "default_wake_lock_ceiling_secs")]
    pub wake_lock_ceiling_secs: u64,
    /// Ceiling for the short lock held while a fired alarm is handed over.
    #[serde(default = "default_receiver_wake_lock_secs")]
    pub receiver_wake_lock_secs: u64,
}

/// Discipline settings used until the host pushes its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisciplineDefaults {
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_true")]
    pub block_on_limit: bool,
    #[serde(default = "default_daily_limit_minutes")]
    pub daily_limit_minutes: u32,
    #[serde(default = "default_distracting_apps")]
    pub distracting_apps: Vec<String>,
    #[serde(default = "default_block_message")]
    pub block_message: String,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/focusguard/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub alarm: AlarmConfig,
    #[serde(default)]
    pub discipline: DisciplineDefaults,
}

fn default_poll_interval_secs() -> u64 {
    15
}
fn default_lookback_slack_secs() -> u64 {
    5
}
fn default_wake_lock_ceiling_secs() -> u64 {
    10 * 60
}
fn default_max_snoozes() -> u8 {
    3
}
fn default_snooze_delay_secs() -> u64 {
    30
}
fn default_receiver_wake_lock_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_daily_limit_minutes() -> u32 {
    30
}
fn default_block_message() -> String {
    "Daily app limit reached!".into()
}
fn default_distracting_apps() -> Vec<String> {
    [
        "com.google.android.youtube",
        "com.instagram.android",
        "in.swiggy.android",
        "com.zomato.com",
        "com.facebook.katana",
        "com.twitter.android",
        "com.netflix.mediaclient",
        "com.snapchat.android",
        "com.spotify.music",
        "com.amazon.music",
        "com.reddit.frontpage",
        "com.pinterest",
        "com.quora.android",
        "com.linkedin.android",
        "com.tiktok",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            lookback_slack_secs: default_lookback_slack_secs(),
            wake_lock_ceiling_secs: default_wake_lock_ceiling_secs(),
            stale_foreground: StaleForeground::Retain,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// One interval plus slack, so consecutive windows overlap.
    pub fn lookback(&self) -> Duration {
        self.poll_interval() + Duration::from_secs(self.lookback_slack_secs)
    }

    pub fn wake_lock_ceiling(&self) -> Duration {
        Duration::from_secs(self.wake_lock_ceiling_secs)
    }
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            max_snoozes: default_max_snoozes(),
            snooze_delay_secs: default_snooze_delay_secs(),
            wake_lock_ceiling_secs: default_wake_lock_ceiling_secs(),
            receiver_wake_lock_secs: default_receiver_wake_lock_secs(),
        }
    }
}

impl AlarmConfig {
    pub fn snooze_delay(&self) -> Duration {
        Duration::from_secs(self.snooze_delay_secs)
    }

    pub fn wake_lock_ceiling(&self) -> Duration {
        Duration::from_secs(self.wake_lock_ceiling_secs)
    }

    pub fn receiver_wake_lock(&self) -> Duration {
        Duration::from_secs(self.receiver_wake_lock_secs)
    }
}

impl Default for DisciplineDefaults {
    fn default() -> Self {
        Self {
            active: true,
            block_on_limit: true,
            daily_limit_minutes: default_daily_limit_minutes(),
            distracting_apps: default_distracting_apps(),
            block_message: default_block_message(),
        }
    }
}

impl DisciplineDefaults {
    pub fn settings(&self) -> DisciplineSettings {
        DisciplineSettings {
            active: self.active,
            block_on_limit: self.block_on_limit,
            daily_limit: Duration::from_secs(u64::from(self.daily_limit_minutes) * 60),
            distracting_apps: DistractingApps::new(&self.distracting_apps),
            tasks_complete: false,
        }
    }
}

impl EngineConfig {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;

            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => {
                    let n = value
                        .parse::<u64>()
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                    serde_json::Value::Number(n.into())
                }
                serde_json::Value::Array(_) => {
                    // Accept either JSON or a plain comma-separated list.
                    match serde_json::from_str::<serde_json::Value>(value) {
                        Ok(v @ serde_json::Value::Array(_)) => v,
                        _ => serde_json::Value::Array(
                            value
                                .split(',')
                                .map(str::trim)
                                .filter(|s| !s.is_empty())
                                .map(|s| serde_json::Value::String(s.to_string()))
                                .collect(),
                        ),
                    }
                }
                serde_json::Value::Object(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                _ => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key in memory. Returns error if key is unknown
    /// or the value does not fit the field.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_default_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.monitor.poll_interval(), Duration::from_secs(15));
        assert_eq!(cfg.monitor.lookback(), Duration::from_secs(20));
        assert_eq!(cfg.monitor.wake_lock_ceiling(), Duration::from_secs(600));
        assert_eq!(cfg.monitor.stale_foreground, StaleForeground::Retain);
        assert_eq!(cfg.alarm.max_snoozes, 3);
        assert_eq!(cfg.alarm.snooze_delay(), Duration::from_secs(30));
        assert_eq!(cfg.alarm.receiver_wake_lock(), Duration::from_secs(10));
        assert_eq!(cfg.discipline.daily_limit_minutes, 30);
        assert!(cfg.discipline.distracting_apps.contains(&"com.tiktok".to_string()));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: EngineConfig = toml::from_str(
            "[monitor]\npoll_interval_secs = 5\nstale_foreground = \"clear\"\n",
        )
        .unwrap();
        assert_eq!(cfg.monitor.poll_interval_secs, 5);
        assert_eq!(cfg.monitor.lookback_slack_secs, 5);
        assert_eq!(cfg.monitor.stale_foreground, StaleForeground::Clear);
        assert_eq!(cfg.alarm, AlarmConfig::default());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.get("monitor.poll_interval_secs").as_deref(), Some("15"));
        assert_eq!(cfg.get("monitor.stale_foreground").as_deref(), Some("retain"));
        assert_eq!(cfg.get("discipline.active").as_deref(), Some("true"));
        assert!(cfg.get("monitor.missing_key").is_none());
    }

    #[test]
    fn set_updates_number_bool_and_list() {
        let mut cfg = EngineConfig::default();
        cfg.set("alarm.snooze_delay_secs", "45").unwrap();
        cfg.set("discipline.block_on_limit", "false").unwrap();
        cfg.set("discipline.distracting_apps", "app.x, app.y").unwrap();
        assert_eq!(cfg.alarm.snooze_delay_secs, 45);
        assert!(!cfg.discipline.block_on_limit);
        assert_eq!(cfg.discipline.distracting_apps, vec!["app.x", "app.y"]);
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_values() {
        let mut cfg = EngineConfig::default();
        assert!(matches!(
            cfg.set("monitor.nope", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(cfg.set("discipline.active", "maybe").is_err());
        assert!(cfg.set("alarm.max_snoozes", "-1").is_err());
        // u8 field rejects out-of-range numbers at deserialization.
        assert!(cfg.set("alarm.max_snoozes", "300").is_err());
        assert!(cfg.set("monitor.stale_foreground", "sometimes").is_err());
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = EngineConfig::load_from(&path).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert!(path.exists());

        let mut changed = cfg.clone();
        changed.set("monitor.poll_interval_secs", "30").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(EngineConfig::load_from(&path).unwrap(), changed);
    }

    #[test]
    fn defaults_become_settings() {
        let settings = DisciplineDefaults::default().settings();
        assert_eq!(settings.daily_limit, Duration::from_secs(30 * 60));
        assert!(settings.distracting_apps.contains("COM.INSTAGRAM.ANDROID"));
        assert!(!settings.tasks_complete);
    }
}
