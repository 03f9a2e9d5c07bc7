//! # FocusGuard Core Library
//!
//! This library provides the discipline enforcement engine behind FocusGuard:
//! a usage monitor that counts time spent in distracting apps and asks for a
//! blocking prompt once the daily budget is spent, and an alarm session that
//! rings for a task with limited snoozes. The CLI binary and any host shell
//! are thin layers over the same library.
//!
//! ## Architecture
//!
//! - **Usage Monitor**: A wall-clock state machine polled on a fixed interval;
//!   each tick reads the accounting source, updates the persisted counter,
//!   tracks the foreground app and evaluates the blocking rules
//! - **Alarm Session**: `Idle -> Sounding <-> Snoozed -> Idle`, driven by named
//!   inputs and a cancelable snooze countdown
//! - **Storage**: SQLite-based counter storage and TOML-based configuration
//! - **Runtime**: Two independent tokio actors and the [`Engine`] facade
//!
//! ## Key Components
//!
//! - [`UsageMonitor`]: Usage monitor loop
//! - [`AlarmSession`]: Alarm state machine
//! - [`SqliteCounterStore`]: Durable daily counter
//! - [`EngineConfig`]: Engine configuration management
//! - [`Event`]: Everything the engine reports to its host

pub mod alarm;
pub mod error;
pub mod events;
pub mod platform;
pub mod runtime;
pub mod settings;
pub mod sim;
pub mod storage;
pub mod timer;
pub mod usage;

pub use alarm::{AlarmInput, AlarmParts, AlarmReceiver, AlarmScheduler, AlarmSession, AlarmState};
pub use error::{AccountingError, AudioError, ConfigError, CoreError, PlatformError, ScheduleError, StoreError};
pub use events::{Event, EventRecorder, EventSink};
pub use runtime::{AlarmStatus, Engine, MonitorStatus};
pub use settings::{AppId, DisciplineSettings, DistractingApps, PermissionChange, Permissions, SettingsUpdate};
pub use storage::{CounterRecord, CounterStore, EngineConfig, SqliteCounterStore};
pub use usage::{evaluate, track_foreground, MonitorParts, MonitorPhase, UsageMonitor, UsageState, Verdict};
