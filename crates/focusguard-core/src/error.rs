//! Core error types for focusguard-core.
//!
//! Engine operations themselves never fail across a subsystem boundary:
//! the monitor and the alarm session absorb collaborator errors and log
//! them. These types surface from the collaborator traits and from the
//! IO-facing APIs (store, config, alarm scheduling).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focusguard-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Counter store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Usage accounting errors
    #[error("Accounting error: {0}")]
    Accounting(#[from] AccountingError),

    /// Audio collaborator errors
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// Platform (wake-lock, foreground mode, surfaces) errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Alarm scheduling errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// The engine actor is gone (shut down or panicked)
    #[error("engine is not running")]
    EngineClosed,
}

/// Durable counter store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the database
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored value could not be decoded
    #[error("Corrupt value for '{key}': {value}")]
    Corrupt { key: String, value: String },

    /// The store is not reachable at the moment
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// The data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Usage accounting source errors.
#[derive(Error, Debug)]
pub enum AccountingError {
    /// The accounting service could not be obtained
    #[error("usage accounting service unavailable")]
    Unavailable,

    /// A single query failed
    #[error("usage query failed: {0}")]
    QueryFailed(String),
}

/// Audio collaborator errors.
#[derive(Error, Debug)]
pub enum AudioError {
    /// The audio system could not be obtained
    #[error("audio system unavailable")]
    Unavailable,

    /// Changing the stream volume is not permitted
    #[error("volume change not permitted")]
    PermissionDenied,

    /// The player failed to start or failed mid-playback
    #[error("playback failed: {0}")]
    Playback(String),
}

/// Platform collaborator errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Entering the elevated/foreground execution mode failed
    #[error("cannot enter foreground mode: {0}")]
    ForegroundDenied(String),

    /// Wake-lock could not be acquired
    #[error("wake-lock unavailable: {0}")]
    WakeLock(String),

    /// A surface (prompt/overlay) request failed
    #[error("surface request failed: {0}")]
    Surface(String),
}

/// Alarm scheduling errors.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// Exact-alarm permission is not granted
    #[error("exact alarm permission denied")]
    PermissionDenied,

    /// The requested time is not in the future
    #[error("alarm time {at} is not in the future")]
    InPast { at: chrono::DateTime<chrono::Local> },

    /// The alarm clock collaborator refused the request
    #[error("alarm clock rejected the request: {0}")]
    Rejected(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
