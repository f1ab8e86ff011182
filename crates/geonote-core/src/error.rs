//! Centralized error types for GeoNote.
//!
//! Each concern gets its own enum so callers can match precisely. The
//! reminder components absorb most of these locally and only log them; the
//! `user_message()` helpers exist for the places that surface them to a UI.

use thiserror::Error;

/// Top-level application error type.
///
/// Returned by the composition root; component operations absorb their own
/// failures and never surface these.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display in the UI.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Storage(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }

    /// Unwraps a `ConfigError` carried by an `anyhow` error, if there is one.
    pub fn from_config(error: anyhow::Error) -> Self {
        match error.downcast::<ConfigError>() {
            Ok(config) => AppError::Config(config),
            Err(other) => AppError::Other(other),
        }
    }
}

/// Location provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location service unavailable")]
    ServiceUnavailable,

    #[error("Location request timed out")]
    Timeout,

    #[error("Location error: {0}")]
    Other(String),
}

impl LocationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            LocationError::PermissionDenied => "Location permission required for geo reminders.",
            LocationError::ServiceUnavailable => "Location is unavailable. Geo reminders are paused.",
            LocationError::Timeout => "Waiting for a location fix.",
            LocationError::Other(_) => "Location error. Geo reminders may be delayed.",
        }
    }
}

/// Platform notification scheduler errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Trigger not found: {0}")]
    HandleNotFound(String),

    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

impl NotifyError {
    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::Scheduler(message.into())
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery(message.into())
    }
}

/// Durable key-value storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage read failed: {0}")]
    Read(String),

    #[error("Storage write failed: {0}")]
    Write(String),

    #[error("Stored data is corrupt: {0}")]
    Corruption(String),
}

impl StorageError {
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read(message.into())
    }

    pub fn write(message: impl Into<String>) -> Self {
        Self::Write(message.into())
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            StorageError::Read(_) => "Unable to read saved reminders. Try restarting the app.",
            StorageError::Write(_) => "Reminder changes may not survive a restart.",
            StorageError::Corruption(_) => "Saved reminder data was reset.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// Extension trait for converting rusqlite errors to our error types.
pub trait RusqliteErrorExt {
    fn into_read_error(self) -> StorageError;
    fn into_write_error(self) -> StorageError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_read_error(self) -> StorageError {
        match &self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                StorageError::Corruption(self.to_string())
            }
            _ => StorageError::Read(self.to_string()),
        }
    }

    fn into_write_error(self) -> StorageError {
        match &self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                StorageError::Corruption(self.to_string())
            }
            _ => StorageError::Write(self.to_string()),
        }
    }
}
