use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Location watch settings
    #[serde(default)]
    pub geo: GeoConfig,

    /// Notification wording and highlight window
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Where persisted state lives
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Minimum movement before the provider reports a new fix
    pub min_distance_meters: f64,
    /// Preferred polling interval
    pub poll_interval_ms: u64,
    /// Fastest interval the provider may deliver fixes at
    pub fastest_interval_ms: u64,
    pub high_accuracy: bool,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            min_distance_meters: 50.0,
            poll_interval_ms: 5000,
            fastest_interval_ms: 2000,
            high_accuracy: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub channel_id: String,
    /// How long a just-notified reminder stays highlighted
    pub highlight_seconds: u64,
    /// Title for scheduled reminders
    pub reminder_title: String,
    pub geo_title: String,
    pub missed_title: String,
    /// Body used for geo alerts whose reminder has no text
    pub geo_fallback_body: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            channel_id: "reminder-channel".to_string(),
            highlight_seconds: 3,
            reminder_title: "Reminder".to_string(),
            geo_title: "Geo Reminder".to_string(),
            missed_title: "Missed reminder".to_string(),
            geo_fallback_body: "You entered geo zone".to_string(),
        }
    }
}

impl NotificationsConfig {
    pub fn highlight_window(&self) -> Duration {
        Duration::from_secs(self.highlight_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the database and reminder list
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_reminders_file")]
    pub reminders_file: String,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("geonote")
}

fn default_database_file() -> String {
    "geonote.db".to_string()
}

fn default_reminders_file() -> String {
    "reminders.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            reminders_file: default_reminders_file(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn reminders_path(&self) -> PathBuf {
        self.data_dir.join(&self.reminders_file)
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("geonote");

        Self {
            config_dir,
            geo: GeoConfig::default(),
            notifications: NotificationsConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, creating default if it doesn't exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", config_path.display(), e)))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns an error if validation fails with critical errors; warnings are logged.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !self.geo.min_distance_meters.is_finite() || self.geo.min_distance_meters < 0.0 {
            result.add_error(
                "geo.min_distance_meters",
                "Minimum distance must be a non-negative number (0 turns the filter off)",
            );
        } else if self.geo.min_distance_meters > 1000.0 {
            result.add_warning(
                "geo.min_distance_meters",
                "Minimum distance above 1 km will miss small zones",
            );
        }

        if self.geo.poll_interval_ms == 0 {
            result.add_error("geo.poll_interval_ms", "Poll interval must be greater than 0");
        }

        // Floor keeps battery and CPU cost bounded.
        if !(2000..=5000).contains(&self.geo.fastest_interval_ms) {
            result.add_warning(
                "geo.fastest_interval_ms",
                "Fastest interval outside the 2-5 second range",
            );
        }

        if self.geo.fastest_interval_ms > self.geo.poll_interval_ms {
            result.add_warning(
                "geo.fastest_interval_ms",
                "Fastest interval is slower than the poll interval",
            );
        }

        if self.notifications.highlight_seconds == 0 {
            result.add_error(
                "notifications.highlight_seconds",
                "Highlight window must be greater than 0",
            );
        }

        if self.notifications.channel_id.trim().is_empty() {
            result.add_error("notifications.channel_id", "Channel id cannot be empty");
        }

        if self.storage.database_file.trim().is_empty() {
            result.add_error("storage.database_file", "Database file name cannot be empty");
        }

        if self.storage.data_dir.exists() && !self.storage.data_dir.is_dir() {
            result.add_error(
                "storage.data_dir",
                format!("Path is not a directory: {}", self.storage.data_dir.display()),
            );
        }

        result
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("geonote");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_negative_min_distance() {
        let mut config = Config::default();
        config.geo.min_distance_meters = -1.0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "geo.min_distance_meters"));
    }

    #[test]
    fn test_zero_min_distance_disables_filter() {
        let mut config = Config::default();
        config.geo.min_distance_meters = 0.0;
        let result = config.validate();
        assert!(result.is_valid(), "{:?}", result.errors);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[geo\nmin_distance_meters = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_fast_interval_is_warning() {
        let mut config = Config::default();
        config.geo.fastest_interval_ms = 500;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "geo.fastest_interval_ms"));
    }

    #[test]
    fn test_zero_highlight_window() {
        let mut config = Config::default();
        config.notifications.highlight_seconds = 0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.error_summary().contains("notifications.highlight_seconds"));
    }

    #[test]
    fn test_load_from_creates_default_then_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());

        let mut edited = created.clone();
        edited.geo.min_distance_meters = 25.0;
        edited.notifications.missed_title = "You missed this".to_string();
        edited.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.geo.min_distance_meters, 25.0);
        assert_eq!(loaded.notifications.missed_title, "You missed this");
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = toml::from_str("config_dir = \"/tmp/geonote\"").unwrap();
        assert_eq!(config.geo.poll_interval_ms, 5000);
        assert_eq!(config.notifications.highlight_window(), Duration::from_secs(3));
        assert_eq!(config.storage.database_file, "geonote.db");
    }
}
