pub mod config;
pub mod error;
pub mod model;
pub mod notifier;

pub use config::{Config, GeoConfig, NotificationsConfig, StorageConfig, ValidationResult};
pub use error::{AppError, ConfigError, LocationError, NotifyError, StorageError};
pub use model::{Reminder, ReminderTrigger, Zone};
pub use notifier::{NotificationContent, Notifier};

use anyhow::Result;

/// Initialize logging for the application
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!("GeoNote core initialized");
    Ok(())
}
