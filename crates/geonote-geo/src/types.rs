use geonote_core::GeoConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use geonote_core::LocationError;

/// A device position fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters: None,
        }
    }
}

/// Identifies one location subscription on a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Cadence requested from the location provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Fixes closer than this to the previous one are not reported
    pub min_distance_meters: f64,
    pub poll_interval: Duration,
    pub fastest_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from(&GeoConfig::default())
    }
}

impl From<&GeoConfig> for WatchOptions {
    fn from(config: &GeoConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            min_distance_meters: config.min_distance_meters,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            fastest_interval: Duration::from_millis(config.fastest_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_options_follow_config() {
        let options = WatchOptions::default();
        assert_eq!(options.min_distance_meters, 50.0);
        assert_eq!(options.poll_interval, Duration::from_secs(5));
        assert_eq!(options.fastest_interval, Duration::from_secs(2));
        assert!(options.high_accuracy);
    }
}
