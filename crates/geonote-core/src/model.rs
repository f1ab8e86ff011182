//! Reminder data model shared by the geo and notification crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A note that carries a reminder trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    /// Stable identifier, unique among active reminders
    pub id: String,
    /// Text shown in the alert body
    #[serde(default)]
    pub content: String,
    pub trigger: ReminderTrigger,
}

/// What makes a reminder fire. Timed and geo triggers are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReminderTrigger {
    Timed { fire_at: DateTime<Utc> },
    Geo(Zone),
}

/// Circular geofence in WGS84 coordinates.
///
/// Fields are optional because zones arrive from the note editor half-filled;
/// an incomplete zone never contains anything.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Zone {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(alias = "radius")]
    pub radius_meters: Option<f64>,
}

impl Zone {
    pub fn new(latitude: f64, longitude: f64, radius_meters: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            radius_meters: Some(radius_meters),
        }
    }

    /// Returns `(latitude, longitude, radius_meters)` when the zone is usable.
    ///
    /// A zone is usable when all three parts are present and finite and the
    /// radius is strictly positive.
    pub fn parts(&self) -> Option<(f64, f64, f64)> {
        let lat = self.latitude.filter(|v| v.is_finite())?;
        let lon = self.longitude.filter(|v| v.is_finite())?;
        let radius = self.radius_meters.filter(|r| r.is_finite() && *r > 0.0)?;
        Some((lat, lon, radius))
    }
}

impl Reminder {
    pub fn timed(id: impl Into<String>, content: impl Into<String>, fire_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            trigger: ReminderTrigger::Timed { fire_at },
        }
    }

    pub fn geo(id: impl Into<String>, content: impl Into<String>, zone: Zone) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            trigger: ReminderTrigger::Geo(zone),
        }
    }

    pub fn zone(&self) -> Option<&Zone> {
        match &self.trigger {
            ReminderTrigger::Geo(zone) => Some(zone),
            ReminderTrigger::Timed { .. } => None,
        }
    }

    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        match self.trigger {
            ReminderTrigger::Timed { fire_at } => Some(fire_at),
            ReminderTrigger::Geo(_) => None,
        }
    }
}
