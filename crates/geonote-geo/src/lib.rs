//! Geofence monitoring for GeoNote
//!
//! Turns a stream of device positions plus a list of geo reminders into
//! one-shot "entered zone" alerts.

pub mod distance;
pub mod location;
pub mod monitor;
pub mod tracker;
pub mod types;

pub use distance::{contains, haversine_distance, EARTH_RADIUS_METERS};
pub use location::{
    LocationProvider, LocationSubscription, ManualLocationProvider, PermissionGate,
    StaticPermission,
};
pub use monitor::{GeoAlertStyle, GeoMonitor, StartOutcome};
pub use tracker::ZoneTracker;
pub use types::*;
