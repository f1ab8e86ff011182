//! Great-circle distance on a spherical Earth.

use geonote_core::Zone;

use crate::types::Position;

/// Mean Earth radius used by the haversine formula
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance in meters between two coordinates given in degrees.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// True iff `position` lies within `zone`, boundary included.
///
/// Incomplete zones never contain anything.
pub fn contains(position: &Position, zone: &Zone) -> bool {
    let Some((lat, lon, radius)) = zone.parts() else {
        return false;
    };

    let distance = haversine_distance(position.latitude, position.longitude, lat, lon);
    tracing::trace!("Distance to zone center: {:.1} m (radius {} m)", distance, radius);
    distance <= radius
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        assert_eq!(haversine_distance(52.37, 4.89, 52.37, 4.89), 0.0);
    }

    #[test]
    fn one_hundredth_degree_of_latitude() {
        let d = haversine_distance(52.3700, 4.8900, 52.3800, 4.8900);
        // ~1.1 km, well outside a 100 m zone
        assert!((d - 1112.0).abs() < 1.5, "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = haversine_distance(48.8566, 2.3522, 51.5074, -0.1278);
        let b = haversine_distance(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((a - b).abs() < 1e-6);
        // Paris to London, roughly 344 km
        assert!((a - 343_556.0).abs() < 1_000.0, "got {a}");
    }

    #[test]
    fn contains_center_and_rejects_far_point() {
        let zone = Zone::new(52.3700, 4.8900, 100.0);
        assert!(contains(&Position::new(52.3700, 4.8900), &zone));
        assert!(!contains(&Position::new(52.3800, 4.8900), &zone));
    }

    #[test]
    fn boundary_is_inclusive() {
        let center = Position::new(52.3700, 4.8900);
        let edge = Position::new(52.3710, 4.8900);
        let radius = haversine_distance(center.latitude, center.longitude, edge.latitude, edge.longitude);

        let zone = Zone::new(center.latitude, center.longitude, radius);
        assert!(contains(&edge, &zone));

        let tighter = Zone::new(center.latitude, center.longitude, radius - 0.01);
        assert!(!contains(&edge, &tighter));
    }

    #[test]
    fn incomplete_zone_never_contains() {
        let zone = Zone {
            radius_meters: None,
            ..Zone::new(52.37, 4.89, 100.0)
        };
        assert!(!contains(&Position::new(52.37, 4.89), &zone));
    }
}
