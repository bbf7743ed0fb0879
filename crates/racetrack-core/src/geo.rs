//! Geographic types and great-circle calculations

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, used for every haversine distance
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geographic position with latitude, longitude, and altitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
    /// Altitude in meters above sea level
    #[serde(default)]
    pub altitude: f64,
}

impl Default for GeoPosition {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
        }
    }
}

impl GeoPosition {
    /// Create a new geographic position
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    /// Create position from degrees
    pub fn from_degrees(lat_deg: f64, lng_deg: f64) -> Self {
        Self::new(lat_deg, lng_deg, 0.0)
    }

    /// Check if this position is valid
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Great-circle distance to another position in meters
    pub fn distance_to(&self, other: &GeoPosition) -> f64 {
        haversine_m(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Position reached after travelling `distance_m` meters on `bearing_deg`
    pub fn destination(&self, distance_m: f64, bearing_deg: f64) -> GeoPosition {
        let lat1 = self.latitude.to_radians();
        let lng1 = self.longitude.to_radians();
        let bearing = bearing_deg.to_radians();
        let angular_distance = distance_m / EARTH_RADIUS_M;

        let lat2 = (lat1.sin() * angular_distance.cos()
            + lat1.cos() * angular_distance.sin() * bearing.cos())
        .asin();

        let lng2 = lng1
            + (bearing.sin() * angular_distance.sin() * lat1.cos())
                .atan2(angular_distance.cos() - lat1.sin() * lat2.sin());

        GeoPosition::new(lat2.to_degrees(), lng2.to_degrees(), self.altitude)
    }

    /// Interpolate between two positions
    /// fraction: 0.0 = self, 1.0 = other
    pub fn interpolate(&self, other: &GeoPosition, fraction: f64) -> GeoPosition {
        let fraction = fraction.clamp(0.0, 1.0);

        GeoPosition::new(
            self.latitude + (other.latitude - self.latitude) * fraction,
            self.longitude + (other.longitude - self.longitude) * fraction,
            self.altitude + (other.altitude - self.altitude) * fraction,
        )
    }
}

/// Haversine distance between two coordinates, in meters
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// Circular geofence around a point
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoCircle {
    pub center: GeoPosition,
    pub radius_m: f64,
}

impl GeoCircle {
    pub fn new(center: GeoPosition, radius_m: f64) -> Self {
        Self { center, radius_m }
    }

    /// Distance from the center to `position`, in meters
    pub fn distance_from_center(&self, position: &GeoPosition) -> f64 {
        self.center.distance_to(position)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_calculation() {
        // Madrid to Barcelona (approximately 505 km)
        let madrid = GeoPosition::new(40.4168, -3.7038, 0.0);
        let barcelona = GeoPosition::new(41.3874, 2.1686, 0.0);

        let distance = madrid.distance_to(&barcelona);
        assert!(distance > 480_000.0 && distance < 530_000.0);
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = GeoPosition::new(40.0, -3.0, 650.0);
        assert_eq!(p.distance_to(&p), 0.0);
    }

    #[test]
    fn test_destination_round_trips_distance() {
        let origin = GeoPosition::new(40.0, -3.0, 0.0);
        let moved = origin.destination(100.0, 45.0);

        let distance = origin.distance_to(&moved);
        assert!((distance - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_circle_distance_from_center() {
        let center = GeoPosition::new(40.0, -3.0, 0.0);
        let edge = center.destination(50.0, 90.0);

        let circle = GeoCircle::new(center, 50.0);
        assert!((circle.distance_from_center(&edge) - 50.0).abs() < 0.01);
        assert_eq!(circle.distance_from_center(&center), 0.0);
    }

    #[test]
    fn test_position_validity() {
        assert!(GeoPosition::new(45.0, 90.0, 1000.0).is_valid());
        assert!(!GeoPosition::new(100.0, 0.0, 0.0).is_valid());
        assert!(!GeoPosition::new(0.0, 200.0, 0.0).is_valid());
        assert!(!GeoPosition::new(f64::NAN, 0.0, 0.0).is_valid());
    }
}
