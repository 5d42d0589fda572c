//! Great-circle distance between delivery points.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the isolation check.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude / longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Haversine distance to `other` in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(*self, *other)
    }

    /// True when `other` lies within `radius_km` (inclusive).
    pub fn within(&self, other: &GeoPoint, radius_km: f64) -> bool {
        self.distance_km(other) <= radius_km
    }
}

/// Haversine formula, symmetric and zero on identical points.
///
/// ```rust
/// use mercato_core::geo::{haversine_km, GeoPoint};
///
/// let a = GeoPoint::new(31.2304, 121.4737);
/// let b = GeoPoint::new(31.2989, 121.5000);
/// let d = haversine_km(a, b);
/// assert!((7.0..9.0).contains(&d));
/// assert_eq!(haversine_km(a, a), 0.0);
/// ```
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric() {
        let a = GeoPoint::new(39.9042, 116.4074);
        let b = GeoPoint::new(31.2304, 121.4737);
        assert_eq!(haversine_km(a, b), haversine_km(b, a));
    }

    #[test]
    fn test_known_distance() {
        // Beijing to Shanghai is roughly 1067 km
        let d = haversine_km(GeoPoint::new(39.9042, 116.4074), GeoPoint::new(31.2304, 121.4737));
        assert!((d - 1067.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = haversine_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        assert!((d - 111.19).abs() < 0.01, "got {d}");
    }

    #[test]
    fn test_within_is_inclusive() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let d = a.distance_km(&b);
        assert!(a.within(&b, d));
        assert!(!a.within(&b, d - 0.001));
    }
}
