//! Coordinate reference systems and distance on them.
//! All coordinate math uses f64 for precision.

use serde::{Deserialize, Serialize};

/// Mean Earth radius (IUGG) in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Coordinate reference system of a grid and of every point placed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Crs {
    /// Longitude/latitude in degrees (EPSG:4326). Distances are geodesic, in metres.
    #[default]
    Geographic,
    /// Projected map units. Distances are Euclidean, in map units.
    Planar,
}

impl Crs {
    /// Distance between `(x1, y1)` and `(x2, y2)`.
    /// For `Geographic`, x is longitude and y is latitude, result in metres.
    pub fn distance(self, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
        match self {
            Crs::Geographic => haversine_m(y1, x1, y2, x2),
            Crs::Planar => (x2 - x1).hypot(y2 - y1),
        }
    }
}

/// Great-circle central angle in radians (haversine form; stable for short arcs).
pub fn great_circle_distance_rad(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = phi2 - phi1;
    let dlambda = (lon2 - lon1).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * h.sqrt().clamp(0.0, 1.0).asin()
}

/// Great-circle distance in metres on a sphere of radius [`EARTH_RADIUS_M`].
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    great_circle_distance_rad(lat1, lon1, lat2, lon2) * EARTH_RADIUS_M
}
