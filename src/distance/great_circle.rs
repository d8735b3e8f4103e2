use super::DistanceProvider;
use crate::error::SyncResult;
use crate::types::GeoPoint;

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters (haversine).
pub fn haversine_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1.0 for antipodal points
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Closed-form spherical distance. Never fails for valid coordinates.
#[derive(Clone, Copy, Debug, Default)]
pub struct GreatCircle;

impl DistanceProvider for GreatCircle {
    async fn distance(&self, a: GeoPoint, b: GeoPoint) -> SyncResult<f64> {
        Ok(haversine_distance(a, b))
    }

    fn name(&self) -> &str {
        "great-circle"
    }
}
