pub mod estimate;

pub use estimate::{AccelerationComponents, DerivedEstimate, VelocityComponents};

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(SyncError::InvalidSample(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(SyncError::InvalidSample(format!(
                "longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// One observed or received position fix.
///
/// Samples are never modified after construction; every new fix is a new
/// value. `timestamp` is milliseconds since the Unix epoch as assigned by the
/// source and is what the sync logic keys on. `received_at` is stamped by the
/// broker and is informational only.
///
/// On the wire (broker JSON) the sensor speed travels as `speed` and the
/// receipt time as `receivedAt`. Deserialization rejects out-of-range
/// coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireSample")]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    latitude: f64,
    longitude: f64,
    #[serde(rename = "speed")]
    speed_hint: Option<f64>,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    received_at: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSample {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    speed: Option<f64>,
    timestamp: i64,
    #[serde(default)]
    received_at: Option<i64>,
}

impl TryFrom<WireSample> for PositionSample {
    type Error = SyncError;

    fn try_from(wire: WireSample) -> SyncResult<Self> {
        let sample = PositionSample::new(wire.latitude, wire.longitude, wire.timestamp, wire.speed)?;
        Ok(match wire.received_at {
            Some(at) => sample.with_received_at(at),
            None => sample,
        })
    }
}

impl PositionSample {
    pub fn new(
        latitude: f64,
        longitude: f64,
        timestamp: i64,
        speed_hint: Option<f64>,
    ) -> SyncResult<Self> {
        GeoPoint::new(latitude, longitude).validate()?;
        Ok(Self {
            latitude,
            longitude,
            speed_hint,
            timestamp,
            received_at: None,
        })
    }

    /// Copy of this sample stamped with the broker's receipt time.
    pub fn with_received_at(&self, received_at: i64) -> Self {
        Self {
            received_at: Some(received_at),
            ..self.clone()
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Speed reported by the sensor itself, shown but never used for estimation.
    pub fn speed_hint(&self) -> Option<f64> {
        self.speed_hint
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn received_at(&self) -> Option<i64> {
        self.received_at
    }

    /// Two samples describe the same fix when their timestamps match.
    pub fn same_fix(&self, other: &PositionSample) -> bool {
        self.timestamp == other.timestamp
    }
}
