use serde::{Deserialize, Serialize};

/// Per-axis finite difference of position, in degrees per second.
///
/// This is a coordinate-space approximation, not a metric velocity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityComponents {
    pub latitude_deg_s: f64,
    pub longitude_deg_s: f64,
}

/// Change of speed and of each velocity axis over one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerationComponents {
    pub speed_ms2: f64,
    pub latitude_deg_s2: f64,
    pub longitude_deg_s2: f64,
}

/// Quantities derived from one (previous, current) sample pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedEstimate {
    pub distance_m: f64,
    pub time_delta_s: f64,
    pub speed_ms: f64,
    pub velocity: VelocityComponents,
    /// `None` until a prior estimate exists. Absent means "not yet
    /// determinable", which is different from zero acceleration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration: Option<AccelerationComponents>,
}

impl DerivedEstimate {
    pub fn speed_kmh(&self) -> f64 {
        self.speed_ms * 3.6
    }
}
