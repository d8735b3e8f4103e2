//! Finite-difference kinematics over consecutive position samples
//!
//! Every quantity comes from one (previous, current) pair:
//!   - dt = (t_current - t_previous) / 1000, seconds, must be > 0
//!   - speed = distance / dt
//!   - velocity = (Δlat / dt, Δlon / dt), degrees per second
//!   - acceleration = (current - previous estimate) / dt, only when a
//!     previous estimate exists
//!
//! Nothing is smoothed, filtered or rounded here.

use crate::distance::DistanceProvider;
use crate::error::{SyncError, SyncResult};
use crate::types::{AccelerationComponents, DerivedEstimate, PositionSample, VelocityComponents};

/// Elapsed seconds between two samples, or `StaleOrDuplicateSample` when the
/// current one is not strictly newer or the gap does not fit in an `i64`.
pub fn time_delta_secs(previous: &PositionSample, current: &PositionSample) -> SyncResult<f64> {
    let (t_prev, t_cur) = (previous.timestamp(), current.timestamp());
    match t_cur.checked_sub(t_prev) {
        Some(dt_ms) if dt_ms > 0 => Ok(dt_ms as f64 / 1000.0),
        _ => Err(SyncError::StaleOrDuplicateSample {
            dt_ms: t_cur.saturating_sub(t_prev),
        }),
    }
}

/// Derive an estimate from a sample pair and an already-known distance.
///
/// Returns `None` when dt <= 0.
pub fn derive(
    previous: &PositionSample,
    current: &PositionSample,
    distance_m: f64,
    previous_estimate: Option<&DerivedEstimate>,
) -> Option<DerivedEstimate> {
    let dt = time_delta_secs(previous, current).ok()?;

    let speed_ms = distance_m / dt;
    let velocity = VelocityComponents {
        latitude_deg_s: (current.latitude() - previous.latitude()) / dt,
        longitude_deg_s: (current.longitude() - previous.longitude()) / dt,
    };

    let acceleration = previous_estimate.map(|prev| AccelerationComponents {
        speed_ms2: (speed_ms - prev.speed_ms) / dt,
        latitude_deg_s2: (velocity.latitude_deg_s - prev.velocity.latitude_deg_s) / dt,
        longitude_deg_s2: (velocity.longitude_deg_s - prev.velocity.longitude_deg_s) / dt,
    });

    Some(DerivedEstimate {
        distance_m,
        time_delta_s: dt,
        speed_ms,
        velocity,
        acceleration,
    })
}

/// Runs one estimation step against a distance provider.
pub struct KinematicsEstimator<D> {
    distance: D,
}

impl<D: DistanceProvider> KinematicsEstimator<D> {
    pub fn new(distance: D) -> Self {
        Self { distance }
    }

    pub fn provider(&self) -> &D {
        &self.distance
    }

    /// Estimate for the pair (previous, current).
    ///
    /// - `Ok(None)`: dt <= 0, the pair is out of order or duplicated and the
    ///   provider is never called
    /// - `Err(DistanceUnavailable)`: the provider failed, no estimate for this step
    pub async fn estimate(
        &self,
        previous: &PositionSample,
        current: &PositionSample,
        previous_estimate: Option<&DerivedEstimate>,
    ) -> SyncResult<Option<DerivedEstimate>> {
        if let Err(e) = time_delta_secs(previous, current) {
            log::debug!("Skipping estimate: {}", e);
            return Ok(None);
        }

        let distance_m = self
            .distance
            .distance(previous.point(), current.point())
            .await?;

        Ok(derive(previous, current, distance_m, previous_estimate))
    }
}
