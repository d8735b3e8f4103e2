use super::DistanceProvider;
use crate::error::SyncResult;
use crate::types::GeoPoint;

/// Tries `primary` first and answers with `secondary` when it fails.
///
/// Only built when degradation is explicitly configured.
pub struct Fallback<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> Fallback<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: DistanceProvider, S: DistanceProvider> DistanceProvider for Fallback<P, S> {
    async fn distance(&self, a: GeoPoint, b: GeoPoint) -> SyncResult<f64> {
        match self.primary.distance(a, b).await {
            Ok(meters) => Ok(meters),
            Err(e) => {
                log::warn!(
                    "{} distance failed ({}), degrading to {}",
                    self.primary.name(),
                    e,
                    self.secondary.name()
                );
                self.secondary.distance(a, b).await
            }
        }
    }

    fn name(&self) -> &str {
        self.primary.name()
    }
}
