//! Distance between two geodetic points.
//!
//! Estimation code only sees [`DistanceProvider`]. Which implementation sits
//! behind it is decided once, from [`DistanceConfig`], when a session is built.

pub mod fallback;
pub mod great_circle;
pub mod routed;

pub use fallback::Fallback;
pub use great_circle::{haversine_distance, GreatCircle, EARTH_RADIUS_M};
pub use routed::{parse_matrix_distance, RoutedConfig, RoutedDistance};

use crate::error::SyncResult;
use crate::types::GeoPoint;
use std::future::Future;

/// Capability to measure the distance between two points in meters.
pub trait DistanceProvider: Send + Sync {
    /// Distance from `a` to `b` in meters, or `DistanceUnavailable`.
    fn distance(&self, a: GeoPoint, b: GeoPoint) -> impl Future<Output = SyncResult<f64>> + Send;

    /// Short name for logging.
    fn name(&self) -> &str;
}

/// Which distance strategy a session should use.
#[derive(Clone, Debug, Default)]
pub enum DistanceConfig {
    /// Haversine over a spherical Earth. No external dependency.
    #[default]
    GreatCircle,

    /// Road-network distance from the routing service.
    Routed(RoutedConfig),
}

/// Distance strategy chosen at configuration time.
pub enum DistanceStrategy {
    GreatCircle(GreatCircle),
    Routed(RoutedDistance),
    Degrading(Fallback<RoutedDistance, GreatCircle>),
}

impl DistanceStrategy {
    pub fn from_config(config: &DistanceConfig) -> SyncResult<Self> {
        match config {
            DistanceConfig::GreatCircle => Ok(DistanceStrategy::GreatCircle(GreatCircle)),
            DistanceConfig::Routed(routed) => {
                let provider = RoutedDistance::new(routed)?;
                if routed.degrade_to_great_circle {
                    Ok(DistanceStrategy::Degrading(Fallback::new(provider, GreatCircle)))
                } else {
                    Ok(DistanceStrategy::Routed(provider))
                }
            }
        }
    }
}

impl DistanceProvider for DistanceStrategy {
    async fn distance(&self, a: GeoPoint, b: GeoPoint) -> SyncResult<f64> {
        match self {
            DistanceStrategy::GreatCircle(p) => p.distance(a, b).await,
            DistanceStrategy::Routed(p) => p.distance(a, b).await,
            DistanceStrategy::Degrading(p) => p.distance(a, b).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            DistanceStrategy::GreatCircle(p) => p.name(),
            DistanceStrategy::Routed(p) => p.name(),
            DistanceStrategy::Degrading(_) => "routed+great-circle",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    #[test]
    fn test_default_is_great_circle() {
        let strategy = DistanceStrategy::from_config(&DistanceConfig::default()).unwrap();
        assert!(matches!(strategy, DistanceStrategy::GreatCircle(_)));
        assert_eq!(strategy.name(), "great-circle");
    }

    #[test]
    fn test_routed_without_key_fails() {
        let config = DistanceConfig::Routed(RoutedConfig::default());
        assert!(matches!(
            DistanceStrategy::from_config(&config),
            Err(SyncError::DistanceUnavailable(_))
        ));
    }

    #[test]
    fn test_degrade_flag_selects_fallback() {
        let config = DistanceConfig::Routed(RoutedConfig {
            api_key: Some("key".to_string()),
            degrade_to_great_circle: true,
            ..RoutedConfig::default()
        });
        let strategy = DistanceStrategy::from_config(&config).unwrap();
        assert!(matches!(strategy, DistanceStrategy::Degrading(_)));

        let config = DistanceConfig::Routed(RoutedConfig {
            api_key: Some("key".to_string()),
            ..RoutedConfig::default()
        });
        let strategy = DistanceStrategy::from_config(&config).unwrap();
        assert!(matches!(strategy, DistanceStrategy::Routed(_)));
    }

    #[tokio::test]
    async fn test_degrading_strategy_survives_dead_service() {
        let config = DistanceConfig::Routed(RoutedConfig {
            api_key: Some("key".to_string()),
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: std::time::Duration::from_millis(300),
            degrade_to_great_circle: true,
            ..RoutedConfig::default()
        });
        let strategy = DistanceStrategy::from_config(&config).unwrap();

        let a = GeoPoint::new(40.0, -75.0);
        let b = GeoPoint::new(40.001, -75.0);
        let d = strategy.distance(a, b).await.unwrap();
        assert_eq!(d, haversine_distance(a, b));
    }
}
