use serde::Serialize;
use thiserror::Error;

/// Sync and estimation error types
///
/// None of these end a session. Everything except `StaleOrDuplicateSample`
/// is surfaced as the session's transient error until the next good tick.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum SyncError {
    #[error("No location data available yet. Start the sender first.")]
    SampleUnavailable,

    #[error("Distance unavailable: {0}")]
    DistanceUnavailable(String),

    #[error("Stale or duplicate sample (dt = {dt_ms} ms)")]
    StaleOrDuplicateSample { dt_ms: i64 },

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Sensor failure: {0}")]
    SensorFailure(String),

    #[error("Session already active")]
    AlreadyActive,

    #[error("Session not active")]
    NotActive,
}

impl SyncError {
    /// Whether the error should reach the presentation layer.
    pub fn is_surfaced(&self) -> bool {
        !matches!(self, SyncError::StaleOrDuplicateSample { .. })
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_sample_is_not_surfaced() {
        assert!(!SyncError::StaleOrDuplicateSample { dt_ms: 0 }.is_surfaced());
        assert!(SyncError::SampleUnavailable.is_surfaced());
        assert!(SyncError::DistanceUnavailable("x".into()).is_surfaced());
        assert!(SyncError::TransportFailure("x".into()).is_surfaced());
    }

    #[test]
    fn test_error_display() {
        let errors = vec![
            SyncError::SampleUnavailable,
            SyncError::DistanceUnavailable("missing distances".to_string()),
            SyncError::StaleOrDuplicateSample { dt_ms: -5 },
            SyncError::TransportFailure("connection refused".to_string()),
            SyncError::InvalidSample("latitude out of range".to_string()),
            SyncError::SensorFailure("termux-location not found".to_string()),
            SyncError::AlreadyActive,
            SyncError::NotActive,
        ];

        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn test_error_serializes_with_kind_tag() {
        let json = serde_json::to_value(SyncError::TransportFailure("boom".into())).unwrap();
        assert_eq!(json["kind"], "TransportFailure");
        assert_eq!(json["detail"], "boom");

        let json = serde_json::to_value(SyncError::SampleUnavailable).unwrap();
        assert_eq!(json["kind"], "SampleUnavailable");
    }
}
