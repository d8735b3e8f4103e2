use super::DistanceProvider;
use crate::error::{SyncError, SyncResult};
use crate::types::GeoPoint;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_ORS_BASE_URL: &str = "https://api.openrouteservice.org/v2/matrix";
pub const DEFAULT_ORS_PROFILE: &str = "driving-car";

/// Settings for the routed-network distance strategy.
#[derive(Clone, Debug)]
pub struct RoutedConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub profile: String,
    pub timeout: Duration,
    /// Answer with the great-circle distance when the service fails.
    pub degrade_to_great_circle: bool,
}

impl Default for RoutedConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_ORS_BASE_URL.to_string(),
            profile: DEFAULT_ORS_PROFILE.to_string(),
            timeout: Duration::from_secs(10),
            degrade_to_great_circle: false,
        }
    }
}

#[derive(Deserialize)]
struct MatrixResponse {
    distances: Option<Vec<Vec<Option<f64>>>>,
}

/// Road-network distance from the OpenRouteService matrix API
///
/// # Request
/// `POST {base_url}/{profile}` with the key in `Authorization` and
/// ```text
/// {"locations": [[lon_a, lat_a], [lon_b, lat_b]], "metrics": ["distance"], "units": "m"}
/// ```
///
/// # Response
/// A 2x2 matrix under `distances`; the cross entry `distances[0][1]` is used.
///
/// # Error Handling
/// - Transport error or timeout: `DistanceUnavailable`
/// - Non-2xx status: `DistanceUnavailable`
/// - Missing `distances`, wrong shape, null or negative value: `DistanceUnavailable`
///
/// The client timeout bounds every call, so a hung service never stalls a tick.
pub struct RoutedDistance {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl RoutedDistance {
    pub fn new(config: &RoutedConfig) -> SyncResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                SyncError::DistanceUnavailable("routed distance needs an API key".to_string())
            })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("motion_sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::DistanceUnavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/{}", config.base_url.trim_end_matches('/'), config.profile),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Coordinates go out as `[lon, lat]`, the GeoJSON order the service expects.
    fn build_request_body(a: GeoPoint, b: GeoPoint) -> serde_json::Value {
        json!({
            "locations": [[a.longitude, a.latitude], [b.longitude, b.latitude]],
            "metrics": ["distance"],
            "units": "m",
        })
    }
}

/// Extract the cross distance from a matrix response body.
pub fn parse_matrix_distance(body: &str) -> SyncResult<f64> {
    let response: MatrixResponse = serde_json::from_str(body)
        .map_err(|e| SyncError::DistanceUnavailable(format!("malformed response: {}", e)))?;

    let distances = response
        .distances
        .ok_or_else(|| SyncError::DistanceUnavailable("response has no distances".to_string()))?;

    let value = distances
        .first()
        .and_then(|row| row.get(1))
        .copied()
        .flatten()
        .ok_or_else(|| {
            SyncError::DistanceUnavailable("distance matrix has no cross entry".to_string())
        })?;

    if !value.is_finite() || value < 0.0 {
        return Err(SyncError::DistanceUnavailable(format!(
            "unusable distance value {}",
            value
        )));
    }
    Ok(value)
}

impl DistanceProvider for RoutedDistance {
    async fn distance(&self, a: GeoPoint, b: GeoPoint) -> SyncResult<f64> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .json(&Self::build_request_body(a, b))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SyncError::DistanceUnavailable("routing service timed out".to_string())
                } else {
                    SyncError::DistanceUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::DistanceUnavailable(format!(
                "HTTP error: {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SyncError::DistanceUnavailable(format!("Failed to read response: {}", e)))?;

        let meters = parse_matrix_distance(&body)?;
        log::debug!("{} routed distance {:.2} m", self.endpoint, meters);
        Ok(meters)
    }

    fn name(&self) -> &str {
        "routed"
    }
}
