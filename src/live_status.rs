use crate::sync::{Phase, ReceiverReport};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const STATUS_FILE: &str = "live_status.json";

/// Flat snapshot of the receiver for external readers.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LiveStatus {
    pub timestamp: i64,
    pub active: bool,
    pub generation: u64,
    pub polls: u64,
    pub estimates: u64,
    // Latest sample
    pub sample_timestamp: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed_hint: Option<f64>,
    // Latest estimate
    pub distance_m: Option<f64>,
    pub time_delta_s: Option<f64>,
    pub speed_ms: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub velocity_lat_deg_s: Option<f64>,
    pub velocity_lon_deg_s: Option<f64>,
    pub accel_speed_ms2: Option<f64>,
    pub accel_lat_deg_s2: Option<f64>,
    pub accel_lon_deg_s2: Option<f64>,
    pub error: Option<String>,
}

impl LiveStatus {
    pub fn from_report(report: &ReceiverReport) -> Self {
        let sample = report.state.last_sample.as_ref();
        let estimate = report.state.last_estimate.as_ref();
        let acceleration = estimate.and_then(|e| e.acceleration);

        Self {
            timestamp: Utc::now().timestamp_millis(),
            active: report.phase == Phase::Active,
            generation: report.generation,
            polls: report.polls,
            estimates: report.estimates,
            sample_timestamp: sample.map(|s| s.timestamp()),
            latitude: sample.map(|s| s.latitude()),
            longitude: sample.map(|s| s.longitude()),
            speed_hint: sample.and_then(|s| s.speed_hint()),
            distance_m: estimate.map(|e| e.distance_m),
            time_delta_s: estimate.map(|e| e.time_delta_s),
            speed_ms: estimate.map(|e| e.speed_ms),
            speed_kmh: estimate.map(|e| e.speed_kmh()),
            velocity_lat_deg_s: estimate.map(|e| e.velocity.latitude_deg_s),
            velocity_lon_deg_s: estimate.map(|e| e.velocity.longitude_deg_s),
            accel_speed_ms2: acceleration.map(|a| a.speed_ms2),
            accel_lat_deg_s2: acceleration.map(|a| a.latitude_deg_s2),
            accel_lon_deg_s2: acceleration.map(|a| a.longitude_deg_s2),
            error: report.error.as_ref().map(|e| e.to_string()),
        }
    }

    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

/// Rewrite `dir/live_status.json` every time a new report is published.
/// Ends when the session is dropped.
pub fn spawn_status_writer(
    mut reports: watch::Receiver<ReceiverReport>,
    dir: PathBuf,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let path = dir.join(STATUS_FILE);
        loop {
            let status = LiveStatus::from_report(&reports.borrow_and_update());
            if let Err(e) = status.save(&path).await {
                log::warn!("Failed to write {}: {}", path.display(), e);
            }
            if reports.changed().await.is_err() {
                break;
            }
        }
    })
}
