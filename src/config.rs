use crate::broker::BrokerClient;
use crate::distance::{DistanceConfig, DistanceStrategy};
use crate::error::SyncResult;
use crate::kinematics::KinematicsEstimator;
use crate::sensors::{Gps, MockGps, TermuxGps};
use crate::sync::{ReceiverSession, SenderSession, DEFAULT_POLL_INTERVAL};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BROKER_URL: &str = "http://localhost:3001";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Receiver ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ReceiverConfig {
    pub broker_url: String,
    pub poll_interval: Duration,
    /// Bound on every broker request
    pub request_timeout: Duration,
    pub distance: DistanceConfig,

    // ── Presentation ──
    pub status_dir: Option<PathBuf>,
    pub dashboard_port: Option<u16>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            distance: DistanceConfig::default(),
            status_dir: None,
            dashboard_port: None,
        }
    }
}

impl ReceiverConfig {
    pub fn build(&self) -> SyncResult<ReceiverSession<BrokerClient, DistanceStrategy>> {
        let broker = BrokerClient::new(&self.broker_url, self.request_timeout)?;
        let distance = DistanceStrategy::from_config(&self.distance)?;
        Ok(ReceiverSession::new(
            broker,
            KinematicsEstimator::new(distance),
            self.poll_interval,
        ))
    }
}

// ─── Sender ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SensorKind {
    #[default]
    Termux,
    Mock,
}

#[derive(Clone, Debug)]
pub struct SenderConfig {
    pub broker_url: String,
    pub sensor: SensorKind,
    pub fix_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            sensor: SensorKind::default(),
            fix_interval: Duration::from_millis(1000),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl SenderConfig {
    pub fn build(&self) -> SyncResult<SenderSession<Gps, BrokerClient>> {
        let broker = BrokerClient::new(&self.broker_url, self.request_timeout)?;
        let sensor = match self.sensor {
            SensorKind::Termux => Gps::Termux(TermuxGps::new(self.fix_interval)),
            SensorKind::Mock => Gps::Mock(MockGps::new(self.fix_interval)),
        };
        Ok(SenderSession::new(sensor, broker))
    }
}
