use crate::types::PositionSample;
use chrono::Utc;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// One event from a position subscription.
#[derive(Clone, Debug, PartialEq)]
pub enum SensorEvent {
    Fix(PositionSample),
    Error(String),
}

/// Cancels a position subscription.
///
/// `clear` consumes the handle and dropping it has the same effect, so a
/// subscription is released exactly once whichever happens first.
pub struct WatchHandle {
    task: Option<JoinHandle<()>>,
    on_clear: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self {
            task: Some(task),
            on_clear: None,
        }
    }

    /// Run `hook` when the subscription is released.
    pub fn on_clear(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_clear = Some(Box::new(hook));
        self
    }

    pub fn clear(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(hook) = self.on_clear.take() {
            hook();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// A live subscription: the event channel plus the handle that ends it.
pub struct SensorStream {
    pub events: Receiver<SensorEvent>,
    pub watch: WatchHandle,
}

/// Anything that can deliver a stream of position fixes.
pub trait LocationSensor: Send + Sync {
    fn watch_position(&self) -> SensorStream;
}

const CHANNEL_CAPACITY: usize = 16;

/// Spawn `read` on a fixed interval, forwarding each result as an event.
fn spawn_fix_loop<F, Fut>(name: &'static str, period: Duration, mut read: F) -> SensorStream
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = SensorEvent> + Send,
{
    let (tx, events) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut fix_count = 0u64;

        loop {
            ticker.tick().await;
            let event = read().await;
            if matches!(event, SensorEvent::Fix(_)) {
                fix_count += 1;
                if fix_count % 100 == 0 {
                    log::debug!("[{}] {} fixes", name, fix_count);
                }
            }
            if !forward(&tx, event) {
                log::debug!("[{}] Channel closed after {} fixes", name, fix_count);
                break;
            }
        }
    });

    SensorStream {
        events,
        watch: WatchHandle::new(task),
    }
}

/// Returns false once the receiving side is gone.
fn forward(tx: &Sender<SensorEvent>, event: SensorEvent) -> bool {
    match tx.try_send(event) {
        Ok(_) => true,
        Err(mpsc::error::TrySendError::Closed(_)) => false,
        // Consumer is behind, drop this fix
        Err(mpsc::error::TrySendError::Full(_)) => true,
    }
}

/// GPS through Termux:API (`termux-location`).
pub struct TermuxGps {
    period: Duration,
}

impl TermuxGps {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl LocationSensor for TermuxGps {
    fn watch_position(&self) -> SensorStream {
        spawn_fix_loop("gps", self.period, read_termux_location)
    }
}

#[derive(Deserialize)]
struct TermuxLocation {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    speed: Option<f64>,
}

async fn read_termux_location() -> SensorEvent {
    let output = match Command::new("termux-location")
        .args(["-p", "gps", "-r", "once"])
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => return SensorEvent::Error(format!("termux-location: {}", e)),
    };

    if !output.status.success() {
        return SensorEvent::Error(format!("termux-location exited with {}", output.status));
    }

    parse_termux_location(&String::from_utf8_lossy(&output.stdout), now_millis())
}

/// Parse the JSON printed by `termux-location` into a fix stamped `timestamp`.
pub fn parse_termux_location(output: &str, timestamp: i64) -> SensorEvent {
    let location: TermuxLocation = match serde_json::from_str(output.trim()) {
        Ok(location) => location,
        Err(e) => return SensorEvent::Error(format!("Unreadable location output: {}", e)),
    };

    match PositionSample::new(location.latitude, location.longitude, timestamp, location.speed) {
        Ok(sample) => SensorEvent::Fix(sample),
        Err(e) => SensorEvent::Error(e.to_string()),
    }
}

/// Synthetic GPS walking north-east from a start point.
pub struct MockGps {
    period: Duration,
    start: (f64, f64),
    step_deg: f64,
}

impl MockGps {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            start: (37.7749, -122.4194),
            step_deg: 0.00001,
        }
    }

    pub fn starting_at(mut self, latitude: f64, longitude: f64) -> Self {
        self.start = (latitude, longitude);
        self
    }
}

impl LocationSensor for MockGps {
    fn watch_position(&self) -> SensorStream {
        let (lat0, lon0) = self.start;
        let step = self.step_deg;
        let period_ms = self.period.as_millis().max(1) as i64;
        let t0 = now_millis();
        let mut seq = 0u64;

        // Timestamps advance by exactly one period so fixes never collide
        spawn_fix_loop("mock-gps", self.period, move || {
            let n = seq as f64;
            let timestamp = t0 + seq as i64 * period_ms;
            seq += 1;
            let event = match PositionSample::new(
                lat0 + n * step,
                lon0 + n * step,
                timestamp,
                Some(10.0 + (n * 0.5).sin() * 5.0),
            ) {
                Ok(sample) => SensorEvent::Fix(sample),
                Err(e) => SensorEvent::Error(e.to_string()),
            };
            async move { event }
        })
    }
}

/// Sensor picked at startup.
pub enum Gps {
    Termux(TermuxGps),
    Mock(MockGps),
}

impl LocationSensor for Gps {
    fn watch_position(&self) -> SensorStream {
        match self {
            Gps::Termux(gps) => gps.watch_position(),
            Gps::Mock(gps) => gps.watch_position(),
        }
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_parse_termux_output() {
        let output = r#"{
  "latitude": 37.7749,
  "longitude": -122.4194,
  "altitude": 12.0,
  "accuracy": 4.5,
  "vertical_accuracy": 3.0,
  "bearing": 90.0,
  "speed": 1.25,
  "elapsedMs": 31,
  "provider": "gps"
}"#;

        match parse_termux_location(output, 1234) {
            SensorEvent::Fix(sample) => {
                assert_eq!(sample.latitude(), 37.7749);
                assert_eq!(sample.speed_hint(), Some(1.25));
                assert_eq!(sample.timestamp(), 1234);
            }
            other => panic!("expected fix, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_termux_garbage() {
        assert!(matches!(parse_termux_location("", 1), SensorEvent::Error(_)));
        assert!(matches!(
            parse_termux_location(r#"{"latitude": 200.0, "longitude": 0.0}"#, 1),
            SensorEvent::Error(_)
        ));
    }

    #[test]
    fn test_forward_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        assert!(forward(&tx, SensorEvent::Error("a".into())));
        // Full: dropped but still alive
        assert!(forward(&tx, SensorEvent::Error("b".into())));
        drop(rx);
        assert!(!forward(&tx, SensorEvent::Error("c".into())));
    }

    #[tokio::test]
    async fn test_watch_handle_clears_once() {
        let cleared = Arc::new(AtomicUsize::new(0));
        let counter = cleared.clone();
        let task = tokio::spawn(std::future::pending::<()>());

        let handle = WatchHandle::new(task).on_clear(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.clear();

        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_watch_handle_drop_clears() {
        let cleared = Arc::new(AtomicUsize::new(0));
        let counter = cleared.clone();
        let task = tokio::spawn(std::future::pending::<()>());

        {
            let _handle = WatchHandle::new(task).on_clear(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_gps_emits_increasing_fixes() {
        let mut stream = MockGps::new(Duration::from_millis(100))
            .starting_at(40.0, -75.0)
            .watch_position();

        let mut fixes = Vec::new();
        while fixes.len() < 3 {
            if let Some(SensorEvent::Fix(sample)) = stream.events.recv().await {
                fixes.push(sample);
            }
        }

        assert_eq!(fixes[0].latitude(), 40.0);
        assert!(fixes[1].latitude() > fixes[0].latitude());
        assert_eq!(fixes[1].timestamp() - fixes[0].timestamp(), 100);
        assert!(fixes[2].longitude() > fixes[1].longitude());
        stream.watch.clear();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_watch_closes_stream() {
        let SensorStream { mut events, watch } =
            MockGps::new(Duration::from_millis(100)).watch_position();

        assert!(events.recv().await.is_some());
        watch.clear();

        // Task aborted, sender dropped: buffered events drain, then None
        while events.recv().await.is_some() {}
    }
}
