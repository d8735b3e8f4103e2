use super::Phase;
use crate::broker::SampleSink;
use crate::error::{SyncError, SyncResult};
use crate::sensors::{now_millis, LocationSensor, SensorEvent, SensorStream, WatchHandle};
use crate::types::PositionSample;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::Receiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SenderReport {
    pub phase: Phase,
    /// Last fix handed to the broker, whether or not the push succeeded
    pub last_sample: Option<PositionSample>,
    /// Wall-clock ms of the last successful push
    pub last_sent_at: Option<i64>,
    pub sent_count: u64,
    pub error: Option<SyncError>,
}

#[derive(Default)]
struct SenderCore {
    generation: u64,
    report: SenderReport,
}

struct SenderShared<K> {
    sink: K,
    core: Mutex<SenderCore>,
    reports: watch::Sender<SenderReport>,
}

impl<K: SampleSink> SenderShared<K> {
    fn core(&self) -> MutexGuard<'_, SenderCore> {
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `update` only if `generation` is still current.
    fn record(&self, generation: u64, update: impl FnOnce(&mut SenderReport)) -> bool {
        let mut core = self.core();
        if core.generation != generation {
            return false;
        }
        update(&mut core.report);
        self.reports.send_replace(core.report.clone());
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.core().generation == generation
    }

    async fn handle(&self, generation: u64, event: SensorEvent) -> bool {
        match event {
            SensorEvent::Fix(sample) => {
                if !self.is_current(generation) {
                    return false;
                }
                let result = self.sink.push(&sample).await;
                let sent_at = now_millis();

                self.record(generation, move |report| {
                    match result {
                        Ok(()) => {
                            report.sent_count += 1;
                            report.last_sent_at = Some(sent_at);
                            report.error = None;
                        }
                        Err(e) => {
                            log::warn!("{}", e);
                            report.error = Some(e);
                        }
                    }
                    report.last_sample = Some(sample);
                })
            }
            SensorEvent::Error(message) => {
                log::warn!("Sensor error: {}", message);
                self.record(generation, |report| {
                    report.error = Some(SyncError::SensorFailure(message));
                })
            }
        }
    }
}

struct Subscription {
    watch: WatchHandle,
    forwarder: JoinHandle<()>,
}

/// Producer side: subscribes to a sensor and pushes every fix to the broker
///
/// Fixes are pushed one at a time in arrival order. Sensor errors and failed
/// pushes are recorded on the report and the session keeps running; the next
/// successful push clears the error.
pub struct SenderSession<L, K> {
    sensor: L,
    shared: Arc<SenderShared<K>>,
    subscription: Mutex<Option<Subscription>>,
}

impl<L, K> SenderSession<L, K>
where
    L: LocationSensor,
    K: SampleSink + 'static,
{
    pub fn new(sensor: L, sink: K) -> Self {
        let (reports, _) = watch::channel(SenderReport::default());
        Self {
            sensor,
            shared: Arc::new(SenderShared {
                sink,
                core: Mutex::new(SenderCore::default()),
                reports,
            }),
            subscription: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SenderReport> {
        self.shared.reports.subscribe()
    }

    pub fn report(&self) -> SenderReport {
        let report = self.shared.core().report.clone();
        if report.phase.is_active() && !self.forwarder_running() {
            log::warn!("Fix forwarder exited while the sender is active");
        }
        report
    }

    /// Whether the session is active and still forwarding fixes.
    pub fn is_forwarding(&self) -> bool {
        self.shared.core().report.phase.is_active() && self.forwarder_running()
    }

    fn forwarder_running(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|subscription| !subscription.forwarder.is_finished())
    }

    pub fn start(&self) -> SyncResult<()> {
        let generation = {
            let mut core = self.shared.core();
            if core.report.phase.is_active() {
                return Err(SyncError::AlreadyActive);
            }
            core.generation += 1;
            core.report.phase = Phase::Active;
            core.report.error = None;
            self.shared.reports.send_replace(core.report.clone());
            core.generation
        };

        let SensorStream { events, watch } = self.sensor.watch_position();
        let forwarder = tokio::spawn(forward_fixes(self.shared.clone(), generation, events));
        self.replace_subscription(Some(Subscription { watch, forwarder }));

        log::info!("Sender started (generation {})", generation);
        Ok(())
    }

    pub fn stop(&self) -> SyncResult<()> {
        {
            let mut core = self.shared.core();
            if !core.report.phase.is_active() {
                return Err(SyncError::NotActive);
            }
            core.generation += 1;
            core.report.phase = Phase::Idle;
            self.shared.reports.send_replace(core.report.clone());
        }
        self.replace_subscription(None);
        log::info!("Sender stopped");
        Ok(())
    }

    pub fn reset(&self) {
        {
            let mut core = self.shared.core();
            let generation = core.generation + 1;
            *core = SenderCore {
                generation,
                report: SenderReport::default(),
            };
            self.shared.reports.send_replace(core.report.clone());
        }
        self.replace_subscription(None);
        log::info!("Sender reset");
    }

    fn replace_subscription(&self, next: Option<Subscription>) {
        let mut current = self
            .subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = current.take() {
            previous.watch.clear();
            previous.forwarder.abort();
        }
        *current = next;
    }
}

impl<L, K> Drop for SenderSession<L, K> {
    fn drop(&mut self) {
        if let Ok(mut current) = self.subscription.lock() {
            if let Some(subscription) = current.take() {
                subscription.forwarder.abort();
                subscription.watch.clear();
            }
        }
    }
}

async fn forward_fixes<K: SampleSink>(
    shared: Arc<SenderShared<K>>,
    generation: u64,
    mut events: Receiver<SensorEvent>,
) {
    while let Some(event) = events.recv().await {
        if !shared.handle(generation, event).await {
            log::debug!("Forwarder for generation {} retired", generation);
            return;
        }
    }

    // Sensor side went away on its own
    let recorded = shared.record(generation, |report| {
        report.error = Some(SyncError::SensorFailure("position stream closed".to_string()));
    });
    if recorded {
        log::warn!("Position stream closed while the sender is active");
    }
}
