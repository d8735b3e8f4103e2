use super::state::{step, SyncState, TickOutcome};
use super::Phase;
use crate::broker::SampleSource;
use crate::distance::DistanceProvider;
use crate::error::{SyncError, SyncResult};
use crate::kinematics::KinematicsEstimator;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// What the presentation layer sees after every change.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ReceiverReport {
    pub phase: Phase,
    pub generation: u64,
    pub state: SyncState,
    pub error: Option<SyncError>,
    pub polls: u64,
    pub estimates: u64,
}

#[derive(Default)]
struct Core {
    generation: u64,
    state: SyncState,
    error: Option<SyncError>,
    polls: u64,
    estimates: u64,
}

impl Core {
    fn report(&self) -> ReceiverReport {
        ReceiverReport {
            phase: Phase::from_active(self.state.is_active),
            generation: self.generation,
            state: self.state.clone(),
            error: self.error.clone(),
            polls: self.polls,
            estimates: self.estimates,
        }
    }

    fn apply(&mut self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::Unavailable => {
                self.error = Some(SyncError::SampleUnavailable);
            }
            TickOutcome::Unchanged => {
                self.error = None;
            }
            TickOutcome::Advanced {
                state,
                estimated,
                error,
            } => {
                self.state = state.clone();
                self.error = error.clone();
                if *estimated {
                    self.estimates += 1;
                }
            }
            TickOutcome::Failed(e) => {
                self.error = Some(e.clone());
            }
            TickOutcome::Discarded => return,
        }
        self.polls += 1;
    }
}

struct Shared<S, D> {
    source: S,
    estimator: KinematicsEstimator<D>,
    core: Mutex<Core>,
    // Held for a whole tick so ticks never interleave
    tick_gate: tokio::sync::Mutex<()>,
    reports: watch::Sender<ReceiverReport>,
}

impl<S: SampleSource, D: DistanceProvider> Shared<S, D> {
    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, core: &Core) {
        self.reports.send_replace(core.report());
    }

    /// Run one tick for `generation`. The result is only adopted if the
    /// session is still on that generation when the tick completes.
    async fn tick(&self, generation: u64) -> TickOutcome {
        let _gate = self.tick_gate.lock().await;

        let snapshot = {
            let core = self.core();
            if core.generation != generation || !core.state.is_active {
                return TickOutcome::Discarded;
            }
            core.state.clone()
        };

        let outcome = step(&snapshot, &self.source, &self.estimator).await;

        let mut core = self.core();
        if core.generation != generation {
            log::debug!(
                "Discarding tick from generation {} (now {})",
                generation,
                core.generation
            );
            return TickOutcome::Discarded;
        }

        match &outcome {
            TickOutcome::Unchanged => log::debug!("Sample unchanged"),
            TickOutcome::Advanced { error: Some(e), .. } | TickOutcome::Failed(e) => {
                log::warn!("{}", e)
            }
            TickOutcome::Unavailable => log::info!("{}", SyncError::SampleUnavailable),
            _ => {}
        }

        core.apply(&outcome);
        self.publish(&core);
        outcome
    }
}

/// Consumer side: polls the broker and turns new samples into estimates
///
/// # States
/// - Idle: nothing polls; retained samples and estimates survive a stop
/// - Active: a timer pulls the broker every `poll_interval` (first pull immediate)
///
/// # Transitions
/// - `start`: Idle -> Active, new generation
/// - `stop`: Active -> Idle, cancels the timer, keeps retained values
/// - `reset`: any -> Idle, cancels the timer, clears everything
///
/// A tick that finishes after a stop or reset belongs to an old generation
/// and its result is dropped.
pub struct ReceiverSession<S, D> {
    shared: Arc<Shared<S, D>>,
    poller: Mutex<Option<JoinHandle<()>>>,
    poll_interval: Duration,
}

impl<S, D> ReceiverSession<S, D>
where
    S: SampleSource + 'static,
    D: DistanceProvider + 'static,
{
    pub fn new(source: S, estimator: KinematicsEstimator<D>, poll_interval: Duration) -> Self {
        let (reports, _) = watch::channel(ReceiverReport::default());
        Self {
            shared: Arc::new(Shared {
                source,
                estimator,
                core: Mutex::new(Core::default()),
                tick_gate: tokio::sync::Mutex::new(()),
                reports,
            }),
            poller: Mutex::new(None),
            poll_interval,
        }
    }

    /// Receiver of every published report.
    pub fn subscribe(&self) -> watch::Receiver<ReceiverReport> {
        self.shared.reports.subscribe()
    }

    pub fn report(&self) -> ReceiverReport {
        let report = self.shared.core().report();
        if report.phase.is_active() && !self.poller_running() {
            log::warn!(
                "Poll task for generation {} exited while the session is active",
                report.generation
            );
        }
        report
    }

    /// Whether the session is active and its poll task is still alive.
    pub fn is_polling(&self) -> bool {
        self.shared.core().state.is_active && self.poller_running()
    }

    fn poller_running(&self) -> bool {
        self.poller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn start(&self) -> SyncResult<()> {
        let generation = {
            let mut core = self.shared.core();
            if core.state.is_active {
                return Err(SyncError::AlreadyActive);
            }
            core.generation += 1;
            core.state = core.state.activated();
            core.error = None;
            self.shared.publish(&core);
            core.generation
        };

        log::info!(
            "Receiver started (generation {}, every {:?})",
            generation,
            self.poll_interval
        );
        let handle = spawn_poller(self.shared.clone(), generation, self.poll_interval);
        self.replace_poller(Some(handle));
        Ok(())
    }

    pub fn stop(&self) -> SyncResult<()> {
        {
            let mut core = self.shared.core();
            if !core.state.is_active {
                return Err(SyncError::NotActive);
            }
            core.generation += 1;
            core.state = core.state.deactivated();
            self.shared.publish(&core);
        }
        self.replace_poller(None);
        log::info!("Receiver stopped");
        Ok(())
    }

    pub fn reset(&self) {
        {
            let mut core = self.shared.core();
            let generation = core.generation + 1;
            *core = Core {
                generation,
                ..Core::default()
            };
            self.shared.publish(&core);
        }
        self.replace_poller(None);
        log::info!("Receiver reset");
    }

    /// Run a single tick now, outside the timer.
    pub async fn poll_once(&self) -> SyncResult<TickOutcome> {
        let generation = {
            let core = self.shared.core();
            if !core.state.is_active {
                return Err(SyncError::NotActive);
            }
            core.generation
        };
        Ok(self.shared.tick(generation).await)
    }

    fn replace_poller(&self, next: Option<JoinHandle<()>>) {
        let mut poller = self
            .poller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = poller.take() {
            previous.abort();
        }
        *poller = next;
    }
}

impl<S, D> Drop for ReceiverSession<S, D> {
    fn drop(&mut self) {
        if let Ok(mut poller) = self.poller.lock() {
            if let Some(handle) = poller.take() {
                handle.abort();
            }
        }
    }
}

fn spawn_poller<S, D>(shared: Arc<Shared<S, D>>, generation: u64, period: Duration) -> JoinHandle<()>
where
    S: SampleSource + 'static,
    D: DistanceProvider + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if shared.tick(generation).await == TickOutcome::Discarded {
                break;
            }
        }
        log::debug!("Poll task for generation {} retired", generation);
    })
}
