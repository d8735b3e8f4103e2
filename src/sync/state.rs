use crate::broker::SampleSource;
use crate::distance::DistanceProvider;
use crate::error::{SyncError, SyncResult};
use crate::kinematics::KinematicsEstimator;
use crate::types::{DerivedEstimate, PositionSample};
use serde::Serialize;

/// What the receiver remembers between ticks.
///
/// Treated as an immutable snapshot: every transition returns a new value.
/// Only the current and immediately preceding sample and estimate are kept.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SyncState {
    pub last_sample: Option<PositionSample>,
    pub previous_sample: Option<PositionSample>,
    pub last_estimate: Option<DerivedEstimate>,
    pub previous_estimate: Option<DerivedEstimate>,
    pub is_active: bool,
}

/// How a freshly pulled broker value relates to the held state.
#[derive(Clone, Debug, PartialEq)]
pub enum Observation {
    /// Broker holds nothing yet
    Unavailable,
    /// Same timestamp as `last_sample`
    Unchanged,
    New(PositionSample),
}

impl SyncState {
    pub fn activated(&self) -> Self {
        Self {
            is_active: true,
            ..self.clone()
        }
    }

    /// Stopping keeps every retained value.
    pub fn deactivated(&self) -> Self {
        Self {
            is_active: false,
            ..self.clone()
        }
    }

    pub fn observe(&self, pulled: Option<PositionSample>) -> Observation {
        match (pulled, &self.last_sample) {
            (None, _) => Observation::Unavailable,
            (Some(sample), Some(last)) if sample.same_fix(last) => Observation::Unchanged,
            (Some(sample), _) => Observation::New(sample),
        }
    }

    /// Shift samples forward by one slot. Estimates shift only when a new
    /// estimate was produced; otherwise both are kept as they were, so
    /// `previous_estimate` does not take `last_estimate` on a sample that
    /// yielded no estimate.
    pub fn advance(&self, sample: PositionSample, estimate: Option<DerivedEstimate>) -> Self {
        let (last_estimate, previous_estimate) = match estimate {
            Some(estimate) => (Some(estimate), self.last_estimate),
            None => (self.last_estimate, self.previous_estimate),
        };

        Self {
            previous_sample: self.last_sample.clone(),
            last_sample: Some(sample),
            last_estimate,
            previous_estimate,
            is_active: self.is_active,
        }
    }
}

/// Result of one consumer tick.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    Unavailable,
    Unchanged,
    /// A new sample was taken in. `error` is set when its estimate failed;
    /// the sample still advances.
    Advanced {
        state: SyncState,
        estimated: bool,
        error: Option<SyncError>,
    },
    /// The pull itself failed; state untouched.
    Failed(SyncError),
    /// The session was stopped or reset while this tick was running.
    Discarded,
}

/// One consumer tick: pull, classify, estimate, and produce the next state.
///
/// `state` is never modified; the caller decides whether to adopt the
/// returned state.
pub async fn step<S, D>(
    state: &SyncState,
    source: &S,
    estimator: &KinematicsEstimator<D>,
) -> TickOutcome
where
    S: SampleSource,
    D: DistanceProvider,
{
    let pulled = match source.latest().await {
        Ok(pulled) => pulled,
        Err(e) => return TickOutcome::Failed(e),
    };

    let sample = match state.observe(pulled) {
        Observation::Unavailable => return TickOutcome::Unavailable,
        Observation::Unchanged => return TickOutcome::Unchanged,
        Observation::New(sample) => sample,
    };

    let estimate: SyncResult<Option<DerivedEstimate>> = match &state.last_sample {
        Some(previous) => {
            estimator
                .estimate(previous, &sample, state.last_estimate.as_ref())
                .await
        }
        None => Ok(None),
    };

    match estimate {
        Ok(estimate) => TickOutcome::Advanced {
            estimated: estimate.is_some(),
            state: state.advance(sample, estimate),
            error: None,
        },
        Err(e) => TickOutcome::Advanced {
            state: state.advance(sample, None),
            estimated: false,
            error: Some(e),
        },
    }
}
