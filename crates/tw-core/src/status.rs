//! Simulation status vocabulary and per-step results.
//!
//! Every worker step produces a [`StepResult`]; the scheduler folds its
//! workers' results with [`StepResult::merge`], and the driver folds the
//! schedulers' results the same way.  The fold must be associative and
//! commutative so the fan-in order never matters.

use std::fmt;

use crate::time::DueTime;

// ── SimulationStatus ─────────────────────────────────────────────────────────

/// The outcome of a simulation step (or of the merged run).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SimulationStatus {
    /// No status has been computed yet.
    #[default]
    NotSet,
    /// The step fired no events on any shard.
    NoRemainingWork,
    /// Work was done and nothing asked to halt.
    Running,
    /// The virtual clock reached the configured end time.
    EndTimeReached,
    /// A twin called `stop_simulation` during its own processing.
    InstanceRequestedStop,
    /// The driver was told to stop.
    UserRequested,
    /// The model/instance configuration changed in a way the run cannot absorb.
    UnexpectedChangeInConfiguration,
}

impl SimulationStatus {
    #[inline]
    pub fn is_running(self) -> bool {
        self == SimulationStatus::Running
    }

    /// Merge precedence.  Higher wins:
    /// `Running` beats `NoRemainingWork` (a shard that found work keeps the
    /// run alive), and every halt status beats `Running`.
    fn rank(self) -> u8 {
        match self {
            SimulationStatus::NotSet => 0,
            SimulationStatus::NoRemainingWork => 1,
            SimulationStatus::Running => 2,
            SimulationStatus::EndTimeReached => 3,
            SimulationStatus::InstanceRequestedStop => 4,
            SimulationStatus::UserRequested => 5,
            SimulationStatus::UnexpectedChangeInConfiguration => 6,
        }
    }

    /// The dominant status of the pair, per [`rank`](Self::rank).
    #[inline]
    pub fn merge(self, other: SimulationStatus) -> SimulationStatus {
        if other.rank() > self.rank() { other } else { self }
    }
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimulationStatus::NotSet => "not set",
            SimulationStatus::NoRemainingWork => "no remaining work",
            SimulationStatus::Running => "running",
            SimulationStatus::EndTimeReached => "end time reached",
            SimulationStatus::InstanceRequestedStop => "instance requested stop",
            SimulationStatus::UserRequested => "user requested stop",
            SimulationStatus::UnexpectedChangeInConfiguration => "unexpected configuration change",
        };
        f.write_str(name)
    }
}

// ── StepResult ───────────────────────────────────────────────────────────────

/// What one step produced: a status plus the earliest future due time seen.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepResult {
    pub status:    SimulationStatus,
    pub next_time: DueTime,
}

impl StepResult {
    /// The identity element of [`merge`](Self::merge).
    pub const EMPTY: StepResult = StepResult {
        status:    SimulationStatus::NoRemainingWork,
        next_time: DueTime::Indefinite,
    };

    pub fn new(status: SimulationStatus, next_time: DueTime) -> Self {
        Self { status, next_time }
    }

    /// Fold two shard results: dominant status, earliest next due time.
    #[inline]
    pub fn merge(self, other: StepResult) -> StepResult {
        StepResult {
            status:    self.status.merge(other.status),
            next_time: self.next_time.min(other.next_time),
        }
    }
}

// ── Behavior outcomes ────────────────────────────────────────────────────────

/// Whether a behavior callback changed its twin's state.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ProcessingResult {
    /// The twin's state changed.
    UpdateTwin,
    /// No change worth recording.
    NoUpdate,
}

/// Whether a send/create/delete operation was accepted.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SendingResult {
    Handled,
    NotHandled,
}

// ── Timers ───────────────────────────────────────────────────────────────────

/// Whether a timer fires once or repeats at its interval.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimerKind {
    OneTime,
    Recurring,
}

/// The outcome of a timer start/stop request.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TimerActionResult {
    Success,
    /// The per-twin concurrent-timer cap is already full.
    FailedTooManyTimers,
    /// `stop_timer` named a timer that is not registered.
    FailedNoSuchTimer,
    /// `start_timer` reused a name that is still registered.
    FailedTimerAlreadyExists,
    FailedInternalError,
}

// ── Shared-data outcomes ─────────────────────────────────────────────────────

/// The outcome of a shared key/value store operation.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CacheOperationStatus {
    ObjectRetrieved,
    ObjectPut,
    ObjectDoesNotExist,
    ObjectRemoved,
    CacheCleared,
}
