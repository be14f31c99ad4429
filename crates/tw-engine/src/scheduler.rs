//! Per-model schedulers.
//!
//! A scheduler owns one worker per shard and assigns instances to shards by
//! the seeded id hash, so an instance's shard never changes and never depends
//! on registration order.  A step fans the workers out in parallel, joins
//! them all, and folds their results; a worker error aborts the whole step.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;
use tw_core::{DueTime, SimulationStatus, StepResult, shard_index};
use tw_model::ModelRuntime;

use crate::engine::{ExecutionEngine, StepClock};
use crate::error::EngineResult;
use crate::worker::SimulationWorker;

// ── StepControl ──────────────────────────────────────────────────────────────

/// What a scheduler should do with one step request.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StepControl {
    /// Run every instance's simulation-init hook; no events fire.
    Start,
    /// Drain everything due at the step's current time.
    Run,
    /// Discard all queued events and halt.
    Stop,
}

// ── SimulationScheduler ──────────────────────────────────────────────────────

pub(crate) struct SimulationScheduler {
    model:   Arc<str>,
    workers: Vec<Arc<SimulationWorker>>,
}

impl SimulationScheduler {
    pub(crate) fn new(model: Arc<str>, runtime: Arc<dyn ModelRuntime>, worker_count: usize) -> Self {
        let workers = (0..worker_count.max(1))
            .map(|_| Arc::new(SimulationWorker::new(Arc::clone(&model), Arc::clone(&runtime))))
            .collect();
        Self { model, workers }
    }

    /// The shard worker owning instance `id`.
    pub(crate) fn worker_for(&self, id: &str) -> &Arc<SimulationWorker> {
        &self.workers[shard_index(id, self.workers.len())]
    }

    pub(crate) fn step(
        &self,
        engine:  &ExecutionEngine,
        clock:   &StepClock,
        control: StepControl,
    ) -> EngineResult<StepResult> {
        match control {
            StepControl::Start => {
                debug!(model = %self.model, start = %clock.now, "starting instances");
                for worker in &self.workers {
                    worker.start_instances(engine, clock)?;
                }
                Ok(StepResult::new(SimulationStatus::Running, DueTime::At(clock.now)))
            }
            StepControl::Stop => {
                debug!(model = %self.model, "clearing queued events");
                for worker in &self.workers {
                    worker.clear()?;
                }
                Ok(StepResult::new(SimulationStatus::UserRequested, DueTime::At(clock.now)))
            }
            StepControl::Run => {
                let results: Vec<EngineResult<StepResult>> = self
                    .workers
                    .par_iter()
                    .map(|worker| worker.run_step(engine, clock))
                    .collect();
                let mut merged = StepResult::EMPTY;
                for result in results {
                    merged = merged.merge(result?);
                }
                Ok(merged)
            }
        }
    }
}
