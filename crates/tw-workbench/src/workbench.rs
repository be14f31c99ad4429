//! The simulation workbench.
//!
//! `Workbench` is the single-threaded driver around the execution engine: it
//! owns the virtual clock, advances it one iteration per [`step`], and fans
//! each step out through the engine's schedulers.  The clock advances
//! *before* dispatch, so a window of `end - start` milliseconds at iteration
//! size `i` dispatches exactly `(end - start) / i` steps, the last one at
//! exactly `end`; the step after that reports `EndTimeReached` without
//! dispatching.
//!
//! [`step`]: Workbench::step

use std::any::Any;
use std::sync::Arc;

use tracing::info;
use tw_core::{
    AlertMessage, AlertProviderConfig, DueTime, LogRecord, SendingResult, SimTime,
    SimulationStatus, StepResult,
};
use tw_engine::{EngineError, ExecutionEngine, StepControl};
use tw_model::{
    MessageProcessor, ModelError, RealTimeModel, SimulationModel, SimulationProcessor,
};

use crate::error::{WorkbenchError, WorkbenchResult};

// ── RunState ─────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug)]
struct RunState {
    end:              SimTime,
    iteration_millis: u64,
    now:              SimTime,
    last:             StepResult,
}

// ── Workbench ────────────────────────────────────────────────────────────────

pub struct Workbench {
    engine: Arc<ExecutionEngine>,
    run:    Option<RunState>,
}

impl Default for Workbench {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbench {
    pub fn new() -> Self {
        Self {
            engine: Arc::new(ExecutionEngine::default()),
            run:    None,
        }
    }

    /// A workbench sharding each model across `worker_count` workers.
    pub fn with_worker_count(worker_count: usize) -> Self {
        Self {
            engine: Arc::new(ExecutionEngine::new(worker_count)),
            run:    None,
        }
    }

    /// The underlying engine, for hosts that need direct access.
    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    // ── Registration ──────────────────────────────────────────────────────

    /// Register a message-only model; its twins are never stepped.
    pub fn add_real_time_model<M>(&self, name: &str, processor: M) -> WorkbenchResult<()>
    where
        M: MessageProcessor,
        M::Twin: Default,
    {
        self.engine.add_model(name, Arc::new(RealTimeModel::new(processor)))?;
        Ok(())
    }

    /// Register a simulated model: message handling plus step behavior over
    /// the same twin type.
    pub fn add_simulation_model<M, S>(
        &self,
        name:       &str,
        processor:  M,
        simulation: S,
    ) -> WorkbenchResult<()>
    where
        M: MessageProcessor,
        M::Twin: Default,
        S: SimulationProcessor<Twin = M::Twin>,
    {
        self.engine
            .add_model(name, Arc::new(SimulationModel::new(processor, simulation)))?;
        Ok(())
    }

    /// Create an instance of `model` with the given initial state.
    pub fn add_instance<T>(&self, model: &str, id: &str, state: T) -> WorkbenchResult<()>
    where
        T: Send + 'static,
    {
        self.engine.register_instance(model, id, Some(Box::new(state)))?;
        Ok(())
    }

    pub fn delete_instance(&self, model: &str, id: &str) -> WorkbenchResult<()> {
        self.engine.delete_instance(model, id)?;
        Ok(())
    }

    pub fn add_alert_provider(&self, model: &str, config: AlertProviderConfig) {
        self.engine.add_alert_provider(model, config);
    }

    /// Deliver a message to a twin, creating it on demand.
    pub fn send(&self, model: &str, id: &str, payload: &[u8]) -> WorkbenchResult<SendingResult> {
        Ok(self.engine.send_message(model, id, None, payload)?)
    }

    /// Deliver a batch of payloads to a twin in one handler invocation.
    pub fn send_batch(
        &self,
        model:    &str,
        id:       &str,
        payloads: &[&[u8]],
    ) -> WorkbenchResult<SendingResult> {
        Ok(self.engine.send_message_batch(model, id, None, payloads)?)
    }

    // ── Simulation control ────────────────────────────────────────────────

    /// Activate simulated time over `[start, end]` and run every instance's
    /// simulation-init hook.
    pub fn initialize_simulation(
        &mut self,
        start:            SimTime,
        end:              SimTime,
        iteration_millis: u64,
    ) -> WorkbenchResult<StepResult> {
        if iteration_millis == 0 {
            return Err(WorkbenchError::InvalidWindow("iteration size must be positive".into()));
        }
        if end <= start {
            return Err(WorkbenchError::InvalidWindow(format!(
                "end time {end} must be after start time {start}"
            )));
        }
        self.engine.begin_simulation(start, end, iteration_millis)?;
        self.engine.run_step(StepControl::Start)?;
        info!(%start, %end, iteration_millis, "simulation initialized");

        let last = StepResult::new(SimulationStatus::Running, DueTime::At(start));
        self.run = Some(RunState { end, iteration_millis, now: start, last });
        Ok(last)
    }

    /// Advance the clock one iteration and dispatch everything due.
    ///
    /// Once the clock would pass the end time, every further call reports
    /// `EndTimeReached` at exactly the end time without dispatching.
    pub fn step(&mut self) -> WorkbenchResult<StepResult> {
        let run = self.run.as_mut().ok_or(WorkbenchError::NotInitialized)?;

        run.now = run.now + run.iteration_millis;
        if run.now > run.end {
            run.now = run.end;
            self.engine.end_simulation();
            run.last = StepResult::new(SimulationStatus::EndTimeReached, DueTime::At(run.end));
            return Ok(run.last);
        }

        self.engine.advance_clock(run.now);
        let mut merged = self.engine.run_step(StepControl::Run)?;
        if self.engine.take_stop_request() {
            merged.status = merged.status.merge(SimulationStatus::InstanceRequestedStop);
        }
        run.last = merged;
        Ok(merged)
    }

    /// Initialize and step until the run halts, checking for a halt after
    /// each burst of `iteration_count` steps.
    ///
    /// Within a burst, statuses fold together so a stop request is never
    /// lost to a later quiet step.  `NoRemainingWork` does not halt the
    /// loop — a quiet step may be followed by a future timer or delayed
    /// wake-up — so the run ends at the end time or on an explicit stop.
    pub fn run_simulation(
        &mut self,
        start:            SimTime,
        end:              SimTime,
        iteration_count:  u64,
        iteration_millis: u64,
    ) -> WorkbenchResult<StepResult> {
        if iteration_count == 0 {
            return Err(WorkbenchError::InvalidWindow("iteration count must be positive".into()));
        }
        self.initialize_simulation(start, end, iteration_millis)?;
        loop {
            let mut burst = StepResult::EMPTY;
            for _ in 0..iteration_count {
                burst = burst.merge(self.step()?);
                if burst.status == SimulationStatus::EndTimeReached {
                    break;
                }
            }
            match burst.status {
                SimulationStatus::Running | SimulationStatus::NoRemainingWork => {}
                _ => {
                    info!(status = %burst.status, "simulation halted");
                    return Ok(burst);
                }
            }
        }
    }

    /// Halt the run, discarding all queued events.
    pub fn stop_simulation(&mut self) -> WorkbenchResult<StepResult> {
        let run = self.run.as_mut().ok_or(WorkbenchError::NotInitialized)?;
        let result = self.engine.run_step(StepControl::Stop)?;
        self.engine.end_simulation();
        run.last = result;
        Ok(result)
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// The virtual time of the most recent step.
    pub fn current_time(&self) -> Option<SimTime> {
        self.run.map(|run| run.now)
    }

    /// The earliest future due time reported by the most recent step.
    pub fn peek_next_time(&self) -> Option<DueTime> {
        self.run.map(|run| run.last.next_time)
    }

    pub fn instance_ids(&self, model: &str) -> Vec<String> {
        self.engine.instance_ids(model)
    }

    /// Read one twin's state under its lock.
    pub fn with_instance<T, R>(
        &self,
        model: &str,
        id:    &str,
        f:     impl FnOnce(&T) -> R,
    ) -> WorkbenchResult<R>
    where
        T: Any,
    {
        let proxy = self
            .engine
            .proxy(model, id)
            .ok_or_else(|| EngineError::UnknownInstance {
                model: model.to_owned(),
                id:    id.to_owned(),
            })?;
        let envelope = proxy.envelope()?;
        let state = envelope
            .state_as::<T>()
            .ok_or(EngineError::Model(ModelError::StateTypeMismatch))?;
        Ok(f(state))
    }

    /// Drain buffered replies addressed to the source of `model`/`id`.
    pub fn source_messages(&self, model: &str, id: &str) -> Vec<Vec<u8>> {
        self.engine.source_messages(model, id)
    }

    /// Messages logged by `model`'s instances at or after `since`.
    pub fn logged_messages(&self, model: &str, since: SimTime) -> Vec<LogRecord> {
        self.engine.logged_messages(model, since)
    }

    pub fn alert_messages(&self, model: &str, provider: &str) -> Vec<AlertMessage> {
        self.engine.alert_messages(model, provider)
    }
}
