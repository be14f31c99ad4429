//! The engine's implementation of the behavior-facing context traits.
//!
//! One [`EngineContext`] exists per firing, built over the engine and the
//! currently locked twin envelope.  Scheduling verbs record into an
//! [`InvocationRequest`] that the caller (worker or message dispatcher)
//! applies after the callback returns; everything else acts on the engine
//! immediately.
//!
//! # Re-entrancy
//!
//! Proxy mutexes are not re-entrant, so a synchronous send whose target is
//! anywhere on the current thread's dispatch chain would self-deadlock.  The
//! chain is tracked in a thread-local stack; sends that would re-enter it are
//! refused (`NotHandled`) or, for `send_to_source`, diverted to the buffered
//! outbox.
//!
//! The stack is per-thread, so it cannot see a cycle that spans threads: two
//! twins firing concurrently on different shards that each send to the other
//! will block on each other's envelope lock.  Behaviors that send mid-firing
//! must keep their send graph acyclic across shards.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

use tracing::{debug, warn};
use tw_core::{
    AlertMessage, Delay, DueTime, LogRecord, LogSeverity, SendingResult, SharedData, SimTime,
    TimerActionResult, TimerKind,
};
use tw_model::{ProcessingContext, SimulationController, TimerCallback, TwinMeta};

use crate::engine::{ExecutionEngine, StepClock};
use crate::event::WorkerCommand;
use crate::proxy::TwinProxy;

// ── Dispatch-chain tracking ──────────────────────────────────────────────────

thread_local! {
    static IN_FLIGHT: RefCell<Vec<(Arc<str>, Arc<str>)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a twin as being processed on this thread for the guard's lifetime.
pub(crate) struct InFlightGuard;

impl InFlightGuard {
    pub(crate) fn enter(model: Arc<str>, id: Arc<str>) -> InFlightGuard {
        IN_FLIGHT.with(|stack| stack.borrow_mut().push((model, id)));
        InFlightGuard
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        IN_FLIGHT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Is `model`/`id` currently locked somewhere up this thread's call chain?
pub(crate) fn in_flight(model: &str, id: &str) -> bool {
    IN_FLIGHT.with(|stack| {
        stack
            .borrow()
            .iter()
            .any(|(m, i)| &**m == model && &**i == id)
    })
}

// ── InvocationRequest ────────────────────────────────────────────────────────

/// Scheduling requests recorded during one firing, applied afterwards.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct InvocationRequest {
    pub delay:   Delay,
    pub deleted: bool,
    pub stop:    bool,
    pub rerun:   bool,
}

// ── EngineContext ────────────────────────────────────────────────────────────

pub(crate) struct EngineContext<'a> {
    engine: &'a ExecutionEngine,
    proxy:  Arc<TwinProxy>,
    meta:   &'a mut TwinMeta,
    clock:  StepClock,
    source: Option<(Arc<str>, Arc<str>)>,
    pub(crate) request: InvocationRequest,
}

impl<'a> EngineContext<'a> {
    pub(crate) fn new(
        engine: &'a ExecutionEngine,
        proxy:  Arc<TwinProxy>,
        meta:   &'a mut TwinMeta,
        clock:  StepClock,
        source: Option<(Arc<str>, Arc<str>)>,
    ) -> Self {
        Self { engine, proxy, meta, clock, source, request: InvocationRequest::default() }
    }

    fn identity(&self) -> (Arc<str>, Arc<str>) {
        (Arc::clone(&self.meta.model), Arc::clone(&self.meta.id))
    }
}

impl SimulationController for EngineContext<'_> {
    fn delay(&mut self, millis: u64) {
        self.request.delay = Delay::Finite(millis);
    }

    fn delay_indefinitely(&mut self) {
        self.request.delay = Delay::Indefinite;
    }

    fn emit_telemetry(&mut self, model: &str, payload: &[u8]) -> SendingResult {
        if in_flight(model, &self.meta.id) {
            warn!(
                target_model = model,
                id = %self.meta.id,
                "re-entrant telemetry dropped"
            );
            return SendingResult::NotHandled;
        }
        match self.engine.send_telemetry(model, self.identity(), payload) {
            Ok(result) => result,
            Err(err) => {
                warn!(target_model = model, "telemetry failed: {err}");
                SendingResult::NotHandled
            }
        }
    }

    fn create_instance(
        &mut self,
        model: &str,
        id:    &str,
        state: Box<dyn Any + Send>,
    ) -> SendingResult {
        match self.engine.register_instance(model, id, Some(state)) {
            Ok(_) => SendingResult::Handled,
            Err(err) => {
                warn!(model, id, "create_instance failed: {err}");
                SendingResult::NotHandled
            }
        }
    }

    fn delete_instance(&mut self, model: &str, id: &str) -> SendingResult {
        if model == &*self.meta.model && id == &*self.meta.id {
            self.delete_this_instance();
            return SendingResult::Handled;
        }
        match self.engine.delete_instance(model, id) {
            Ok(()) => SendingResult::Handled,
            Err(err) => {
                warn!(model, id, "delete_instance failed: {err}");
                SendingResult::NotHandled
            }
        }
    }

    fn delete_this_instance(&mut self) {
        self.request.deleted = true;
        if let Err(err) = self.engine.delete_instance(&self.meta.model, &self.meta.id) {
            debug!(model = %self.meta.model, id = %self.meta.id, "self-delete: {err}");
        }
    }

    fn run_this_instance(&mut self) {
        self.request.rerun = true;
    }

    fn stop_simulation(&mut self) {
        self.request.stop = true;
        self.engine.flag_stop();
    }

    fn simulation_start_time(&self) -> SimTime {
        self.clock.start
    }

    fn time_increment(&self) -> u64 {
        self.clock.iteration_millis
    }
}

impl ProcessingContext for EngineContext<'_> {
    fn model(&self) -> &str {
        &self.meta.model
    }

    fn instance_id(&self) -> &str {
        &self.meta.id
    }

    fn source_model(&self) -> Option<&str> {
        self.source.as_ref().map(|(model, _)| &**model)
    }

    fn source_id(&self) -> Option<&str> {
        self.source.as_ref().map(|(_, id)| &**id)
    }

    fn current_time(&self) -> SimTime {
        self.clock.now
    }

    fn send_to_source(&mut self, payload: &[u8]) -> SendingResult {
        match self.source.clone() {
            Some((model, id)) if self.engine.has_model(&model) => {
                if in_flight(&model, &id) {
                    // The source is up-stack; deliver through the outbox.
                    self.engine
                        .buffer_source_message(&self.meta.model, &self.meta.id, payload.to_vec());
                    return SendingResult::Handled;
                }
                match self.engine.send_message(&model, &id, Some(self.identity()), payload) {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(source_model = %model, source_id = %id, "send_to_source failed: {err}");
                        SendingResult::NotHandled
                    }
                }
            }
            _ => {
                self.engine
                    .buffer_source_message(&self.meta.model, &self.meta.id, payload.to_vec());
                SendingResult::Handled
            }
        }
    }

    fn send_to_twin(&mut self, model: &str, id: &str, payload: &[u8]) -> SendingResult {
        if in_flight(model, id) {
            warn!(model, id, "re-entrant send dropped");
            return SendingResult::NotHandled;
        }
        match self.engine.send_message(model, id, Some(self.identity()), payload) {
            Ok(result) => result,
            Err(err) => {
                warn!(model, id, "send_to_twin failed: {err}");
                SendingResult::NotHandled
            }
        }
    }

    fn send_to_twin_batch(&mut self, model: &str, id: &str, payloads: &[&[u8]]) -> SendingResult {
        if in_flight(model, id) {
            warn!(model, id, "re-entrant batch send dropped");
            return SendingResult::NotHandled;
        }
        match self.engine.send_message_batch(model, id, Some(self.identity()), payloads) {
            Ok(result) => result,
            Err(err) => {
                warn!(model, id, "send_to_twin_batch failed: {err}");
                SendingResult::NotHandled
            }
        }
    }

    fn send_alert(&mut self, provider: &str, alert: AlertMessage) -> SendingResult {
        self.engine.record_alert(&self.meta.model, provider, alert)
    }

    fn log_message(&mut self, severity: LogSeverity, message: &str) {
        self.engine.record_log(
            &self.meta.model,
            LogRecord {
                time:     self.clock.now,
                severity,
                instance: self.meta.id.to_string(),
                message:  message.to_owned(),
            },
        );
    }

    fn start_timer(
        &mut self,
        name:            &str,
        interval_millis: u64,
        kind:            TimerKind,
        callback:        TimerCallback,
    ) -> TimerActionResult {
        let result = self.meta.register_timer(name, kind, interval_millis, callback.clone());
        if result != TimerActionResult::Success {
            return result;
        }
        if self.engine.simulation_active() {
            self.engine.post_command(
                &self.meta.model,
                &self.meta.id,
                WorkerCommand::StartTimer {
                    id:    Arc::clone(&self.meta.id),
                    proxy: Arc::clone(&self.proxy),
                    name:  name.to_owned(),
                    kind,
                    interval_millis,
                    callback,
                    due: DueTime::At(self.clock.now + interval_millis),
                },
            );
        } else {
            self.engine
                .wall_timers()
                .start_timer(&self.meta.model, &self.meta.id, name, kind, interval_millis);
        }
        TimerActionResult::Success
    }

    fn stop_timer(&mut self, name: &str) -> TimerActionResult {
        let result = self.meta.unregister_timer(name);
        if result == TimerActionResult::Success {
            if self.engine.simulation_active() {
                self.engine.post_command(
                    &self.meta.model,
                    &self.meta.id,
                    WorkerCommand::StopTimer {
                        id:   Arc::clone(&self.meta.id),
                        name: name.to_owned(),
                    },
                );
            } else {
                self.engine
                    .wall_timers()
                    .stop_timer(&self.meta.model, &self.meta.id, name);
            }
        }
        result
    }

    fn shared_model_data(&self) -> SharedData {
        self.engine.shared_model_data(&self.meta.model)
    }

    fn shared_global_data(&self) -> SharedData {
        self.engine.shared_global_data()
    }

    fn controller(&mut self) -> &mut dyn SimulationController {
        self
    }
}
