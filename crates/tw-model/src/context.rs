//! Context traits handed to behavior callbacks.
//!
//! Behaviors never see the engine directly.  Everything they may do during a
//! firing — send, log, start timers, steer their own scheduling — goes
//! through these object-safe traits, which the engine implements over the
//! twin currently being processed.

use std::any::Any;

use tw_core::{AlertMessage, LogSeverity, SendingResult, SharedData, SimTime, TimerActionResult, TimerKind};

use crate::timer::TimerCallback;

// ── SimulationController ─────────────────────────────────────────────────────

/// Control surface for steering the simulation from inside a firing.
///
/// Scheduling requests (`delay*`, `run_this_instance`, `stop_simulation`,
/// `delete_this_instance`) are recorded against the current firing and take
/// effect when the callback returns; instance creation and deletion of
/// *other* twins take effect immediately.
pub trait SimulationController {
    /// Re-fire this twin `millis` after the current instant instead of at the
    /// default cadence.  Zero means "again within this same step".
    fn delay(&mut self, millis: u64);

    /// Sleep until explicitly woken (a message or `run_this_instance`).
    fn delay_indefinitely(&mut self);

    /// Send telemetry to the instance with this twin's id in `model`,
    /// creating it on demand.
    fn emit_telemetry(&mut self, model: &str, payload: &[u8]) -> SendingResult;

    /// Create (or replace) an instance of `model`.
    fn create_instance(
        &mut self,
        model: &str,
        id:    &str,
        state: Box<dyn Any + Send>,
    ) -> SendingResult;

    /// Delete an instance of `model`.  Its pending events are discarded.
    fn delete_instance(&mut self, model: &str, id: &str) -> SendingResult;

    /// Delete the twin currently being processed.
    fn delete_this_instance(&mut self);

    /// Re-fire this twin immediately, bypassing any pending delay.
    fn run_this_instance(&mut self);

    /// Ask the whole simulation to halt at the end of this step.
    fn stop_simulation(&mut self);

    /// The virtual instant the simulation started at.
    fn simulation_start_time(&self) -> SimTime;

    /// The step size, in milliseconds.
    fn time_increment(&self) -> u64;
}

// ── ProcessingContext ────────────────────────────────────────────────────────

/// Everything a behavior may touch while processing one firing.
pub trait ProcessingContext {
    fn model(&self) -> &str;
    fn instance_id(&self) -> &str;

    /// The model of the sender, when this firing delivers a message.
    fn source_model(&self) -> Option<&str>;
    /// The instance id of the sender, when this firing delivers a message.
    fn source_id(&self) -> Option<&str>;

    /// The current virtual time (wall clock when no simulation is active).
    fn current_time(&self) -> SimTime;

    /// Reply toward whatever sent the message that started this chain.
    fn send_to_source(&mut self, payload: &[u8]) -> SendingResult;

    /// Send a message to another twin, processed synchronously against the
    /// target's current state.
    ///
    /// Delivery is synchronous and holds the target's lock, so two twins
    /// that send to each other from concurrent firings can deadlock; keep
    /// mid-firing sends acyclic.
    fn send_to_twin(&mut self, model: &str, id: &str, payload: &[u8]) -> SendingResult;

    /// Send a batch of payloads to another twin, delivered to its message
    /// handler in a single invocation.  Same synchrony rules as
    /// [`send_to_twin`](Self::send_to_twin).
    fn send_to_twin_batch(&mut self, model: &str, id: &str, payloads: &[&[u8]]) -> SendingResult;

    /// Raise an alert addressed to a registered alert provider.
    fn send_alert(&mut self, provider: &str, alert: AlertMessage) -> SendingResult;

    /// Append to this model's functional log.
    fn log_message(&mut self, severity: LogSeverity, message: &str);

    /// Register a named timer on this twin.  At most [`MAX_TIMERS`] may be
    /// registered at once and names must be unique while registered.
    ///
    /// [`MAX_TIMERS`]: crate::timer::MAX_TIMERS
    fn start_timer(
        &mut self,
        name:            &str,
        interval_millis: u64,
        kind:            TimerKind,
        callback:        TimerCallback,
    ) -> TimerActionResult;

    /// Unregister a named timer; its pending event is discarded.
    fn stop_timer(&mut self, name: &str) -> TimerActionResult;

    /// Key/value store shared by all instances of this model.
    fn shared_model_data(&self) -> SharedData;

    /// Key/value store shared engine-wide.
    fn shared_global_data(&self) -> SharedData;

    /// The simulation control surface for this firing.
    fn controller(&mut self) -> &mut dyn SimulationController;
}

// ── InitContext ──────────────────────────────────────────────────────────────

/// Context for the once-per-instance `init` hook, which runs at creation
/// time before the twin is schedulable.
pub trait InitContext {
    fn model(&self) -> &str;
    fn instance_id(&self) -> &str;
    fn current_time(&self) -> SimTime;
    fn shared_model_data(&self) -> SharedData;
    fn shared_global_data(&self) -> SharedData;

    /// Register a named timer on the twin being created.  The timer is
    /// armed once the instance is installed, with its first firing one
    /// interval after that point.  Limits as
    /// [`ProcessingContext::start_timer`].
    fn start_timer(
        &mut self,
        name:            &str,
        interval_millis: u64,
        kind:            TimerKind,
        callback:        TimerCallback,
    ) -> TimerActionResult;

    /// Unregister a timer registered earlier in this hook.
    fn stop_timer(&mut self, name: &str) -> TimerActionResult;
}
