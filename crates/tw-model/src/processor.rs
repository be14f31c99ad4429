//! The behavior traits — the main extension points for user code.

use tw_core::ProcessingResult;

use crate::context::{InitContext, ProcessingContext};
use crate::error::ModelResult;
use crate::message::Message;

// ── MessageProcessor ─────────────────────────────────────────────────────────

/// Message-handling behavior for one model.
///
/// Every model has one of these; it defines the twin state type and how a
/// twin reacts to incoming messages.  Implementations must be `Send + Sync`
/// because shards process twins in parallel; per-twin state lives in
/// `Self::Twin`, never in the processor itself.
pub trait MessageProcessor: Send + Sync + 'static {
    /// The concrete per-instance state type.
    type Twin: Send + 'static;

    /// Called once when an instance is created, before it can fire.
    ///
    /// Default: no-op.
    fn init(&self, _twin: &mut Self::Twin, _ctx: &mut dyn InitContext) -> ModelResult<()> {
        Ok(())
    }

    /// Handle messages delivered to `twin`, synchronously against its
    /// current state.
    fn process_messages(
        &self,
        twin:     &mut Self::Twin,
        messages: &[Message],
        ctx:      &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult>;
}

// ── SimulationProcessor ──────────────────────────────────────────────────────

/// Time-stepped behavior for a simulated model.
///
/// Registered alongside a [`MessageProcessor`] for the same twin type; the
/// scheduler drives [`process_model`][Self::process_model] once per firing.
pub trait SimulationProcessor: Send + Sync + 'static {
    type Twin: Send + 'static;

    /// Called once per instance when the simulation starts, before the first
    /// step.  Free to start timers or request a delay through the context.
    ///
    /// Default: no-op.
    fn on_init_simulation(
        &self,
        _twin: &mut Self::Twin,
        _ctx:  &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult> {
        Ok(ProcessingResult::NoUpdate)
    }

    /// One simulation firing for `twin` at the context's current time.
    fn process_model(
        &self,
        twin: &mut Self::Twin,
        ctx:  &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult>;
}
