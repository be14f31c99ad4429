//! The type-erased model runtime.
//!
//! The engine's model registry maps a model name to an `Arc<dyn
//! ModelRuntime>`; the adapters below erase the concrete twin type at
//! registration so the engine can dispatch any model through one vtable.
//! State flows through as `dyn Any` and is downcast back to the concrete
//! type at the edge of each call.

use std::any::Any;

use tw_core::ProcessingResult;

use crate::context::{InitContext, ProcessingContext};
use crate::error::{ModelError, ModelResult};
use crate::message::Message;
use crate::processor::{MessageProcessor, SimulationProcessor};

// ── ModelRuntime ─────────────────────────────────────────────────────────────

/// Erased dispatch surface for one registered model.
pub trait ModelRuntime: Send + Sync + 'static {
    /// Whether this model participates in simulation stepping.
    fn is_simulated(&self) -> bool;

    /// Fresh default state for create-on-demand.
    fn new_state(&self) -> Box<dyn Any + Send>;

    /// The once-per-instance creation hook.
    fn init(&self, state: &mut dyn Any, ctx: &mut dyn InitContext) -> ModelResult<()>;

    fn process_messages(
        &self,
        state:    &mut dyn Any,
        messages: &[Message],
        ctx:      &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult>;

    fn process_model(
        &self,
        state: &mut dyn Any,
        ctx:   &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult>;

    fn init_simulation(
        &self,
        state: &mut dyn Any,
        ctx:   &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult>;
}

fn downcast<T: 'static>(state: &mut dyn Any) -> ModelResult<&mut T> {
    state.downcast_mut::<T>().ok_or(ModelError::StateTypeMismatch)
}

// ── RealTimeModel ────────────────────────────────────────────────────────────

/// Adapter for a message-only model: never stepped by the scheduler.
pub struct RealTimeModel<M: MessageProcessor> {
    processor: M,
}

impl<M: MessageProcessor> RealTimeModel<M> {
    pub fn new(processor: M) -> Self {
        Self { processor }
    }
}

impl<M> ModelRuntime for RealTimeModel<M>
where
    M: MessageProcessor,
    M::Twin: Default,
{
    fn is_simulated(&self) -> bool {
        false
    }

    fn new_state(&self) -> Box<dyn Any + Send> {
        Box::new(M::Twin::default())
    }

    fn init(&self, state: &mut dyn Any, ctx: &mut dyn InitContext) -> ModelResult<()> {
        self.processor.init(downcast::<M::Twin>(state)?, ctx)
    }

    fn process_messages(
        &self,
        state:    &mut dyn Any,
        messages: &[Message],
        ctx:      &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult> {
        self.processor.process_messages(downcast::<M::Twin>(state)?, messages, ctx)
    }

    fn process_model(
        &self,
        _state: &mut dyn Any,
        _ctx:   &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult> {
        Err(ModelError::NotSimulated)
    }

    fn init_simulation(
        &self,
        _state: &mut dyn Any,
        _ctx:   &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult> {
        Ok(ProcessingResult::NoUpdate)
    }
}

// ── SimulationModel ──────────────────────────────────────────────────────────

/// Adapter pairing message handling with time-stepped simulation behavior
/// over the same twin type.
pub struct SimulationModel<M, S> {
    processor:  M,
    simulation: S,
}

impl<M, S> SimulationModel<M, S> {
    pub fn new(processor: M, simulation: S) -> Self {
        Self { processor, simulation }
    }
}

impl<M, S> ModelRuntime for SimulationModel<M, S>
where
    M: MessageProcessor,
    M::Twin: Default,
    S: SimulationProcessor<Twin = M::Twin>,
{
    fn is_simulated(&self) -> bool {
        true
    }

    fn new_state(&self) -> Box<dyn Any + Send> {
        Box::new(M::Twin::default())
    }

    fn init(&self, state: &mut dyn Any, ctx: &mut dyn InitContext) -> ModelResult<()> {
        self.processor.init(downcast::<M::Twin>(state)?, ctx)
    }

    fn process_messages(
        &self,
        state:    &mut dyn Any,
        messages: &[Message],
        ctx:      &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult> {
        self.processor.process_messages(downcast::<M::Twin>(state)?, messages, ctx)
    }

    fn process_model(
        &self,
        state: &mut dyn Any,
        ctx:   &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult> {
        self.simulation.process_model(downcast::<M::Twin>(state)?, ctx)
    }

    fn init_simulation(
        &self,
        state: &mut dyn Any,
        ctx:   &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult> {
        self.simulation.on_init_simulation(downcast::<M::Twin>(state)?, ctx)
    }
}
