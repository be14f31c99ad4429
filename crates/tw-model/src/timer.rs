//! Per-twin timers.
//!
//! A timer is a named, per-instance registration carrying an erased callback.
//! The callback is stored type-erased so the engine can hold registrations
//! for twins of any state type; [`TimerCallback::new`] captures the concrete
//! type once and the downcast happens inside the closure.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tw_core::{ProcessingResult, TimerKind};

use crate::context::ProcessingContext;
use crate::error::{ModelError, ModelResult};

/// Maximum concurrently registered timers per twin instance.
pub const MAX_TIMERS: usize = 5;

type ErasedTimerFn =
    dyn Fn(&str, &mut dyn Any, &mut dyn ProcessingContext) -> ModelResult<ProcessingResult>
        + Send
        + Sync;

// ── TimerCallback ────────────────────────────────────────────────────────────

/// A clonable, type-erased timer handler.
#[derive(Clone)]
pub struct TimerCallback {
    f: Arc<ErasedTimerFn>,
}

impl TimerCallback {
    /// Wrap a handler over the twin's concrete state type `T`.
    ///
    /// The handler receives the timer's name, the twin state, and the full
    /// processing context (so it may send, log, or adjust scheduling like any
    /// other firing).
    pub fn new<T, F>(f: F) -> Self
    where
        T: 'static,
        F: Fn(&str, &mut T, &mut dyn ProcessingContext) -> ModelResult<ProcessingResult>
            + Send
            + Sync
            + 'static,
    {
        TimerCallback {
            f: Arc::new(move |name, state, ctx| {
                let state = state.downcast_mut::<T>().ok_or(ModelError::StateTypeMismatch)?;
                f(name, state, ctx)
            }),
        }
    }

    pub fn invoke(
        &self,
        name:  &str,
        state: &mut dyn Any,
        ctx:   &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult> {
        (self.f)(name, state, ctx)
    }
}

impl fmt::Debug for TimerCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TimerCallback")
    }
}

// ── TimerRegistration ────────────────────────────────────────────────────────

/// One registered timer on one twin.
#[derive(Clone, Debug)]
pub struct TimerRegistration {
    pub kind:            TimerKind,
    pub interval_millis: u64,
    /// Small stable index in `0..MAX_TIMERS`, reused after removal.
    pub slot:            u8,
    pub callback:        TimerCallback,
}
