//! Twin metadata and the state envelope.
//!
//! `TwinMeta` is the framework-owned half of a twin: identity, the next
//! scheduled due time, and the timer table.  The user-owned half is an
//! opaque `Box<dyn Any + Send>` held alongside it in [`TwinEnvelope`];
//! [`TwinEnvelope::split_mut`] hands out disjoint mutable borrows of the two
//! halves so a behavior can mutate its state while the context manipulates
//! metadata.

use std::any::Any;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tw_core::{DueTime, TimerActionResult, TimerKind};

use crate::timer::{MAX_TIMERS, TimerCallback, TimerRegistration};

// ── TwinMeta ─────────────────────────────────────────────────────────────────

/// Framework bookkeeping for one twin instance.
#[derive(Debug)]
pub struct TwinMeta {
    pub model: Arc<str>,
    pub id:    Arc<str>,
    /// When this twin next fires.  Maintained by the worker that owns it.
    pub next_scheduled: DueTime,
    /// Registered timers by name.
    pub timers: FxHashMap<String, TimerRegistration>,
}

impl TwinMeta {
    pub fn new(model: Arc<str>, id: Arc<str>) -> Self {
        Self {
            model,
            id,
            next_scheduled: DueTime::Indefinite,
            timers: FxHashMap::default(),
        }
    }

    /// Register a timer, enforcing the parameter, name-uniqueness, and
    /// count-cap rules.
    pub fn register_timer(
        &mut self,
        name:            &str,
        kind:            TimerKind,
        interval_millis: u64,
        callback:        TimerCallback,
    ) -> TimerActionResult {
        // A zero interval would refire within the same instant forever.
        if name.is_empty() || interval_millis == 0 {
            return TimerActionResult::FailedInternalError;
        }
        if self.timers.contains_key(name) {
            return TimerActionResult::FailedTimerAlreadyExists;
        }
        if self.timers.len() >= MAX_TIMERS {
            return TimerActionResult::FailedTooManyTimers;
        }
        let slot = self.lowest_free_slot();
        self.timers.insert(
            name.to_owned(),
            TimerRegistration { kind, interval_millis, slot, callback },
        );
        TimerActionResult::Success
    }

    /// Remove a timer registration by name.
    pub fn unregister_timer(&mut self, name: &str) -> TimerActionResult {
        match self.timers.remove(name) {
            Some(_) => TimerActionResult::Success,
            None => TimerActionResult::FailedNoSuchTimer,
        }
    }

    /// Lowest slot index not held by any registered timer.  Only called when
    /// the table is below the cap, so a free slot always exists.
    fn lowest_free_slot(&self) -> u8 {
        (0..MAX_TIMERS as u8)
            .find(|slot| !self.timers.values().any(|t| t.slot == *slot))
            .unwrap_or(0)
    }
}

// ── TwinEnvelope ─────────────────────────────────────────────────────────────

/// Metadata plus erased user state, the unit a proxy's mutex protects.
pub struct TwinEnvelope {
    pub meta: TwinMeta,
    state:    Box<dyn Any + Send>,
}

impl TwinEnvelope {
    pub fn new(meta: TwinMeta, state: Box<dyn Any + Send>) -> Self {
        Self { meta, state }
    }

    /// Disjoint mutable borrows of metadata and state.
    pub fn split_mut(&mut self) -> (&mut TwinMeta, &mut dyn Any) {
        (&mut self.meta, &mut *self.state)
    }

    pub fn state(&self) -> &dyn Any {
        &*self.state
    }

    pub fn state_mut(&mut self) -> &mut dyn Any {
        &mut *self.state
    }

    /// Typed view of the state, when `T` is its concrete type.
    pub fn state_as<T: 'static>(&self) -> Option<&T> {
        self.state.downcast_ref()
    }
}
