//! Twin proxies.
//!
//! A proxy is the engine's handle to one twin instance: an atomic lifecycle
//! flag plus a mutex over the state envelope.  The mutex is the concurrency
//! contract of the whole engine — whoever holds it may run behavior code
//! against the twin, and nothing else can observe the state mid-callback.
//!
//! The lifecycle flag is read without the mutex: workers use it to discard
//! queued events for deleted twins without paying for a lock.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};

use tw_model::TwinEnvelope;

use crate::error::{EngineError, EngineResult};

// ── ProxyState ───────────────────────────────────────────────────────────────

/// Lifecycle of a twin proxy.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ProxyState {
    /// Allocated but not yet registered.
    Unspecified = 0,
    /// Registered and schedulable.
    Active = 1,
    /// Deleted; queued events referencing it must be discarded.
    Removed = 2,
}

impl ProxyState {
    fn from_raw(raw: u8) -> ProxyState {
        match raw {
            1 => ProxyState::Active,
            2 => ProxyState::Removed,
            _ => ProxyState::Unspecified,
        }
    }
}

// ── TwinProxy ────────────────────────────────────────────────────────────────

/// One registered twin: lifecycle flag + mutex-owned state envelope.
pub struct TwinProxy {
    envelope:  Mutex<TwinEnvelope>,
    lifecycle: AtomicU8,
}

impl TwinProxy {
    /// Create an active proxy around `envelope`.
    pub fn new(envelope: TwinEnvelope) -> Self {
        Self {
            envelope:  Mutex::new(envelope),
            lifecycle: AtomicU8::new(ProxyState::Active as u8),
        }
    }

    pub fn state(&self) -> ProxyState {
        ProxyState::from_raw(self.lifecycle.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ProxyState) {
        self.lifecycle.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state() == ProxyState::Active
    }

    /// Lock the state envelope for processing.
    ///
    /// A poisoned mutex means a behavior panicked mid-callback and the twin's
    /// state may be torn, so this propagates instead of recovering.
    pub fn envelope(&self) -> EngineResult<MutexGuard<'_, TwinEnvelope>> {
        self.envelope
            .lock()
            .map_err(|_| EngineError::LockPoisoned("twin proxy envelope"))
    }
}
