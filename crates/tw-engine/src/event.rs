//! Queued events and worker commands.
//!
//! A worker's queue holds [`QueuedEvent`]s keyed by `(due, seq)`; the
//! [`EventKey`] identifies the logical event (a twin's evaluation, or one
//! named timer on a twin) independent of when it is queued.  Rescheduling
//! never removes the old queue entry — it bumps the key's live sequence
//! number and the stale entry is skipped when popped.

use std::sync::Arc;

use tw_core::{DueTime, TimerKind};
use tw_model::TimerCallback;

use crate::proxy::TwinProxy;

// ── EventKey ─────────────────────────────────────────────────────────────────

/// Logical identity of an event within one worker.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) enum EventKey {
    /// The twin's step-evaluation event (at most one live per twin).
    Twin { id: Arc<str> },
    /// A named timer on a twin (at most one live per name).
    Timer { id: Arc<str>, name: String },
}

// ── QueuedEvent ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub(crate) enum EventKind {
    /// Run the model's simulation behavior.
    Evaluate,
    /// Fire a named timer callback.
    Timer {
        name:            String,
        kind:            TimerKind,
        interval_millis: u64,
        callback:        TimerCallback,
    },
}

pub(crate) struct QueuedEvent {
    pub key:   EventKey,
    pub due:   DueTime,
    pub proxy: Arc<TwinProxy>,
    pub kind:  EventKind,
}

impl QueuedEvent {
    /// The same logical event, due at a new time.
    pub fn rescheduled(&self, due: DueTime) -> QueuedEvent {
        QueuedEvent {
            key:   self.key.clone(),
            due,
            proxy: Arc::clone(&self.proxy),
            kind:  self.kind.clone(),
        }
    }
}

// ── WorkerCommand ────────────────────────────────────────────────────────────

/// Out-of-band queue mutations, posted to a worker's inbox and applied at the
/// next service point (a worker never mutates its own queue mid-pop).
pub(crate) enum WorkerCommand {
    /// (Re)schedule a twin's evaluation event, superseding any live one.
    Schedule {
        id:    Arc<str>,
        proxy: Arc<TwinProxy>,
        due:   DueTime,
    },
    /// Enqueue a newly registered timer.
    StartTimer {
        id:              Arc<str>,
        proxy:           Arc<TwinProxy>,
        name:            String,
        kind:            TimerKind,
        interval_millis: u64,
        callback:        TimerCallback,
        due:             DueTime,
    },
    /// Discard the live event of a stopped timer.
    StopTimer { id: Arc<str>, name: String },
}
