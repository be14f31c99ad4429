//! Shard workers.
//!
//! A worker owns the event queue for one shard of one model's instances and
//! drains it once per step.  The queue is a `BTreeMap` keyed by
//! `(due, seq)` with a `live` side table mapping each [`EventKey`] to its
//! current sequence number: rescheduling inserts a fresh entry and bumps the
//! live sequence, and superseded entries are skipped when popped.  That makes
//! cancellation and reschedule O(log n) with no queue surgery.
//!
//! # The command inbox
//!
//! Anything outside the drain loop that wants to touch the queue — instance
//! registration, timers started inside a callback, a delay requested by a
//! message handler — posts a [`WorkerCommand`] instead.  The poster applies
//! the inbox immediately when the worker is idle (`try_lock` succeeds);
//! otherwise the drain loop services it before the first pop and again after
//! every firing, so commands posted by the very callback being fired land
//! before the next pop.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;
use tracing::error;
use tw_core::{Delay, DueTime, SimTime, SimulationStatus, StepResult, TimerKind};
use tw_model::{ModelRuntime, TimerCallback};

use crate::context::{EngineContext, InFlightGuard, InvocationRequest};
use crate::engine::{ExecutionEngine, StepClock};
use crate::error::{EngineError, EngineResult};
use crate::event::{EventKey, EventKind, QueuedEvent, WorkerCommand};

// ── WorkerCore ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct WorkerCore {
    queue: BTreeMap<(DueTime, u64), QueuedEvent>,
    /// Current sequence number per logical event; queue entries with a stale
    /// sequence are dead.
    live:  FxHashMap<EventKey, u64>,
    seq:   u64,
}

impl WorkerCore {
    fn insert(&mut self, event: QueuedEvent) {
        self.seq += 1;
        self.live.insert(event.key.clone(), self.seq);
        self.queue.insert((event.due, self.seq), event);
    }

    fn cancel(&mut self, key: &EventKey) {
        self.live.remove(key);
    }

    /// Pop the earliest live event due at or before `now`.
    fn pop_due(&mut self, now: SimTime) -> Option<QueuedEvent> {
        loop {
            let (&(due, _), _) = self.queue.iter().next()?;
            match due {
                DueTime::At(t) if t <= now => {}
                _ => return None,
            }
            let ((_, seq), event) = self.queue.pop_first()?;
            if self.live.get(&event.key) == Some(&seq) {
                self.live.remove(&event.key);
                return Some(event);
            }
            // Stale entry superseded by a reschedule; drop it and keep going.
        }
    }

    /// Earliest due time among live entries.
    fn head_due(&self) -> DueTime {
        for (&(due, seq), event) in self.queue.iter() {
            if self.live.get(&event.key) == Some(&seq) {
                return due;
            }
        }
        DueTime::Indefinite
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.live.clear();
    }
}

// ── FireOutcome ──────────────────────────────────────────────────────────────

struct FireOutcome {
    request: InvocationRequest,
    /// False when a stale timer event was skipped without firing.
    fired: bool,
    /// For timer events: whether the registration survived the firing.
    timer_alive: bool,
}

// ── SimulationWorker ─────────────────────────────────────────────────────────

pub(crate) struct SimulationWorker {
    model:   Arc<str>,
    runtime: Arc<dyn ModelRuntime>,
    core:    Mutex<WorkerCore>,
    inbox:   Mutex<Vec<WorkerCommand>>,
}

impl SimulationWorker {
    pub(crate) fn new(model: Arc<str>, runtime: Arc<dyn ModelRuntime>) -> Self {
        Self {
            model,
            runtime,
            core: Mutex::new(WorkerCore::default()),
            inbox: Mutex::new(Vec::new()),
        }
    }

    fn lock_core(&self) -> EngineResult<MutexGuard<'_, WorkerCore>> {
        self.core
            .lock()
            .map_err(|_| EngineError::LockPoisoned("worker core"))
    }

    /// Post a command; applied now if the worker is idle, otherwise at its
    /// next service point.
    pub(crate) fn post(&self, command: WorkerCommand) {
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
        if let Ok(mut core) = self.core.try_lock() {
            self.service_inbox(&mut core);
        }
    }

    fn service_inbox(&self, core: &mut WorkerCore) {
        loop {
            let commands =
                std::mem::take(&mut *self.inbox.lock().unwrap_or_else(PoisonError::into_inner));
            if commands.is_empty() {
                return;
            }
            for command in commands {
                match command {
                    WorkerCommand::Schedule { id, proxy, due } => {
                        core.insert(QueuedEvent {
                            key: EventKey::Twin { id },
                            due,
                            proxy,
                            kind: EventKind::Evaluate,
                        });
                    }
                    WorkerCommand::StartTimer {
                        id,
                        proxy,
                        name,
                        kind,
                        interval_millis,
                        callback,
                        due,
                    } => {
                        core.insert(QueuedEvent {
                            key: EventKey::Timer { id, name: name.clone() },
                            due,
                            proxy,
                            kind: EventKind::Timer { name, kind, interval_millis, callback },
                        });
                    }
                    WorkerCommand::StopTimer { id, name } => {
                        core.cancel(&EventKey::Timer { id, name });
                    }
                }
            }
        }
    }

    /// Discard every queued event and pending command.
    pub(crate) fn clear(&self) -> EngineResult<()> {
        let mut core = self.lock_core()?;
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        core.clear();
        Ok(())
    }

    /// Run each queued twin's simulation-init hook and normalize its first
    /// due time to the simulation start (honoring any delay the hook asked
    /// for).
    pub(crate) fn start_instances(
        &self,
        engine: &ExecutionEngine,
        clock:  &StepClock,
    ) -> EngineResult<()> {
        let mut core = self.lock_core()?;
        self.service_inbox(&mut core);

        let entries = std::mem::take(&mut core.queue);
        let mut events = Vec::with_capacity(entries.len());
        for ((_, seq), event) in entries {
            if core.live.get(&event.key) == Some(&seq) {
                events.push(event);
            }
        }
        core.live.clear();

        for event in events {
            if !event.proxy.is_active() {
                continue;
            }
            if let EventKind::Timer { interval_millis, .. } = &event.kind {
                // Surviving timers restart one interval past the new origin;
                // no init fire for them.
                let name = match &event.key {
                    EventKey::Timer { name, .. } => name.clone(),
                    EventKey::Twin { .. } => continue,
                };
                if event.proxy.envelope()?.meta.timers.contains_key(&name) {
                    core.insert(event.rescheduled(DueTime::At(clock.now + *interval_millis)));
                }
                continue;
            }
            let outcome = self.fire(engine, clock, &event, true)?;
            self.service_inbox(&mut core);

            if outcome.request.deleted || !event.proxy.is_active() {
                continue;
            }
            self.arm_registered_timers(&mut core, &event, clock.now)?;
            let due = match outcome.request.delay {
                Delay::None | Delay::Finite(0) => DueTime::At(clock.now),
                Delay::Finite(millis) => DueTime::At(clock.now + millis),
                Delay::Indefinite => DueTime::Indefinite,
            };
            self.note_next_scheduled(&event, due);
            core.insert(event.rescheduled(due));
        }
        Ok(())
    }

    /// Queue timer events for registrations with no live queue entry, such
    /// as timers registered in a creation hook before the simulation began.
    fn arm_registered_timers(
        &self,
        core:  &mut WorkerCore,
        event: &QueuedEvent,
        now:   SimTime,
    ) -> EngineResult<()> {
        let registrations: Vec<(String, TimerKind, u64, TimerCallback)> = event
            .proxy
            .envelope()?
            .meta
            .timers
            .iter()
            .map(|(name, reg)| (name.clone(), reg.kind, reg.interval_millis, reg.callback.clone()))
            .collect();
        let id = match &event.key {
            EventKey::Twin { id } | EventKey::Timer { id, .. } => Arc::clone(id),
        };
        for (name, kind, interval_millis, callback) in registrations {
            let key = EventKey::Timer { id: Arc::clone(&id), name: name.clone() };
            if core.live.contains_key(&key) {
                continue;
            }
            core.insert(QueuedEvent {
                key,
                due: DueTime::At(now + interval_millis),
                proxy: Arc::clone(&event.proxy),
                kind: EventKind::Timer { name, kind, interval_millis, callback },
            });
        }
        Ok(())
    }

    /// One simulation step: drain everything due at or before `clock.now`.
    pub(crate) fn run_step(
        &self,
        engine: &ExecutionEngine,
        clock:  &StepClock,
    ) -> EngineResult<StepResult> {
        let mut core = self.lock_core()?;
        self.service_inbox(&mut core);

        let now = clock.now;
        let mut processed = 0usize;
        let mut stop_seen = false;
        let mut delay_requested = false;
        let mut reinsert: Vec<QueuedEvent> = Vec::new();

        while let Some(event) = core.pop_due(now) {
            if !event.proxy.is_active() {
                continue;
            }
            let outcome = self.fire(engine, clock, &event, false)?;
            self.service_inbox(&mut core);
            if !outcome.fired {
                continue;
            }
            processed += 1;

            if outcome.request.stop {
                stop_seen = true;
            }
            if outcome.request.deleted || !event.proxy.is_active() {
                continue;
            }
            if let EventKind::Timer { .. } = &event.kind {
                if !outcome.timer_alive {
                    continue;
                }
            }
            if outcome.request.rerun {
                // Immediate re-fire, superseding the normal reschedule.
                core.insert(event.rescheduled(DueTime::At(now)));
                continue;
            }

            let due = match outcome.request.delay {
                Delay::Finite(0) => {
                    // Same-step re-fire: back into the live queue directly.
                    core.insert(event.rescheduled(DueTime::At(now)));
                    continue;
                }
                Delay::Finite(millis) => {
                    delay_requested = true;
                    DueTime::At(now + millis)
                }
                Delay::Indefinite => {
                    delay_requested = true;
                    DueTime::Indefinite
                }
                Delay::None => match self.default_due(&event, now, clock.iteration_millis) {
                    Some(due) => due,
                    None => continue, // one-shot timer, not reinserted
                },
            };
            reinsert.push(event.rescheduled(due));
        }

        for event in reinsert {
            self.note_next_scheduled(&event, event.due);
            core.insert(event);
        }

        let mut next = core.head_due();
        if next.is_indefinite() && !delay_requested {
            // Nothing concrete queued and nobody asked to sleep: assume the
            // default cadence for the merged next-time estimate.
            next = DueTime::At(now + clock.iteration_millis);
        }
        let status = if processed > 0 {
            if stop_seen {
                SimulationStatus::InstanceRequestedStop
            } else {
                SimulationStatus::Running
            }
        } else {
            SimulationStatus::NoRemainingWork
        };
        Ok(StepResult::new(status, next))
    }

    /// The cadence an event re-fires at when its callback requested nothing.
    fn default_due(&self, event: &QueuedEvent, now: SimTime, iteration_millis: u64) -> Option<DueTime> {
        match &event.kind {
            EventKind::Evaluate => Some(DueTime::At(now + iteration_millis)),
            EventKind::Timer { kind: TimerKind::OneTime, .. } => None,
            EventKind::Timer { kind: TimerKind::Recurring, interval_millis, .. } => {
                Some(DueTime::At(now + *interval_millis))
            }
        }
    }

    /// Invoke the behavior for one event under the proxy lock.
    fn fire(
        &self,
        engine: &ExecutionEngine,
        clock:  &StepClock,
        event:  &QueuedEvent,
        init:   bool,
    ) -> EngineResult<FireOutcome> {
        let mut envelope = event.proxy.envelope()?;
        let _guard = InFlightGuard::enter(
            Arc::clone(&envelope.meta.model),
            Arc::clone(&envelope.meta.id),
        );

        // A timer whose registration vanished between queueing and firing
        // (stopped from another thread) is dropped silently.
        if let EventKind::Timer { name, .. } = &event.kind {
            if !envelope.meta.timers.contains_key(name) {
                return Ok(FireOutcome {
                    request:     InvocationRequest::default(),
                    fired:       false,
                    timer_alive: false,
                });
            }
        }

        let request = {
            let (meta, state) = envelope.split_mut();
            let id = Arc::clone(&meta.id);
            let mut ctx =
                EngineContext::new(engine, Arc::clone(&event.proxy), meta, *clock, None);
            let invoked = if init {
                self.runtime.init_simulation(state, &mut ctx)
            } else {
                match &event.kind {
                    EventKind::Evaluate => self.runtime.process_model(state, &mut ctx),
                    EventKind::Timer { name, callback, .. } => callback.invoke(name, state, &mut ctx),
                }
            };
            if let Err(err) = invoked {
                // A failing behavior keeps its default cadence; any requests
                // it recorded before failing are discarded.
                error!(model = %self.model, id = %id, "twin firing failed: {err}");
                ctx.request = InvocationRequest::default();
            }
            ctx.request
        };

        let timer_alive = match &event.kind {
            EventKind::Evaluate => true,
            EventKind::Timer { name, kind, .. } => {
                if *kind == TimerKind::OneTime {
                    envelope.meta.timers.remove(name);
                    false
                } else {
                    envelope.meta.timers.contains_key(name)
                }
            }
        };

        Ok(FireOutcome { request, fired: true, timer_alive })
    }

    /// Record a twin's new due time in its metadata.
    fn note_next_scheduled(&self, event: &QueuedEvent, due: DueTime) {
        if let EventKey::Twin { .. } = event.key {
            if let Ok(mut envelope) = event.proxy.envelope() {
                envelope.meta.next_scheduled = due;
            }
        }
    }
}
