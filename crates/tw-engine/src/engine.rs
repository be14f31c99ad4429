//! The twin execution engine.
//!
//! Owns every registry in the system: models (type-erased runtimes),
//! instances (proxies), per-model schedulers, shared data stores, alert
//! providers, the functional log/alert record stores, and the buffered
//! source-message outbox.  All state is explicit engine state behind its own
//! lock; nothing lives in globals.
//!
//! # Locking
//!
//! Registry locks are held only for lookups and inserts, never across a
//! behavior callback.  Proxy envelope locks are the single exception: a
//! callback runs under its own twin's envelope lock by design.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashMap;
use tracing::{debug, warn};
use tw_core::{
    AlertMessage, AlertProviderConfig, Delay, DueTime, LogRecord, SendingResult, SharedData,
    SimTime, StepResult, TimerActionResult, TimerKind,
};
use tw_model::{InitContext, Message, ModelRuntime, TimerCallback, TwinEnvelope, TwinMeta};

use crate::context::{EngineContext, InFlightGuard, InvocationRequest};
use crate::error::{EngineError, EngineResult};
use crate::event::WorkerCommand;
use crate::proxy::{ProxyState, TwinProxy};
use crate::scheduler::{SimulationScheduler, StepControl};
use crate::timers::{InertTimers, WallClockTimers};

// ── Clock state ──────────────────────────────────────────────────────────────

/// Per-step snapshot handed to workers and contexts, so a firing sees one
/// consistent view of time without re-locking the clock.
#[derive(Copy, Clone, Debug)]
pub(crate) struct StepClock {
    pub now:              SimTime,
    pub start:            SimTime,
    pub iteration_millis: u64,
}

#[derive(Copy, Clone, Debug, Default)]
struct ClockState {
    active:           bool,
    start:            SimTime,
    iteration_millis: u64,
    now:              SimTime,
}

fn wall_clock() -> SimTime {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| SimTime(elapsed.as_millis() as u64))
        .unwrap_or(SimTime::ZERO)
}

// ── ExecutionEngine ──────────────────────────────────────────────────────────

pub struct ExecutionEngine {
    worker_count: usize,
    models:       RwLock<FxHashMap<String, Arc<dyn ModelRuntime>>>,
    schedulers:   RwLock<FxHashMap<String, Arc<SimulationScheduler>>>,
    instances:    RwLock<FxHashMap<String, FxHashMap<String, Arc<TwinProxy>>>>,
    model_data:   RwLock<FxHashMap<String, SharedData>>,
    global_data:  SharedData,
    providers:    RwLock<FxHashMap<String, Vec<AlertProviderConfig>>>,
    logged:       Mutex<FxHashMap<String, Vec<LogRecord>>>,
    alerts:       Mutex<FxHashMap<(String, String), Vec<AlertMessage>>>,
    outbox:       Mutex<FxHashMap<(String, String), Vec<Vec<u8>>>>,
    clock:        Mutex<ClockState>,
    stop_flag:    AtomicBool,
    wall_timers:  Box<dyn WallClockTimers>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(workers)
    }
}

impl ExecutionEngine {
    /// An engine sharding each simulated model across `worker_count` workers.
    pub fn new(worker_count: usize) -> Self {
        Self::with_wall_timers(worker_count, Box::new(InertTimers))
    }

    pub fn with_wall_timers(worker_count: usize, wall_timers: Box<dyn WallClockTimers>) -> Self {
        Self {
            worker_count: worker_count.max(1),
            models:       RwLock::new(FxHashMap::default()),
            schedulers:   RwLock::new(FxHashMap::default()),
            instances:    RwLock::new(FxHashMap::default()),
            model_data:   RwLock::new(FxHashMap::default()),
            global_data:  SharedData::new(),
            providers:    RwLock::new(FxHashMap::default()),
            logged:       Mutex::new(FxHashMap::default()),
            alerts:       Mutex::new(FxHashMap::default()),
            outbox:       Mutex::new(FxHashMap::default()),
            clock:        Mutex::new(ClockState::default()),
            stop_flag:    AtomicBool::new(false),
            wall_timers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    // ── Model registry ────────────────────────────────────────────────────

    /// Register a model under `name`.  Simulated models get a scheduler.
    pub fn add_model(&self, name: &str, runtime: Arc<dyn ModelRuntime>) -> EngineResult<()> {
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        if models.contains_key(name) {
            return Err(EngineError::ModelAlreadyRegistered(name.to_owned()));
        }
        if runtime.is_simulated() {
            let scheduler = Arc::new(SimulationScheduler::new(
                Arc::from(name),
                Arc::clone(&runtime),
                self.worker_count,
            ));
            self.schedulers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(name.to_owned(), scheduler);
        }
        debug!(model = name, simulated = runtime.is_simulated(), "model registered");
        models.insert(name.to_owned(), runtime);
        Ok(())
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn runtime(&self, name: &str) -> EngineResult<Arc<dyn ModelRuntime>> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownModel(name.to_owned()))
    }

    fn scheduler(&self, name: &str) -> Option<Arc<SimulationScheduler>> {
        self.schedulers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    // ── Instance registry ─────────────────────────────────────────────────

    /// Create (or replace) an instance of `model`.
    ///
    /// `state` of `None` means default state from the model's runtime.  The
    /// model's `init` hook runs before the instance becomes schedulable; if
    /// an instance already existed under this id, the old proxy is marked
    /// removed first so its queued events die instead of firing against the
    /// replacement.
    pub fn register_instance(
        &self,
        model: &str,
        id:    &str,
        state: Option<Box<dyn Any + Send>>,
    ) -> EngineResult<Arc<TwinProxy>> {
        let runtime = self.runtime(model)?;
        let state = match state {
            Some(state) => state,
            None => runtime.new_state(),
        };

        let mut envelope = TwinEnvelope::new(TwinMeta::new(Arc::from(model), Arc::from(id)), state);
        let now = self.current_time();
        {
            let (meta, state) = envelope.split_mut();
            let mut init_ctx = EngineInitContext { engine: self, meta, now };
            runtime.init(state, &mut init_ctx)?;
        }
        let init_timers: Vec<(String, TimerKind, u64, TimerCallback)> = envelope
            .meta
            .timers
            .iter()
            .map(|(name, reg)| (name.clone(), reg.kind, reg.interval_millis, reg.callback.clone()))
            .collect();

        let proxy = Arc::new(TwinProxy::new(envelope));
        let previous = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(model.to_owned())
            .or_default()
            .insert(id.to_owned(), Arc::clone(&proxy));
        if let Some(old) = previous {
            old.set_state(ProxyState::Removed);
            debug!(model, id, "existing instance replaced");
        }

        let active = self.simulation_active();
        if let Some(scheduler) = self.scheduler(model) {
            let due = if active { DueTime::At(now) } else { DueTime::At(SimTime::ZERO) };
            let worker = scheduler.worker_for(id);
            worker.post(WorkerCommand::Schedule {
                id:    Arc::from(id),
                proxy: Arc::clone(&proxy),
                due,
            });
            if active {
                // Arm timers the init hook registered.
                for (name, kind, interval_millis, callback) in init_timers {
                    worker.post(WorkerCommand::StartTimer {
                        id: Arc::from(id),
                        proxy: Arc::clone(&proxy),
                        name,
                        kind,
                        interval_millis,
                        callback,
                        due: DueTime::At(now + interval_millis),
                    });
                }
                return Ok(proxy);
            }
        }
        for (name, kind, interval_millis, _) in init_timers {
            self.wall_timers().start_timer(model, id, &name, kind, interval_millis);
        }
        Ok(proxy)
    }

    /// Delete an instance.  Its proxy is marked removed, so any queued
    /// events for it are discarded when popped.
    pub fn delete_instance(&self, model: &str, id: &str) -> EngineResult<()> {
        let removed = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(model)
            .and_then(|instances| instances.remove(id));
        match removed {
            Some(proxy) => {
                proxy.set_state(ProxyState::Removed);
                Ok(())
            }
            None => Err(EngineError::UnknownInstance {
                model: model.to_owned(),
                id:    id.to_owned(),
            }),
        }
    }

    pub fn proxy(&self, model: &str, id: &str) -> Option<Arc<TwinProxy>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .and_then(|instances| instances.get(id))
            .cloned()
    }

    pub fn instance_ids(&self, model: &str) -> Vec<String> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .map(|instances| instances.keys().cloned().collect())
            .unwrap_or_default()
    }

    // ── Message dispatch ──────────────────────────────────────────────────

    /// Deliver a message to `model`/`id` synchronously, creating the
    /// instance on demand.  `source` names the sender when the message came
    /// from another twin.
    pub fn send_message(
        &self,
        model:   &str,
        id:      &str,
        source:  Option<(Arc<str>, Arc<str>)>,
        payload: &[u8],
    ) -> EngineResult<SendingResult> {
        self.send_message_batch(model, id, source, &[payload])
    }

    /// Deliver a batch of payloads to `model`/`id` in a single handler
    /// invocation, creating the instance on demand.
    pub fn send_message_batch(
        &self,
        model:    &str,
        id:       &str,
        source:   Option<(Arc<str>, Arc<str>)>,
        payloads: &[&[u8]],
    ) -> EngineResult<SendingResult> {
        let runtime = self.runtime(model)?;
        let proxy = match self.proxy(model, id) {
            Some(proxy) => proxy,
            None => self.register_instance(model, id, None)?,
        };

        let clock = self.step_clock();
        let mut envelope = proxy.envelope()?;
        let _guard = InFlightGuard::enter(
            Arc::clone(&envelope.meta.model),
            Arc::clone(&envelope.meta.id),
        );

        let request = {
            let (meta, state) = envelope.split_mut();
            let mut ctx = EngineContext::new(self, Arc::clone(&proxy), meta, clock, source);
            let messages: Vec<Message> = payloads.iter().map(|&payload| Message::from(payload)).collect();
            match runtime.process_messages(state, &messages, &mut ctx) {
                Ok(_) => ctx.request,
                Err(err) => {
                    warn!(model, id, "message processing failed: {err}");
                    InvocationRequest::default()
                }
            }
        };
        drop(envelope);

        self.apply_message_request(model, id, &proxy, request);
        Ok(SendingResult::Handled)
    }

    /// Apply scheduling requests a message handler recorded: reposition the
    /// twin's evaluation event in its shard worker.
    fn apply_message_request(
        &self,
        model:   &str,
        id:      &str,
        proxy:   &Arc<TwinProxy>,
        request: InvocationRequest,
    ) {
        if request.deleted || !proxy.is_active() {
            return;
        }
        let due = if request.rerun {
            Some(DueTime::At(self.step_clock().now))
        } else {
            match request.delay {
                Delay::None => None,
                Delay::Finite(millis) => Some(DueTime::At(self.step_clock().now + millis)),
                Delay::Indefinite => Some(DueTime::Indefinite),
            }
        };
        let Some(due) = due else { return };
        if let Some(scheduler) = self.scheduler(model) {
            if let Ok(mut envelope) = proxy.envelope() {
                envelope.meta.next_scheduled = due;
            }
            scheduler.worker_for(id).post(WorkerCommand::Schedule {
                id:    Arc::from(id),
                proxy: Arc::clone(proxy),
                due,
            });
        }
    }

    /// Telemetry flows to the instance with the sender's id in `model`; when
    /// that model is not registered here, the payload is buffered for
    /// collection instead.
    pub(crate) fn send_telemetry(
        &self,
        model:   &str,
        sender:  (Arc<str>, Arc<str>),
        payload: &[u8],
    ) -> EngineResult<SendingResult> {
        if !self.has_model(model) {
            self.buffer_source_message(model, &sender.1, payload.to_vec());
            return Ok(SendingResult::Handled);
        }
        let id = Arc::clone(&sender.1);
        self.send_message(model, &id, Some(sender), payload)
    }

    // ── Outbox, logs, alerts ──────────────────────────────────────────────

    pub(crate) fn buffer_source_message(&self, model: &str, id: &str, payload: Vec<u8>) {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((model.to_owned(), id.to_owned()))
            .or_default()
            .push(payload);
    }

    /// Drain buffered source messages for one instance.
    pub fn source_messages(&self, model: &str, id: &str) -> Vec<Vec<u8>> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(model.to_owned(), id.to_owned()))
            .unwrap_or_default()
    }

    pub fn add_alert_provider(&self, model: &str, config: AlertProviderConfig) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(model.to_owned())
            .or_default()
            .push(config);
    }

    pub(crate) fn record_alert(
        &self,
        model:    &str,
        provider: &str,
        alert:    AlertMessage,
    ) -> SendingResult {
        let registered = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .is_some_and(|configs| configs.iter().any(|c| c.name == provider));
        if !registered {
            warn!(model, provider, "alert to unregistered provider dropped");
            return SendingResult::NotHandled;
        }
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((model.to_owned(), provider.to_owned()))
            .or_default()
            .push(alert);
        SendingResult::Handled
    }

    pub fn alert_messages(&self, model: &str, provider: &str) -> Vec<AlertMessage> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(model.to_owned(), provider.to_owned()))
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn record_log(&self, model: &str, record: LogRecord) {
        self.logged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(model.to_owned())
            .or_default()
            .push(record);
    }

    /// Messages logged by `model`'s instances at or after `since`.
    pub fn logged_messages(&self, model: &str, since: SimTime) -> Vec<LogRecord> {
        self.logged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.time >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Shared data ───────────────────────────────────────────────────────

    pub fn shared_model_data(&self, model: &str) -> SharedData {
        self.model_data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(model.to_owned())
            .or_default()
            .clone()
    }

    pub fn shared_global_data(&self) -> SharedData {
        self.global_data.clone()
    }

    // ── Clock ─────────────────────────────────────────────────────────────

    /// Activate simulated time.  Rejected while a run is already active.
    pub fn begin_simulation(
        &self,
        start:            SimTime,
        end:              SimTime,
        iteration_millis: u64,
    ) -> EngineResult<()> {
        if iteration_millis == 0 {
            return Err(EngineError::Config("iteration size must be positive".into()));
        }
        if end <= start {
            return Err(EngineError::Config("end time must be after start time".into()));
        }
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        if clock.active {
            return Err(EngineError::Config("a simulation is already active".into()));
        }
        *clock = ClockState { active: true, start, iteration_millis, now: start };
        self.stop_flag.store(false, Ordering::Release);
        Ok(())
    }

    pub fn advance_clock(&self, now: SimTime) {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner).now = now;
    }

    pub fn end_simulation(&self) {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner).active = false;
    }

    pub(crate) fn simulation_active(&self) -> bool {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner).active
    }

    /// Virtual time while a simulation is active, wall clock otherwise.
    pub fn current_time(&self) -> SimTime {
        let clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        if clock.active { clock.now } else { wall_clock() }
    }

    pub(crate) fn step_clock(&self) -> StepClock {
        let clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        if clock.active {
            StepClock {
                now:              clock.now,
                start:            clock.start,
                iteration_millis: clock.iteration_millis,
            }
        } else {
            let now = wall_clock();
            StepClock { now, start: now, iteration_millis: 0 }
        }
    }

    // ── Stepping ──────────────────────────────────────────────────────────

    /// Run one step pass over every simulated model's scheduler.
    pub fn run_step(&self, control: StepControl) -> EngineResult<StepResult> {
        if !self.simulation_active() {
            return Err(EngineError::NotInitialized);
        }
        let clock = self.step_clock();
        let schedulers: Vec<Arc<SimulationScheduler>> = self
            .schedulers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut merged = StepResult::EMPTY;
        for scheduler in schedulers {
            merged = merged.merge(scheduler.step(self, &clock, control)?);
        }
        Ok(merged)
    }

    pub(crate) fn flag_stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    /// Consume a pending stop request, if any twin raised one.
    pub fn take_stop_request(&self) -> bool {
        self.stop_flag.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn wall_timers(&self) -> &dyn WallClockTimers {
        &*self.wall_timers
    }

    /// Post a queue command to the shard worker owning `model`/`id`.
    pub(crate) fn post_command(&self, model: &str, id: &str, command: WorkerCommand) {
        if let Some(scheduler) = self.scheduler(model) {
            scheduler.worker_for(id).post(command);
        }
    }
}

// ── EngineInitContext ────────────────────────────────────────────────────────

/// Context for the once-per-instance `init` hook.  Timer registrations land
/// in the twin's metadata; the caller arms them once the instance is
/// installed.
struct EngineInitContext<'a> {
    engine: &'a ExecutionEngine,
    meta:   &'a mut TwinMeta,
    now:    SimTime,
}

impl InitContext for EngineInitContext<'_> {
    fn model(&self) -> &str {
        &self.meta.model
    }

    fn instance_id(&self) -> &str {
        &self.meta.id
    }

    fn current_time(&self) -> SimTime {
        self.now
    }

    fn shared_model_data(&self) -> SharedData {
        self.engine.shared_model_data(&self.meta.model)
    }

    fn shared_global_data(&self) -> SharedData {
        self.engine.shared_global_data()
    }

    fn start_timer(
        &mut self,
        name:            &str,
        interval_millis: u64,
        kind:            TimerKind,
        callback:        TimerCallback,
    ) -> TimerActionResult {
        self.meta.register_timer(name, kind, interval_millis, callback)
    }

    fn stop_timer(&mut self, name: &str) -> TimerActionResult {
        self.meta.unregister_timer(name)
    }
}
