//! Unit tests for tw-model.

use std::any::Any;
use std::sync::Arc;

use tw_core::{
    AlertMessage, LogSeverity, ProcessingResult, SendingResult, SharedData, SimTime,
    TimerActionResult, TimerKind,
};

use crate::context::{InitContext, ProcessingContext, SimulationController};
use crate::error::{ModelError, ModelResult};
use crate::message::Message;
use crate::meta::{TwinEnvelope, TwinMeta};
use crate::processor::{MessageProcessor, SimulationProcessor};
use crate::runtime::{ModelRuntime, RealTimeModel, SimulationModel};
use crate::timer::{MAX_TIMERS, TimerCallback};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Inert context that accepts everything and routes nowhere.
#[derive(Default)]
struct NullContext {
    logged: Vec<String>,
}

impl SimulationController for NullContext {
    fn delay(&mut self, _millis: u64) {}
    fn delay_indefinitely(&mut self) {}
    fn emit_telemetry(&mut self, _model: &str, _payload: &[u8]) -> SendingResult {
        SendingResult::Handled
    }
    fn create_instance(
        &mut self,
        _model: &str,
        _id:    &str,
        _state: Box<dyn Any + Send>,
    ) -> SendingResult {
        SendingResult::Handled
    }
    fn delete_instance(&mut self, _model: &str, _id: &str) -> SendingResult {
        SendingResult::Handled
    }
    fn delete_this_instance(&mut self) {}
    fn run_this_instance(&mut self) {}
    fn stop_simulation(&mut self) {}
    fn simulation_start_time(&self) -> SimTime {
        SimTime::ZERO
    }
    fn time_increment(&self) -> u64 {
        1_000
    }
}

impl ProcessingContext for NullContext {
    fn model(&self) -> &str {
        "null"
    }
    fn instance_id(&self) -> &str {
        "null-0"
    }
    fn source_model(&self) -> Option<&str> {
        None
    }
    fn source_id(&self) -> Option<&str> {
        None
    }
    fn current_time(&self) -> SimTime {
        SimTime::ZERO
    }
    fn send_to_source(&mut self, _payload: &[u8]) -> SendingResult {
        SendingResult::Handled
    }
    fn send_to_twin(&mut self, _model: &str, _id: &str, _payload: &[u8]) -> SendingResult {
        SendingResult::Handled
    }
    fn send_to_twin_batch(&mut self, _model: &str, _id: &str, _payloads: &[&[u8]]) -> SendingResult {
        SendingResult::Handled
    }
    fn send_alert(&mut self, _provider: &str, _alert: AlertMessage) -> SendingResult {
        SendingResult::Handled
    }
    fn log_message(&mut self, _severity: LogSeverity, message: &str) {
        self.logged.push(message.to_owned());
    }
    fn start_timer(
        &mut self,
        _name:            &str,
        _interval_millis: u64,
        _kind:            TimerKind,
        _callback:        TimerCallback,
    ) -> TimerActionResult {
        TimerActionResult::Success
    }
    fn stop_timer(&mut self, _name: &str) -> TimerActionResult {
        TimerActionResult::Success
    }
    fn shared_model_data(&self) -> SharedData {
        SharedData::new()
    }
    fn shared_global_data(&self) -> SharedData {
        SharedData::new()
    }
    fn controller(&mut self) -> &mut dyn SimulationController {
        self
    }
}

fn meta(id: &str) -> TwinMeta {
    TwinMeta::new(Arc::from("pump"), Arc::from(id))
}

fn noop_callback() -> TimerCallback {
    TimerCallback::new::<u32, _>(|_, _, _| Ok(ProcessingResult::NoUpdate))
}

// ── Timer registration ────────────────────────────────────────────────────────

#[cfg(test)]
mod timer_tests {
    use super::*;

    #[test]
    fn registers_up_to_the_cap() {
        let mut m = meta("p-1");
        for i in 0..MAX_TIMERS {
            assert_eq!(
                m.register_timer(&format!("t{i}"), TimerKind::OneTime, 100, noop_callback()),
                TimerActionResult::Success
            );
        }
        assert_eq!(
            m.register_timer("one-too-many", TimerKind::OneTime, 100, noop_callback()),
            TimerActionResult::FailedTooManyTimers
        );
    }

    #[test]
    fn duplicate_name_rejected_while_registered() {
        let mut m = meta("p-1");
        m.register_timer("poll", TimerKind::Recurring, 50, noop_callback());
        assert_eq!(
            m.register_timer("poll", TimerKind::Recurring, 50, noop_callback()),
            TimerActionResult::FailedTimerAlreadyExists
        );
        assert_eq!(m.unregister_timer("poll"), TimerActionResult::Success);
        assert_eq!(
            m.register_timer("poll", TimerKind::Recurring, 50, noop_callback()),
            TimerActionResult::Success
        );
    }

    #[test]
    fn zero_interval_and_blank_names_are_rejected() {
        let mut m = meta("p-1");
        assert_eq!(
            m.register_timer("zero", TimerKind::Recurring, 0, noop_callback()),
            TimerActionResult::FailedInternalError
        );
        assert_eq!(
            m.register_timer("", TimerKind::OneTime, 100, noop_callback()),
            TimerActionResult::FailedInternalError
        );
        assert!(m.timers.is_empty());
    }

    #[test]
    fn stop_unknown_timer_fails() {
        let mut m = meta("p-1");
        assert_eq!(m.unregister_timer("ghost"), TimerActionResult::FailedNoSuchTimer);
    }

    #[test]
    fn slots_are_lowest_free_and_reused() {
        let mut m = meta("p-1");
        for name in ["a", "b", "c"] {
            m.register_timer(name, TimerKind::OneTime, 10, noop_callback());
        }
        assert_eq!(m.timers["a"].slot, 0);
        assert_eq!(m.timers["b"].slot, 1);
        assert_eq!(m.timers["c"].slot, 2);

        m.unregister_timer("b");
        m.register_timer("d", TimerKind::OneTime, 10, noop_callback());
        assert_eq!(m.timers["d"].slot, 1);
    }

    #[test]
    fn callback_downcasts_to_the_concrete_state() {
        let cb = TimerCallback::new::<u32, _>(|name, state, _ctx| {
            assert_eq!(name, "tick");
            *state += 1;
            Ok(ProcessingResult::UpdateTwin)
        });
        let mut state: u32 = 41;
        let mut ctx = NullContext::default();
        let result = cb.invoke("tick", &mut state, &mut ctx).unwrap();
        assert_eq!(result, ProcessingResult::UpdateTwin);
        assert_eq!(state, 42);
    }

    #[test]
    fn callback_rejects_the_wrong_state_type() {
        let cb = noop_callback();
        let mut wrong: String = String::new();
        let mut ctx = NullContext::default();
        assert!(matches!(
            cb.invoke("tick", &mut wrong, &mut ctx),
            Err(ModelError::StateTypeMismatch)
        ));
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod envelope_tests {
    use super::*;

    #[test]
    fn split_gives_disjoint_halves() {
        let mut env = TwinEnvelope::new(meta("p-2"), Box::new(7u32));
        let (m, state) = env.split_mut();
        *state.downcast_mut::<u32>().unwrap() = 8;
        assert_eq!(&*m.id, "p-2");
        assert_eq!(env.state_as::<u32>(), Some(&8));
    }

    #[test]
    fn typed_view_rejects_other_types() {
        let env = TwinEnvelope::new(meta("p-3"), Box::new(7u32));
        assert_eq!(env.state_as::<String>(), None);
    }
}

// ── Runtime adapters ──────────────────────────────────────────────────────────

#[cfg(test)]
mod runtime_tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        seen: usize,
    }

    struct CountMessages;

    impl MessageProcessor for CountMessages {
        type Twin = Counter;

        fn process_messages(
            &self,
            twin:      &mut Counter,
            messages:  &[Message],
            _ctx:      &mut dyn ProcessingContext,
        ) -> ModelResult<ProcessingResult> {
            twin.seen += messages.len();
            Ok(ProcessingResult::UpdateTwin)
        }
    }

    struct StepCounter;

    impl SimulationProcessor for StepCounter {
        type Twin = Counter;

        fn process_model(
            &self,
            twin: &mut Counter,
            _ctx: &mut dyn ProcessingContext,
        ) -> ModelResult<ProcessingResult> {
            twin.seen += 1;
            Ok(ProcessingResult::UpdateTwin)
        }
    }

    #[test]
    fn real_time_model_is_not_simulated() {
        let runtime = RealTimeModel::new(CountMessages);
        assert!(!runtime.is_simulated());

        let mut state = runtime.new_state();
        let mut ctx = NullContext::default();
        assert!(matches!(
            runtime.process_model(&mut *state, &mut ctx),
            Err(ModelError::NotSimulated)
        ));
    }

    #[test]
    fn messages_dispatch_through_the_erased_surface() {
        let runtime = RealTimeModel::new(CountMessages);
        let mut state = runtime.new_state();
        let mut ctx = NullContext::default();
        let messages = vec![Message::new(vec![1]), Message::new(vec![2])];
        runtime.process_messages(&mut *state, &messages, &mut ctx).unwrap();
        assert_eq!(state.downcast_ref::<Counter>().unwrap().seen, 2);
    }

    #[test]
    fn simulation_model_steps_the_twin() {
        let runtime = SimulationModel::new(CountMessages, StepCounter);
        assert!(runtime.is_simulated());

        let mut state = runtime.new_state();
        let mut ctx = NullContext::default();
        runtime.init_simulation(&mut *state, &mut ctx).unwrap();
        runtime.process_model(&mut *state, &mut ctx).unwrap();
        assert_eq!(state.downcast_ref::<Counter>().unwrap().seen, 1);
    }

    #[test]
    fn wrong_state_type_is_a_typed_error() {
        let runtime = SimulationModel::new(CountMessages, StepCounter);
        let mut wrong: Box<dyn Any + Send> = Box::new(String::new());
        let mut ctx = NullContext::default();
        assert!(matches!(
            runtime.process_model(&mut *wrong, &mut ctx),
            Err(ModelError::StateTypeMismatch)
        ));
    }

    #[test]
    fn init_context_is_object_safe() {
        struct Creation;
        impl InitContext for Creation {
            fn model(&self) -> &str {
                "counter"
            }
            fn instance_id(&self) -> &str {
                "counter-0"
            }
            fn current_time(&self) -> SimTime {
                SimTime(5)
            }
            fn shared_model_data(&self) -> SharedData {
                SharedData::new()
            }
            fn shared_global_data(&self) -> SharedData {
                SharedData::new()
            }
            fn start_timer(
                &mut self,
                _name:            &str,
                _interval_millis: u64,
                _kind:            TimerKind,
                _callback:        TimerCallback,
            ) -> TimerActionResult {
                TimerActionResult::Success
            }
            fn stop_timer(&mut self, _name: &str) -> TimerActionResult {
                TimerActionResult::Success
            }
        }

        let runtime = RealTimeModel::new(CountMessages);
        let mut state = runtime.new_state();
        runtime.init(&mut *state, &mut Creation).unwrap();
    }
}
