//! boiler — smallest example for the twinbench simulation workbench.
//!
//! Four boiler twins random-walk their temperature once per simulated
//! minute over one hour.  Each reading flows as telemetry to a real-time
//! monitor model; crossing the alert threshold raises an alert, and a
//! recurring timer logs an inspection every ten minutes.

use anyhow::Result;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use tw_core::{
    AlertMessage, AlertProviderConfig, LogSeverity, ProcessingResult, SimTime, TimerKind,
    murmur3_32,
};
use tw_model::{Message, MessageProcessor, ModelResult, ProcessingContext, SimulationProcessor, TimerCallback};
use tw_workbench::Workbench;

// ── Constants ─────────────────────────────────────────────────────────────────

const BOILER_COUNT:        usize = 4;
const START_MS:            u64   = 1_700_000_000_000; // fixed reference instant
const STEP_MS:             u64   = 60_000;            // 1 step = 1 minute
const RUN_STEPS:           u64   = 60;                // 1 hour
const INSPECTION_MS:       u64   = 600_000;           // every 10 minutes
const ALERT_CENTI_DEGREES: i64   = 9_000;             // 90.00 °C

// ── Twin states ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct Boiler {
    temp_centi:    i64,
    alerts_raised: u64,
    rng:           Option<SmallRng>,
}

/// Aggregated readings for one boiler, kept by the monitor model.
#[derive(Default)]
struct Readings {
    count: u64,
    min:   i64,
    max:   i64,
}

// ── Monitor model (real-time) ─────────────────────────────────────────────────

struct MonitorMessages;

impl MessageProcessor for MonitorMessages {
    type Twin = Readings;

    fn process_messages(
        &self,
        twin:     &mut Readings,
        messages: &[Message],
        _ctx:     &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult> {
        for message in messages {
            let Some(reading) = std::str::from_utf8(message.payload())
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
            else {
                continue;
            };
            if twin.count == 0 {
                twin.min = reading;
                twin.max = reading;
            } else {
                twin.min = twin.min.min(reading);
                twin.max = twin.max.max(reading);
            }
            twin.count += 1;
        }
        Ok(ProcessingResult::UpdateTwin)
    }
}

// ── Boiler model (simulated) ──────────────────────────────────────────────────

struct BoilerMessages;

impl MessageProcessor for BoilerMessages {
    type Twin = Boiler;

    fn process_messages(
        &self,
        _twin:     &mut Boiler,
        _messages: &[Message],
        _ctx:      &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult> {
        Ok(ProcessingResult::NoUpdate)
    }
}

struct BoilerSimulation;

impl SimulationProcessor for BoilerSimulation {
    type Twin = Boiler;

    fn on_init_simulation(
        &self,
        twin: &mut Boiler,
        ctx:  &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult> {
        let seed = u64::from(murmur3_32(ctx.instance_id().as_bytes(), 1));
        twin.rng = Some(SmallRng::seed_from_u64(seed));
        twin.temp_centi = 7_000; // 70.00 °C cold start

        ctx.start_timer(
            "inspection",
            INSPECTION_MS,
            TimerKind::Recurring,
            TimerCallback::new::<Boiler, _>(|_, twin, ctx| {
                ctx.log_message(
                    LogSeverity::Informational,
                    &format!("inspection: {:.2} °C", twin.temp_centi as f64 / 100.0),
                );
                Ok(ProcessingResult::NoUpdate)
            }),
        );
        Ok(ProcessingResult::UpdateTwin)
    }

    fn process_model(
        &self,
        twin: &mut Boiler,
        ctx:  &mut dyn ProcessingContext,
    ) -> ModelResult<ProcessingResult> {
        if let Some(rng) = twin.rng.as_mut() {
            twin.temp_centi += rng.gen_range(-80..=100);
        }

        ctx.controller()
            .emit_telemetry("monitor", twin.temp_centi.to_string().as_bytes());

        if twin.temp_centi > ALERT_CENTI_DEGREES {
            twin.alerts_raised += 1;
            ctx.send_alert(
                "ops",
                AlertMessage {
                    title:    format!("boiler {} over temperature", ctx.instance_id()),
                    severity: "high".into(),
                    message:  format!("{:.2} °C", twin.temp_centi as f64 / 100.0),
                },
            );
        }
        Ok(ProcessingResult::UpdateTwin)
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    println!("=== boiler — twinbench simulation workbench ===");
    println!("Boilers: {BOILER_COUNT}  |  Steps: {RUN_STEPS} × {}s", STEP_MS / 1_000);
    println!();

    // 1. Host the models.
    let mut workbench = Workbench::new();
    workbench.add_real_time_model("monitor", MonitorMessages)?;
    workbench.add_simulation_model("boiler", BoilerMessages, BoilerSimulation)?;
    workbench.add_alert_provider(
        "boiler",
        AlertProviderConfig {
            name:    "ops".into(),
            url:     "http://localhost/alerts".into(),
            api_key: None,
        },
    );

    // 2. Create the boiler instances.
    for i in 0..BOILER_COUNT {
        workbench.add_instance("boiler", &format!("b-{i}"), Boiler::default())?;
    }

    // 3. Run one simulated hour.
    let start = SimTime(START_MS);
    let end = start + RUN_STEPS * STEP_MS;
    let result = workbench.run_simulation(start, end, 1, STEP_MS)?;
    println!("Run finished: {}", result.status);
    println!();

    // 4. Per-boiler summary.
    println!("{:<8} {:>10} {:>10} {:>10} {:>9} {:>8}", "Boiler", "Final °C", "Min °C", "Max °C", "Readings", "Alerts");
    println!("{}", "-".repeat(60));
    for i in 0..BOILER_COUNT {
        let id = format!("b-{i}");
        let (temp, alerts) =
            workbench.with_instance("boiler", &id, |b: &Boiler| (b.temp_centi, b.alerts_raised))?;
        let (count, min, max) =
            workbench.with_instance("monitor", &id, |r: &Readings| (r.count, r.min, r.max))?;
        println!(
            "{:<8} {:>10.2} {:>10.2} {:>10.2} {:>9} {:>8}",
            id,
            temp as f64 / 100.0,
            min as f64 / 100.0,
            max as f64 / 100.0,
            count,
            alerts,
        );
    }
    println!();

    // 5. Functional log and alert stores.
    let inspections = workbench.logged_messages("boiler", SimTime::ZERO);
    let alerts = workbench.alert_messages("boiler", "ops");
    println!("Inspection log entries: {}", inspections.len());
    println!("Alerts recorded:        {}", alerts.len());

    Ok(())
}
