//! `tw-workbench` — the offline simulation driver for `twinbench`.
//!
//! A [`Workbench`] hosts models and instances, drives the virtual clock in
//! fixed iterations, and exposes the query surface (instances, logged
//! messages, alerts, buffered source messages) a test harness needs.
//!
//! # Typical flow
//!
//! ```rust,ignore
//! let mut workbench = Workbench::new();
//! workbench.add_simulation_model("pump", PumpMessages, PumpSimulation)?;
//! workbench.add_instance("pump", "pump-001", PumpState::default())?;
//! let result = workbench.run_simulation(SimTime(0), SimTime(60_000), 1, 1_000)?;
//! assert_eq!(result.status, SimulationStatus::EndTimeReached);
//! ```

pub mod error;
pub mod workbench;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{WorkbenchError, WorkbenchResult};
pub use tw_core::{DueTime, SimTime, SimulationStatus, StepResult};
pub use workbench::Workbench;
