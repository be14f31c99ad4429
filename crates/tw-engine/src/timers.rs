//! Wall-clock timer seam.
//!
//! Timers started while no simulation is active belong to the real-time
//! path, which this offline engine does not drive.  The seam exists so a
//! host that does have a wall-clock driver can plug one in; the bundled
//! [`InertTimers`] accepts registrations and never fires them.

use tw_core::{TimerActionResult, TimerKind};

pub trait WallClockTimers: Send + Sync + 'static {
    fn start_timer(
        &self,
        model:           &str,
        id:              &str,
        name:            &str,
        kind:            TimerKind,
        interval_millis: u64,
    ) -> TimerActionResult;

    fn stop_timer(&self, model: &str, id: &str, name: &str) -> TimerActionResult;
}

/// Accepts every request and drives nothing.
pub struct InertTimers;

impl WallClockTimers for InertTimers {
    fn start_timer(
        &self,
        _model:           &str,
        _id:              &str,
        _name:            &str,
        _kind:            TimerKind,
        _interval_millis: u64,
    ) -> TimerActionResult {
        TimerActionResult::Success
    }

    fn stop_timer(&self, _model: &str, _id: &str, _name: &str) -> TimerActionResult {
        TimerActionResult::Success
    }
}
