//! `tw-engine` — the sharded step scheduler and twin execution engine for
//! `twinbench`.
//!
//! The execution engine owns all registries; each simulated model gets a
//! scheduler that shards its instances across workers by a seeded id hash
//! and steps them fan-out/fan-in under Rayon.
//!
//! # What lives here
//!
//! | Module        | Contents                                               |
//! |---------------|--------------------------------------------------------|
//! | [`engine`]    | `ExecutionEngine` — registries, clock, dispatch        |
//! | [`scheduler`] | per-model scheduler, `StepControl`                     |
//! | [`proxy`]     | `TwinProxy`, `ProxyState`                              |
//! | [`timers`]    | wall-clock timer seam (`WallClockTimers`)              |
//! | [`error`]     | `EngineError`, `EngineResult`                          |
//!
//! Workers, queued events, and the behavior-context implementation are
//! internal to the crate.

pub mod engine;
pub mod error;
pub mod proxy;
pub mod scheduler;
pub mod timers;

mod context;
mod event;
mod worker;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use engine::ExecutionEngine;
pub use error::{EngineError, EngineResult};
pub use proxy::{ProxyState, TwinProxy};
pub use scheduler::StepControl;
pub use timers::{InertTimers, WallClockTimers};
