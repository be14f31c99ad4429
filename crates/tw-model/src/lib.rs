//! `tw-model` — behavior traits and the type-erased model runtime for
//! `twinbench`.
//!
//! User code implements [`MessageProcessor`] (and [`SimulationProcessor`] for
//! simulated models) against a concrete twin state type; the engine sees only
//! the erased [`ModelRuntime`] surface.
//!
//! # What lives here
//!
//! | Module        | Contents                                                |
//! |---------------|---------------------------------------------------------|
//! | [`processor`] | `MessageProcessor`, `SimulationProcessor`               |
//! | [`context`]   | `ProcessingContext`, `SimulationController`, `InitContext` |
//! | [`runtime`]   | `ModelRuntime` + `RealTimeModel` / `SimulationModel`    |
//! | [`meta`]      | `TwinMeta`, `TwinEnvelope`                              |
//! | [`timer`]     | `TimerCallback`, `TimerRegistration`, `MAX_TIMERS`      |
//! | [`message`]   | opaque `Message` payloads                               |
//! | [`error`]     | `ModelError`, `ModelResult`                             |

pub mod context;
pub mod error;
pub mod message;
pub mod meta;
pub mod processor;
pub mod runtime;
pub mod timer;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use context::{InitContext, ProcessingContext, SimulationController};
pub use error::{ModelError, ModelResult};
pub use message::Message;
pub use meta::{TwinEnvelope, TwinMeta};
pub use processor::{MessageProcessor, SimulationProcessor};
pub use runtime::{ModelRuntime, RealTimeModel, SimulationModel};
pub use timer::{MAX_TIMERS, TimerCallback, TimerRegistration};
