//! `tw-core` — foundational types for the `twinbench` simulation workbench.
//!
//! This crate is a dependency of every other `tw-*` crate.  It intentionally
//! has no `tw-*` dependencies and minimal external ones (only `rustc-hash`,
//! plus optional `serde`).
//!
//! # What lives here
//!
//! | Module     | Contents                                                   |
//! |------------|------------------------------------------------------------|
//! | [`time`]   | `SimTime`, `DueTime`, `Delay`                              |
//! | [`status`] | `SimulationStatus`, `StepResult`, behavior/timer outcomes  |
//! | [`hash`]   | seeded MurmurHash3 shard assignment                        |
//! | [`shared`] | `SharedData` key/value store, `CacheResult`                |
//! | [`log`]    | functional `LogRecord` / `AlertMessage` types              |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                        |
//! |---------|---------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public data types.      |

pub mod hash;
pub mod log;
pub mod shared;
pub mod status;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use hash::{SHARD_SEED, murmur3_32, shard_index};
pub use log::{AlertMessage, AlertProviderConfig, LogRecord, LogSeverity};
pub use shared::{CacheResult, SharedData};
pub use status::{
    CacheOperationStatus, ProcessingResult, SendingResult, SimulationStatus, StepResult,
    TimerActionResult, TimerKind,
};
pub use time::{Delay, DueTime, SimTime};
