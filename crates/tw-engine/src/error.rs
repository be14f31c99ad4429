//! Engine error type.

use thiserror::Error;

use tw_model::ModelError;

/// Fatal engine-level failures.
///
/// Behavior-level failures (`ModelError`) are normally absorbed at the worker
/// boundary and logged; the `Model` variant appears only where a behavior
/// error must abort the calling operation, such as a failed `init` hook
/// during instance registration.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model `{0}` is not registered")]
    UnknownModel(String),

    #[error("instance `{id}` of model `{model}` is not registered")]
    UnknownInstance { model: String, id: String },

    #[error("model `{0}` is already registered")]
    ModelAlreadyRegistered(String),

    /// A thread panicked while holding this lock; the protected state may be
    /// torn, so the step that observes it aborts.
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no simulation is active")]
    NotInitialized,

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Shorthand result type for the engine crates.
pub type EngineResult<T> = Result<T, EngineError>;
