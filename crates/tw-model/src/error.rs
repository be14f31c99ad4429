//! Model-layer error type.

use thiserror::Error;

/// Errors surfaced by behavior dispatch.
///
/// Behavior implementations return `Behavior` for their own failures; the
/// other variants are raised by the runtime adapters themselves.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The erased twin state did not downcast to the model's concrete type.
    /// Indicates an instance registered with the wrong state type.
    #[error("twin state has an unexpected concrete type")]
    StateTypeMismatch,

    /// A simulation entry point was invoked on a real-time-only model.
    #[error("model has no simulation behavior registered")]
    NotSimulated,

    /// A failure reported by user behavior code.
    #[error("behavior error: {0}")]
    Behavior(String),
}

/// Shorthand result type for model and behavior code.
pub type ModelResult<T> = Result<T, ModelError>;
