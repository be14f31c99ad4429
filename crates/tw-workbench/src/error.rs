//! Driver error type.

use thiserror::Error;

use tw_engine::EngineError;

#[derive(Debug, Error)]
pub enum WorkbenchError {
    /// A stepping or query call arrived before `initialize_simulation`.
    #[error("simulation has not been initialized")]
    NotInitialized,

    #[error("invalid simulation window: {0}")]
    InvalidWindow(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Shorthand result type for the driver.
pub type WorkbenchResult<T> = Result<T, WorkbenchError>;
