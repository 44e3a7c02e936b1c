use thiserror::Error;

/// Top-level error type for Kestrel.
#[derive(Debug, Error)]
pub enum KestrelError {
    /// An estimator operation was attempted before `load`/`initialize`.
    #[error("estimator is not initialized")]
    UninitializedEstimator,

    /// Wrong number of observation series.
    #[error("expected {expected} inputs, got {got}")]
    InputArity { expected: usize, got: usize },

    /// Input series that cannot be aligned tick by tick.
    #[error("input shape error: {0}")]
    InputShape(String),

    /// A covariance update that could not be recovered in place.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Configuration(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
