//! Error taxonomy shared by every stage of a run.

use thiserror::Error;

use crate::aggregate::PartialResult;

/// Errors produced while configuring, searching, transporting or
/// aggregating.
#[derive(Debug, Error)]
pub enum CoaError {
    /// A parameter is out of range (`k > N`, empty population, bad bounds).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A benchmark identifier is not in the registry.
    #[error("unknown benchmark function: {0}")]
    UnknownFunction(String),

    /// A result's convergence trace has the wrong length.
    #[error("shape mismatch: expected convergence of length {expected}, got {actual}")]
    ShapeMismatch {
        /// Length every trace must have (T).
        expected: usize,
        /// Length actually received.
        actual: usize,
    },

    /// The deadline elapsed before all expected results arrived.
    #[error("incomplete aggregation: gathered {} of {expected} results", gathered.len())]
    Incomplete {
        /// Number of results the aggregation was waiting for.
        expected: usize,
        /// Results that did arrive, in arrival order.
        gathered: Vec<PartialResult>,
    },

    /// The transport refused or could not deliver a message.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// An inbound payload could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),

    /// A gather was cancelled through its cancellation token.
    #[error("run cancelled")]
    Cancelled,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CoaError>;

impl CoaError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CoaError::InvalidArgument(msg.into())
    }
}
