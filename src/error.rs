//! Error types for the dynamic bit vector.

use thiserror::Error;

/// Error variants for dynamic bit vector operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An index was provided that is out of the structure's bounds.
    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(usize),

    /// The vector is at capacity, or a node/leaf pool cannot grow further.
    #[error("capacity exhausted")]
    CapacityExhausted,

    /// The capacity / node-width combination cannot be laid out.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(&'static str),

    /// An internal consistency check failed; indicates a bug.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// A specialized Result type for dynamic bit vector operations.
pub type Result<T> = std::result::Result<T, Error>;
