//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The rendered stream name no longer fits the fixed name budget.
    #[error("Stream id overflow: counter {counter} renders as {rendered:?} (max {max} chars)")]
    IdOverflow {
        counter: u64,
        rendered: String,
        max: usize,
    },

    /// Demodulator name is not in the supported table
    #[error("Unknown demodulator: {0}")]
    UnknownDemod(String),

    /// Source index outside the hardware source table
    #[error("Source index {index} out of range (table has {len} sources)")]
    SourceOutOfRange { index: i64, len: usize },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
