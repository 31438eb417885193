use thiserror::Error;
use types::errors::{ComputeError, LedgerError, SourceError};

/// Terminal cause of a request being abandoned
///
/// Every variant is scoped to one request; none is fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestFailure {
    #[error("Validation rejected: {actual} records available, minimum is {minimum}")]
    ValidationRejected { actual: u64, minimum: u64 },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Data source error: {0}")]
    Source(#[from] SourceError),

    #[error("Compute error: {0}")]
    Compute(#[from] ComputeError),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },
}

impl RequestFailure {
    /// Whether a bounded retry may be attempted.
    pub fn is_retryable(&self) -> bool {
        match self {
            RequestFailure::Ledger(e) => e.is_transient(),
            RequestFailure::Source(e) => e.is_transient(),
            RequestFailure::Timeout { .. } => true,
            RequestFailure::ValidationRejected { .. } | RequestFailure::Compute(_) => false,
        }
    }

    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestFailure::ValidationRejected { .. } => "ValidationRejected",
            RequestFailure::Ledger(LedgerError::NotFound { .. }) => "LedgerNotFound",
            RequestFailure::Ledger(LedgerError::TransientFailure { .. }) => "LedgerTransientFailure",
            RequestFailure::Ledger(LedgerError::Rejected { .. }) => "LedgerRejected",
            RequestFailure::Source(SourceError::SourceUnavailable { .. }) => "SourceUnavailable",
            RequestFailure::Source(SourceError::Incomplete { .. }) => "Incomplete",
            RequestFailure::Compute(ComputeError::DecodeError { .. }) => "DecodeError",
            RequestFailure::Compute(ComputeError::UnsupportedAggregation(_)) => "UnsupportedAggregation",
            RequestFailure::Compute(_) => "ComputeError",
            RequestFailure::Timeout { .. } => "Timeout",
        }
    }
}
