//! Error types shared across the aggregation workflow
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Failures of calls against the request ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Request not found: {request_id}")]
    NotFound { request_id: u64 },

    #[error("Ledger call failed: {reason}")]
    TransientFailure { reason: String },

    #[error("Ledger rejected transition: {reason}")]
    Rejected { reason: String },
}

impl LedgerError {
    /// Whether the failure is worth a bounded retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::TransientFailure { .. })
    }
}

/// Failures fetching records from a company data source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Data source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("Incomplete batch: expected {expected} records, received {received}")]
    Incomplete { expected: u64, received: u64 },
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::SourceUnavailable { .. })
    }
}

/// Failures of the aggregation compute step
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComputeError {
    #[error("Record {index} could not be decoded: {reason}")]
    DecodeError { index: usize, reason: String },

    #[error("Unsupported aggregation type: {0}")]
    UnsupportedAggregation(String),

    #[error("Cannot compute {aggregation} over zero records")]
    EmptyInput { aggregation: String },

    #[error("Arithmetic overflow computing {aggregation}")]
    Overflow { aggregation: String },
}
