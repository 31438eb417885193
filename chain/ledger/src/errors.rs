//! Ledger-specific error types
//!
//! Every variant is a precondition violation on a state-transition call.
//! Callers outside this crate see them through `types::errors::LedgerError`.

use thiserror::Error;
use types::errors::LedgerError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Request not found: {request_id}")]
    NotFound { request_id: u64 },

    #[error("Unauthorized: {caller} is not an operator")]
    Unauthorized { caller: String },

    #[error("Claimed data count must be positive")]
    InvalidCount,

    #[error("Request {request_id} already validated")]
    AlreadyValidated { request_id: u64 },

    #[error("Request {request_id} not validated")]
    NotValidated { request_id: u64 },

    #[error("Request {request_id} already processed")]
    AlreadyProcessed { request_id: u64 },

    #[error("Confirmed count {count} below minimum of {minimum}")]
    BelowMinimum { count: u64, minimum: u64 },
}

impl From<RegistryError> for LedgerError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { request_id } => LedgerError::NotFound { request_id },
            other => LedgerError::Rejected {
                reason: other.to_string(),
            },
        }
    }
}
