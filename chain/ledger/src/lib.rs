//! Reference Request Ledger
//!
//! In-process model of the authoritative aggregation request ledger. It owns
//! every durable flag of a request and emits a sequenced event per state
//! transition.
//!
//! # Modules
//! - `errors`: Ledger precondition failures
//! - `access`: Operator access control for state-transition calls
//! - `registry`: Request storage, transitions and the append-only event log
//!
//! # Version
//! v0.1.0

pub mod errors;
pub mod access;
pub mod registry;

pub use registry::RequestLedger;
