//! Types library for the private data aggregation workflow
//!
//! This library provides the vocabulary shared by the request ledger, the
//! aggregation compute engine and the request orchestrator.
//!
//! # Modules
//! - `ids`: Identifiers (RequestId, Requester, CompanyId)
//! - `aggregation`: Supported statistics and the minimum-record policy
//! - `request`: The ledger's authoritative request record
//! - `events`: Ledger events and their sequenced envelope
//! - `errors`: Error taxonomy

pub mod ids;
pub mod aggregation;
pub mod request;
pub mod events;
pub mod errors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::aggregation::*;
    pub use crate::request::*;
    pub use crate::events::*;
    pub use crate::errors::*;
}
