//! Ledger Client
//!
//! Typed access to the request ledger: one event subscription, one query and
//! two state-transition calls. Mutations are external transactions and may
//! fail; this layer never retries them, the caller owns that policy.

mod http;
mod local;

pub use http::HttpLedgerClient;
pub use local::{LedgerOp, LocalLedgerClient};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use types::errors::LedgerError;
use types::events::SequencedEvent;
use types::ids::RequestId;
use types::request::AggregationRequest;

/// Subscriber side of the ledger event stream.
///
/// At-least-once, in order per request id. Closes when the ledger connection
/// is torn down.
pub type EventStream = mpsc::Receiver<SequencedEvent>;

/// Capacity of the channel between the ledger feed and the orchestrator
pub const EVENT_BUFFER: usize = 1_024;

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn subscribe(&self) -> Result<EventStream, LedgerError>;

    async fn get_request(&self, request_id: RequestId) -> Result<AggregationRequest, LedgerError>;

    async fn validate(&self, request_id: RequestId, confirmed_count: u64) -> Result<(), LedgerError>;

    async fn mark_processed(&self, request_id: RequestId, result: Decimal) -> Result<(), LedgerError>;
}
