//! Ledger events
//!
//! The ledger emits one event per state transition of a request. Delivery to
//! subscribers is at-least-once; events of one request arrive in order, events
//! of distinct requests carry no ordering guarantee.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{CompanyId, RequestId, Requester};
use crate::request::DataSourceRef;

/// Event payloads emitted by the request ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum LedgerEvent {
    /// A request was opened and its claimed count must be checked
    #[serde(rename_all = "camelCase")]
    ValidationRequired { request_id: RequestId },

    /// Validation succeeded; the statistic may now be computed
    #[serde(rename_all = "camelCase")]
    AggregationRequested {
        request_id: RequestId,
        requester: Requester,
        aggregation_type: String,
        data_count: u64,
        data_source_ref: String,
        company_id: CompanyId,
    },

    /// The result was committed
    #[serde(rename_all = "camelCase")]
    AggregationProcessed { request_id: RequestId, result: Decimal },
}

impl LedgerEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            LedgerEvent::ValidationRequired { request_id } => *request_id,
            LedgerEvent::AggregationRequested { request_id, .. } => *request_id,
            LedgerEvent::AggregationProcessed { request_id, .. } => *request_id,
        }
    }

    /// Get the event type as a string label for logging.
    pub fn event_type_label(&self) -> &'static str {
        match self {
            LedgerEvent::ValidationRequired { .. } => "ValidationRequired",
            LedgerEvent::AggregationRequested { .. } => "AggregationRequested",
            LedgerEvent::AggregationProcessed { .. } => "AggregationProcessed",
        }
    }

    /// Data source locator carried by an `AggregationRequested` event.
    pub fn data_source(&self) -> Option<DataSourceRef> {
        match self {
            LedgerEvent::AggregationRequested {
                data_source_ref,
                company_id,
                ..
            } => Some(DataSourceRef::new(data_source_ref.clone(), company_id.clone())),
            _ => None,
        }
    }
}

/// Envelope the ledger wraps around every emitted event.
///
/// `sequence` is the position in the ledger's append-only log and doubles as
/// the cursor for log tailing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencedEvent {
    pub sequence: u64,
    pub event_id: Uuid,
    /// Unix seconds
    pub emitted_at: i64,
    #[serde(flatten)]
    pub event: LedgerEvent,
}

impl SequencedEvent {
    pub fn new(sequence: u64, emitted_at: i64, event: LedgerEvent) -> Self {
        Self {
            sequence,
            event_id: Uuid::now_v7(),
            emitted_at,
            event,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.event.request_id()
    }
}
