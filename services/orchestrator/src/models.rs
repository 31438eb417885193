use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::events::SequencedEvent;
use types::ids::{CompanyId, RequestId, Requester};
use types::request::{AggregationRequest, DataSourceRef, EncryptedRecord};

/// `GET {source}?page=N&pageSize=M`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<EncryptedRecord>,
    pub pagination: Option<Pagination>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
    pub total_records: u64,
    pub total_pages: u64,
    pub has_more: bool,
}

/// `GET {source}/count`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub success: bool,
    pub record_count: Option<u64>,
    pub error: Option<String>,
}

/// Ledger gateway view of one request, `GET {endpoint}/requests/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRequestView {
    pub requester: Requester,
    pub aggregation_type: String,
    pub timestamp: i64,
    pub is_processed: bool,
    pub data_count: u64,
    pub data_source_ref: String,
    pub company_id: CompanyId,
    pub is_validated: bool,
    pub result: Option<Decimal>,
    #[serde(default)]
    pub confirmed_count: Option<u64>,
}

impl LedgerRequestView {
    pub fn into_request(self, request_id: RequestId) -> AggregationRequest {
        AggregationRequest {
            request_id,
            requester: self.requester,
            aggregation_type: self.aggregation_type,
            claimed_data_count: self.data_count,
            confirmed_count: self.confirmed_count,
            data_source_ref: DataSourceRef::new(self.data_source_ref, self.company_id),
            is_validated: self.is_validated,
            is_processed: self.is_processed,
            // The ledger may report a zero result for unprocessed requests.
            result: if self.is_processed { self.result } else { None },
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateBody {
    pub confirmed_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedBody {
    pub result: Decimal,
}

/// `GET {endpoint}/events?after={cursor}`
#[derive(Debug, Clone, Deserialize)]
pub struct EventsPage {
    pub events: Vec<SequencedEvent>,
}
