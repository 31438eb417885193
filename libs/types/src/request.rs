//! The ledger's authoritative aggregation request record

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{CompanyId, RequestId, Requester};

/// Locator of a company's record batch on an external data service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceRef {
    /// Paginated data endpoint, e.g. `http://host/api/company/acme/data`
    pub url: String,
    pub company_id: CompanyId,
}

impl DataSourceRef {
    pub fn new(url: impl Into<String>, company_id: CompanyId) -> Self {
        Self {
            url: url.into(),
            company_id,
        }
    }

    /// Endpoint reporting the authoritative live record count.
    ///
    /// A trailing `/data` segment is replaced by `/count`, otherwise `/count`
    /// is appended.
    pub fn count_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        match base.strip_suffix("/data") {
            Some(prefix) => format!("{}/count", prefix),
            None => format!("{}/count", base),
        }
    }

    /// Resolve an empty locator against a base URL as `{base}/{company}/data`.
    pub fn resolve(&self, base_url: &str) -> DataSourceRef {
        if !self.url.trim().is_empty() {
            return self.clone();
        }
        DataSourceRef {
            url: format!("{}/{}/data", base_url.trim_end_matches('/'), self.company_id),
            company_id: self.company_id.clone(),
        }
    }
}

/// One opaque record as served by a company data source.
///
/// The wire form is a hex string, optionally `0x`-prefixed. Only the compute
/// engine looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedRecord(String);

impl EncryptedRecord {
    pub fn new(wire: impl Into<String>) -> Self {
        Self(wire.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Authoritative record of one aggregation request, as stored on the ledger.
///
/// Invariants:
/// - `result` is `Some` iff `is_processed`
/// - `is_processed` implies `is_validated`
/// - once processed the record never changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationRequest {
    pub request_id: RequestId,
    pub requester: Requester,
    /// Raw statistic name as supplied by the requester
    pub aggregation_type: String,
    /// Count asserted by the requester at open time
    pub claimed_data_count: u64,
    /// Live count recorded by validation
    pub confirmed_count: Option<u64>,
    pub data_source_ref: DataSourceRef,
    pub is_validated: bool,
    pub is_processed: bool,
    pub result: Option<Decimal>,
    /// Creation time, unix seconds
    pub timestamp: i64,
}

impl AggregationRequest {
    /// Check the record-level invariants.
    pub fn is_consistent(&self) -> bool {
        let result_matches = self.result.is_some() == self.is_processed;
        let ordered = !self.is_processed || self.is_validated;
        result_matches && ordered
    }
}
