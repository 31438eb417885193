//! Request registry: open → validate → process
//!
//! Manages the lifecycle of aggregation requests:
//! `open (ValidationRequired) → validate (AggregationRequested) → mark_processed (AggregationProcessed)`
//!
//! Every successful transition appends exactly one event to the log. Failed
//! calls leave both the request and the log untouched.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use types::aggregation::MIN_RECORDS;
use types::events::{LedgerEvent, SequencedEvent};
use types::ids::{RequestId, Requester};
use types::request::{AggregationRequest, DataSourceRef};

use crate::access::OperatorSet;
use crate::errors::RegistryError;

/// Authoritative store of aggregation requests and their event log.
#[derive(Debug)]
pub struct RequestLedger {
    requests: BTreeMap<RequestId, AggregationRequest>,
    next_id: RequestId,
    log: Vec<SequencedEvent>,
    operators: OperatorSet,
}

impl RequestLedger {
    /// Create an empty ledger administered by `admin`.
    pub fn new(admin: impl Into<String>) -> Self {
        Self {
            requests: BTreeMap::new(),
            next_id: RequestId::FIRST,
            log: Vec::new(),
            operators: OperatorSet::new(admin),
        }
    }

    /// Register an operator allowed to validate and commit results.
    pub fn grant_operator(&mut self, admin: &str, operator: impl Into<String>) -> Result<(), RegistryError> {
        if self.operators.grant(admin, operator) {
            Ok(())
        } else {
            Err(RegistryError::Unauthorized {
                caller: admin.to_string(),
            })
        }
    }

    /// Open a new request. Emits `ValidationRequired`.
    pub fn open_request(
        &mut self,
        requester: Requester,
        aggregation_type: &str,
        data_source_ref: DataSourceRef,
        claimed_data_count: u64,
        now: i64,
    ) -> Result<RequestId, RegistryError> {
        if claimed_data_count == 0 {
            return Err(RegistryError::InvalidCount);
        }

        let request_id = self.next_id;
        self.next_id = request_id.next();

        self.requests.insert(
            request_id,
            AggregationRequest {
                request_id,
                requester,
                aggregation_type: aggregation_type.to_string(),
                claimed_data_count,
                confirmed_count: None,
                data_source_ref,
                is_validated: false,
                is_processed: false,
                result: None,
                timestamp: now,
            },
        );

        self.emit(LedgerEvent::ValidationRequired { request_id }, now);
        Ok(request_id)
    }

    /// Snapshot of a request.
    pub fn get_request(&self, request_id: RequestId) -> Result<AggregationRequest, RegistryError> {
        self.requests
            .get(&request_id)
            .cloned()
            .ok_or(RegistryError::NotFound {
                request_id: request_id.value(),
            })
    }

    /// Record the independently confirmed count. Emits `AggregationRequested`.
    pub fn validate(
        &mut self,
        caller: &str,
        request_id: RequestId,
        confirmed_count: u64,
        now: i64,
    ) -> Result<(), RegistryError> {
        self.authorize(caller)?;

        let request = self.request_mut(request_id)?;
        if request.is_validated {
            return Err(RegistryError::AlreadyValidated {
                request_id: request_id.value(),
            });
        }
        if confirmed_count < MIN_RECORDS {
            return Err(RegistryError::BelowMinimum {
                count: confirmed_count,
                minimum: MIN_RECORDS,
            });
        }

        request.is_validated = true;
        request.confirmed_count = Some(confirmed_count);

        let event = LedgerEvent::AggregationRequested {
            request_id,
            requester: request.requester.clone(),
            aggregation_type: request.aggregation_type.clone(),
            data_count: request.claimed_data_count,
            data_source_ref: request.data_source_ref.url.clone(),
            company_id: request.data_source_ref.company_id.clone(),
        };
        self.emit(event, now);
        Ok(())
    }

    /// Commit the result. Emits `AggregationProcessed`.
    pub fn mark_processed(
        &mut self,
        caller: &str,
        request_id: RequestId,
        result: Decimal,
        now: i64,
    ) -> Result<(), RegistryError> {
        self.authorize(caller)?;

        let request = self.request_mut(request_id)?;
        if request.is_processed {
            return Err(RegistryError::AlreadyProcessed {
                request_id: request_id.value(),
            });
        }
        if !request.is_validated {
            return Err(RegistryError::NotValidated {
                request_id: request_id.value(),
            });
        }

        request.is_processed = true;
        request.result = Some(result);

        self.emit(LedgerEvent::AggregationProcessed { request_id, result }, now);
        Ok(())
    }

    /// Events with a sequence strictly greater than `cursor`, in log order.
    pub fn events_after(&self, cursor: u64) -> &[SequencedEvent] {
        // Sequences start at 1 and are dense, so the cursor is also an index.
        let start = (cursor as usize).min(self.log.len());
        &self.log[start..]
    }

    /// Sequence of the most recent event, 0 when the log is empty.
    pub fn last_sequence(&self) -> u64 {
        self.log.len() as u64
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    pub fn requests(&self) -> impl Iterator<Item = &AggregationRequest> {
        self.requests.values()
    }

    fn authorize(&self, caller: &str) -> Result<(), RegistryError> {
        if self.operators.is_operator(caller) {
            Ok(())
        } else {
            Err(RegistryError::Unauthorized {
                caller: caller.to_string(),
            })
        }
    }

    fn request_mut(&mut self, request_id: RequestId) -> Result<&mut AggregationRequest, RegistryError> {
        self.requests
            .get_mut(&request_id)
            .ok_or(RegistryError::NotFound {
                request_id: request_id.value(),
            })
    }

    fn emit(&mut self, event: LedgerEvent, now: i64) -> SequencedEvent {
        let sequenced = SequencedEvent::new(self.log.len() as u64 + 1, now, event);
        self.log.push(sequenced.clone());
        sequenced
    }
}
