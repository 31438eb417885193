//! Request Orchestrator
//!
//! Consumes the ledger event stream and drives every request through
//! validation and processing:
//!
//! ```text
//! ValidationRequired ──► get_request ─► fetch_count ─► (< 10: Failed, no ledger call)
//!                                                      (≥ 10: validate ─► Validated)
//! AggregationRequested ─► fetch_batch ─► compute ─► mark_processed ─► Done
//! AggregationProcessed ─► Done (observational)
//! ```
//!
//! Each request id is an independent unit of work; distinct ids run
//! concurrently up to `max_in_flight`. Failures are logged with the request
//! id and cause and abandon that request only. A request leaves the local
//! state arena once it is `Done`.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use types::aggregation::{meets_minimum, AggregationType, MIN_RECORDS};
use types::errors::LedgerError;
use types::events::{LedgerEvent, SequencedEvent};
use types::ids::RequestId;
use types::request::DataSourceRef;

use crate::config::OrchestratorConfig;
use crate::data_source::DataSource;
use crate::error::RequestFailure;
use crate::ledger_client::LedgerClient;
use crate::state::{RequestPhase, RequestStates};

/// Counters reported while running and at shutdown
#[derive(Debug, Default)]
pub struct OrchestratorStats {
    validated: AtomicU64,
    rejected: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    duplicates: AtomicU64,
    observed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub validated: u64,
    pub rejected: u64,
    pub processed: u64,
    pub failed: u64,
    pub duplicates: u64,
    pub observed: u64,
}

impl OrchestratorStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            validated: self.validated.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            observed: self.observed.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Event-driven coordinator between the ledger, the data source and the
/// compute engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Orchestrator {
    ledger: Arc<dyn LedgerClient>,
    source: Arc<dyn DataSource>,
    states: Arc<RequestStates>,
    stats: Arc<OrchestratorStats>,
    config: Arc<OrchestratorConfig>,
}

impl Orchestrator {
    pub fn new(ledger: Arc<dyn LedgerClient>, source: Arc<dyn DataSource>, config: OrchestratorConfig) -> Self {
        Self {
            ledger,
            source,
            states: Arc::new(RequestStates::new()),
            stats: Arc::new(OrchestratorStats::default()),
            config: Arc::new(config),
        }
    }

    /// Local phase of a request.
    pub fn phase(&self, request_id: RequestId) -> RequestPhase {
        self.states.phase(request_id)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Requests currently held in the local state arena.
    pub fn tracked_requests(&self) -> usize {
        self.states.len()
    }

    /// Consume ledger events until the stream closes or `shutdown` flips to
    /// `true`. In-flight requests run to completion before this returns.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), LedgerError> {
        let mut events = self.ledger.subscribe().await?;
        let limiter = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();

        info!(
            max_in_flight = self.config.max_in_flight,
            call_timeout_ms = self.config.call_timeout.as_millis() as u64,
            retry_attempts = self.config.retry_attempts,
            "Orchestrator listening for ledger events"
        );

        let mut shutdown_open = true;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                changed = shutdown.changed(), if shutdown_open => {
                    // A dropped sender can no longer ask us to stop.
                    shutdown_open = changed.is_ok();
                    continue;
                }
                next = events.recv() => next,
            };

            let Some(event) = next else {
                info!("Ledger event stream closed");
                break;
            };

            let permit = match Arc::clone(&limiter).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let this = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                this.handle_event(event).await;
            });

            while let Some(finished) = tasks.try_join_next() {
                if let Err(e) = finished {
                    error!(error = %e, "Request task aborted");
                }
            }
        }

        info!(in_flight = tasks.len(), "Draining in-flight requests");
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "Request task aborted");
            }
        }

        info!(
            stats = ?self.stats(),
            tracked = self.states.len(),
            unfinished = self.states.in_flight(),
            "Orchestrator stopped"
        );
        Ok(())
    }

    /// Dispatch one ledger event. Never fails: every outcome is logged and
    /// recorded in the local phase.
    pub async fn handle_event(&self, event: SequencedEvent) {
        debug!(
            sequence = event.sequence,
            request_id = %event.request_id(),
            event_type = event.event.event_type_label(),
            "Ledger event received"
        );

        match &event.event {
            LedgerEvent::ValidationRequired { request_id } => {
                self.on_validation_required(*request_id).await;
            }
            requested @ LedgerEvent::AggregationRequested { .. } => {
                self.on_aggregation_requested(requested).await;
            }
            LedgerEvent::AggregationProcessed { request_id, result } => {
                self.on_aggregation_processed(*request_id, *result).await;
            }
        }
    }

    async fn on_validation_required(&self, request_id: RequestId) {
        let slot = self.states.slot(request_id);
        let _step = slot.begin_step().await;

        if let Err(observed) = slot.transition_if(RequestPhase::accepts_validation, RequestPhase::Validating) {
            OrchestratorStats::bump(&self.stats.duplicates);
            debug!(request_id = %request_id, phase = ?observed, "Duplicate ValidationRequired ignored");
            return;
        }

        match self.validate_request(request_id).await {
            Ok(ValidationOutcome::Validated { confirmed_count }) => {
                slot.set(RequestPhase::Validated);
                OrchestratorStats::bump(&self.stats.validated);
                info!(request_id = %request_id, confirmed_count, "Request validated");
            }
            Ok(ValidationOutcome::AlreadyOnLedger { processed: true }) => {
                slot.set(RequestPhase::Done);
                self.states.release(request_id, &slot);
                OrchestratorStats::bump(&self.stats.duplicates);
                debug!(request_id = %request_id, "ValidationRequired for a processed request ignored");
            }
            Ok(ValidationOutcome::AlreadyOnLedger { processed: false }) => {
                slot.set(RequestPhase::Validated);
                debug!(request_id = %request_id, "Ledger already validated request");
            }
            Err(failure @ RequestFailure::ValidationRejected { .. }) => {
                slot.set(RequestPhase::Failed);
                OrchestratorStats::bump(&self.stats.rejected);
                warn!(
                    request_id = %request_id,
                    cause = failure.kind(),
                    error = %failure,
                    "Request rejected by minimum-record policy"
                );
            }
            Err(failure) => {
                slot.set(RequestPhase::Failed);
                OrchestratorStats::bump(&self.stats.failed);
                error!(
                    request_id = %request_id,
                    cause = failure.kind(),
                    error = %failure,
                    "Validation failed, request abandoned"
                );
            }
        }
    }

    async fn validate_request(&self, request_id: RequestId) -> Result<ValidationOutcome, RequestFailure> {
        let request = self
            .call("get_request", || self.ledger.get_request(request_id))
            .await?;

        if request.is_validated {
            return Ok(ValidationOutcome::AlreadyOnLedger {
                processed: request.is_processed,
            });
        }

        let source = request.data_source_ref.resolve(&self.config.data_source_base_url);
        let actual = self
            .call("fetch_count", || self.source.fetch_count(&source))
            .await?;

        if !meets_minimum(actual) {
            return Err(RequestFailure::ValidationRejected {
                actual,
                minimum: MIN_RECORDS,
            });
        }

        if actual != request.claimed_data_count {
            debug!(
                request_id = %request_id,
                claimed = request.claimed_data_count,
                actual,
                "Live count differs from claimed count"
            );
        }

        self.call("validate", || self.ledger.validate(request_id, actual))
            .await?;
        Ok(ValidationOutcome::Validated {
            confirmed_count: actual,
        })
    }

    async fn on_aggregation_requested(&self, event: &LedgerEvent) {
        let LedgerEvent::AggregationRequested {
            request_id,
            aggregation_type,
            data_count,
            ..
        } = event
        else {
            return;
        };
        let request_id = *request_id;
        let Some(source) = event.data_source() else {
            return;
        };

        let slot = self.states.slot(request_id);
        let _step = slot.begin_step().await;

        let observed = match slot.transition_if(RequestPhase::accepts_processing, RequestPhase::Processing) {
            Ok(observed) => observed,
            Err(observed) => {
                OrchestratorStats::bump(&self.stats.duplicates);
                debug!(request_id = %request_id, phase = ?observed, "AggregationRequested ignored");
                return;
            }
        };

        let source = source.resolve(&self.config.data_source_base_url);
        match self
            .process_request(request_id, observed, aggregation_type, &source, *data_count)
            .await
        {
            Ok(ProcessOutcome::AlreadyOnLedger) => {
                slot.set(RequestPhase::Done);
                self.states.release(request_id, &slot);
                OrchestratorStats::bump(&self.stats.duplicates);
                debug!(request_id = %request_id, "AggregationRequested for a processed request ignored");
            }
            Ok(ProcessOutcome::Committed(result)) => {
                slot.set(RequestPhase::Done);
                self.states.release(request_id, &slot);
                OrchestratorStats::bump(&self.stats.processed);
                info!(
                    request_id = %request_id,
                    aggregation = %aggregation_type,
                    records = data_count,
                    result = %result,
                    "Aggregation committed"
                );
            }
            Err(failure) => {
                slot.set(RequestPhase::Failed);
                OrchestratorStats::bump(&self.stats.failed);
                error!(
                    request_id = %request_id,
                    cause = failure.kind(),
                    error = %failure,
                    "Processing failed, request abandoned"
                );
            }
        }
    }

    async fn process_request(
        &self,
        request_id: RequestId,
        observed: RequestPhase,
        aggregation_type: &str,
        source: &DataSourceRef,
        data_count: u64,
    ) -> Result<ProcessOutcome, RequestFailure> {
        // Not seen locally: a replay may arrive after the result was committed.
        if observed == RequestPhase::Idle {
            let request = self
                .call("get_request", || self.ledger.get_request(request_id))
                .await?;
            if request.is_processed {
                return Ok(ProcessOutcome::AlreadyOnLedger);
            }
        }

        // Reject unsupported statistics before any record is fetched.
        let kind: AggregationType = aggregation_type.parse()?;

        let batch = self
            .call("fetch_batch", || self.source.fetch_batch(source, data_count))
            .await?;

        let computed = compute_engine::compute(&batch, kind)?;
        let result = round_result(computed, self.config.result_decimals);

        self.call("mark_processed", || self.ledger.mark_processed(request_id, result))
            .await?;
        Ok(ProcessOutcome::Committed(result))
    }

    async fn on_aggregation_processed(&self, request_id: RequestId, result: Decimal) {
        OrchestratorStats::bump(&self.stats.observed);

        if let Some(slot) = self.states.get(request_id) {
            let _step = slot.begin_step().await;
            slot.set(RequestPhase::Done);
            self.states.release(request_id, &slot);
        }
        info!(request_id = %request_id, result = %result, "Ledger recorded aggregation result");
    }

    /// Run one external call under the per-call timeout, with the configured
    /// bounded retry for transient failures.
    async fn call<T, E, F, Fut>(&self, operation: &'static str, mut f: F) -> Result<T, RequestFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RequestFailure>,
    {
        let timeout = self.config.call_timeout;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(timeout, f()).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(RequestFailure::Timeout {
                    operation,
                    after_ms: timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Err(failure) if failure.is_retryable() && attempt <= self.config.retry_attempts => {
                    let delay = backoff(self.config.retry_backoff, attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

enum ValidationOutcome {
    Validated { confirmed_count: u64 },
    AlreadyOnLedger { processed: bool },
}

enum ProcessOutcome {
    Committed(Decimal),
    AlreadyOnLedger,
}

fn backoff(unit: Duration, attempt: u32) -> Duration {
    unit.saturating_mul(attempt)
}

/// Round to `decimals` places, midpoints toward positive infinity.
fn round_result(value: Decimal, decimals: u32) -> Decimal {
    let strategy = if value.is_sign_negative() {
        RoundingStrategy::MidpointTowardZero
    } else {
        RoundingStrategy::MidpointAwayFromZero
    };
    value.round_dp_with_strategy(decimals, strategy)
}
