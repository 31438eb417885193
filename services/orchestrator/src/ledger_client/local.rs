use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use ledger::RequestLedger;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use types::errors::LedgerError;
use types::events::SequencedEvent;
use types::ids::{RequestId, Requester};
use types::request::{AggregationRequest, DataSourceRef};

use super::{EventStream, LedgerClient, EVENT_BUFFER};

/// Mutating ledger operations that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOp {
    Validate,
    MarkProcessed,
}

struct Shared {
    ledger: RequestLedger,
    /// Highest sequence already broadcast
    published: u64,
}

#[derive(Default)]
struct CallCounters {
    get_request: AtomicU64,
    validate: AtomicU64,
    mark_processed: AtomicU64,
    fail_validate: AtomicU32,
    fail_mark_processed: AtomicU32,
}

/// In-process ledger client over the reference [`RequestLedger`].
///
/// Events are fanned out to every subscriber through a broadcast channel.
/// New subscribers first receive the full log, so nothing emitted before
/// `subscribe` is lost.
#[derive(Clone)]
pub struct LocalLedgerClient {
    shared: Arc<Mutex<Shared>>,
    feed: broadcast::Sender<SequencedEvent>,
    operator: String,
    counters: Arc<CallCounters>,
}

impl LocalLedgerClient {
    /// Wrap a ledger, acting as `operator` for mutating calls.
    pub fn new(ledger: RequestLedger, operator: impl Into<String>) -> Self {
        let (feed, _) = broadcast::channel(EVENT_BUFFER);
        let published = ledger.last_sequence();
        Self {
            shared: Arc::new(Mutex::new(Shared { ledger, published })),
            feed,
            operator: operator.into(),
            counters: Arc::new(CallCounters::default()),
        }
    }

    /// Open a request on behalf of a requester. Emits `ValidationRequired`.
    pub fn open_request(
        &self,
        requester: Requester,
        aggregation_type: &str,
        data_source_ref: DataSourceRef,
        claimed_data_count: u64,
    ) -> Result<RequestId, LedgerError> {
        let mut shared = self.lock();
        let id = shared
            .ledger
            .open_request(requester, aggregation_type, data_source_ref, claimed_data_count, now())
            .map_err(LedgerError::from)?;
        self.publish(&mut shared);
        Ok(id)
    }

    /// Broadcast an already-emitted event again, as an at-least-once feed may.
    pub fn redeliver(&self, sequence: u64) -> bool {
        let shared = self.lock();
        let event = sequence
            .checked_sub(1)
            .and_then(|cursor| shared.ledger.events_after(cursor).first().cloned());
        match event {
            Some(event) => {
                let _ = self.feed.send(event);
                true
            }
            None => false,
        }
    }

    /// Make the next `times` calls of `op` fail with a transient error.
    pub fn inject_transient_failures(&self, op: LedgerOp, times: u32) {
        let counter = match op {
            LedgerOp::Validate => &self.counters.fail_validate,
            LedgerOp::MarkProcessed => &self.counters.fail_mark_processed,
        };
        counter.store(times, Ordering::SeqCst);
    }

    /// Read access to the underlying ledger.
    pub fn with_ledger<T>(&self, f: impl FnOnce(&RequestLedger) -> T) -> T {
        f(&self.lock().ledger)
    }

    pub fn validate_calls(&self) -> u64 {
        self.counters.validate.load(Ordering::SeqCst)
    }

    pub fn mark_processed_calls(&self) -> u64 {
        self.counters.mark_processed.load(Ordering::SeqCst)
    }

    pub fn get_request_calls(&self) -> u64 {
        self.counters.get_request.load(Ordering::SeqCst)
    }

    /// Total mutating calls issued, successful or not.
    pub fn mutation_calls(&self) -> u64 {
        self.validate_calls() + self.mark_processed_calls()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, shared: &mut Shared) {
        for event in shared.ledger.events_after(shared.published) {
            // No subscribers yet is fine: they replay the log on subscribe.
            let _ = self.feed.send(event.clone());
        }
        shared.published = shared.ledger.last_sequence();
    }

    fn take_injected_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerClient for LocalLedgerClient {
    async fn subscribe(&self) -> Result<EventStream, LedgerError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        // Snapshot and subscribe under one lock so no event falls in between.
        let (backlog, mut live) = {
            let shared = self.lock();
            (shared.ledger.events_after(0).to_vec(), self.feed.subscribe())
        };
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let mut forwarded = 0u64;
            for event in backlog {
                forwarded = forwarded.max(event.sequence);
                if tx.send(event).await.is_err() {
                    return;
                }
            }

            loop {
                match live.recv().await {
                    Ok(event) => {
                        forwarded = forwarded.max(event.sequence);
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Ledger feed lagged, replaying from log");
                        let missed = {
                            let shared = shared.lock().unwrap_or_else(|p| p.into_inner());
                            shared.ledger.events_after(forwarded).to_vec()
                        };
                        for event in missed {
                            forwarded = forwarded.max(event.sequence);
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        debug!(operator = %self.operator, "Subscribed to local ledger feed");
        Ok(rx)
    }

    async fn get_request(&self, request_id: RequestId) -> Result<AggregationRequest, LedgerError> {
        self.counters.get_request.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .ledger
            .get_request(request_id)
            .map_err(LedgerError::from)
    }

    async fn validate(&self, request_id: RequestId, confirmed_count: u64) -> Result<(), LedgerError> {
        self.counters.validate.fetch_add(1, Ordering::SeqCst);
        if Self::take_injected_failure(&self.counters.fail_validate) {
            return Err(LedgerError::TransientFailure {
                reason: "injected validate failure".to_string(),
            });
        }

        let mut shared = self.lock();
        shared
            .ledger
            .validate(&self.operator, request_id, confirmed_count, now())
            .map_err(LedgerError::from)?;
        self.publish(&mut shared);
        Ok(())
    }

    async fn mark_processed(&self, request_id: RequestId, result: Decimal) -> Result<(), LedgerError> {
        self.counters.mark_processed.fetch_add(1, Ordering::SeqCst);
        if Self::take_injected_failure(&self.counters.fail_mark_processed) {
            return Err(LedgerError::TransientFailure {
                reason: "injected mark_processed failure".to_string(),
            });
        }

        let mut shared = self.lock();
        shared
            .ledger
            .mark_processed(&self.operator, request_id, result, now())
            .map_err(LedgerError::from)?;
        self.publish(&mut shared);
        Ok(())
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
