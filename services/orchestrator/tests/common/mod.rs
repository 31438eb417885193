//! Shared fixtures for orchestrator integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use compute_engine::codec::encode_value;
use ledger::RequestLedger;
use orchestrator::data_source::DataSource;
use orchestrator::ledger_client::LocalLedgerClient;
use orchestrator::{Orchestrator, OrchestratorConfig};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use types::errors::{LedgerError, SourceError};
use types::ids::{CompanyId, RequestId, Requester};
use types::request::{DataSourceRef, EncryptedRecord};

pub const OPERATOR: &str = "orchestrator";

/// In-memory company data source with scripted counts and batches.
#[derive(Default)]
pub struct ScriptedSource {
    counts: Mutex<HashMap<String, u64>>,
    batches: Mutex<HashMap<String, Vec<EncryptedRecord>>>,
    unavailable: Mutex<HashMap<String, u32>>,
    delay: Mutex<Duration>,
    pub count_calls: AtomicU64,
    pub batch_calls: AtomicU64,
    active: AtomicUsize,
    pub peak_active: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Company reports `count` and serves these values.
    pub fn company(&self, company: &str, count: u64, values: &[i64]) {
        self.counts.lock().unwrap().insert(company.to_string(), count);
        self.batches
            .lock()
            .unwrap()
            .insert(company.to_string(), values.iter().map(|v| encode_value(*v)).collect());
    }

    pub fn raw_batch(&self, company: &str, records: Vec<EncryptedRecord>) {
        self.counts
            .lock()
            .unwrap()
            .insert(company.to_string(), records.len() as u64);
        self.batches.lock().unwrap().insert(company.to_string(), records);
    }

    /// Next `times` calls for `company` fail as unavailable.
    pub fn fail_next(&self, company: &str, times: u32) {
        self.unavailable.lock().unwrap().insert(company.to_string(), times);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    async fn enter(&self, company: &str) -> Result<(), SourceError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut unavailable = self.unavailable.lock().unwrap();
        if let Some(remaining) = unavailable.get_mut(company) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SourceError::SourceUnavailable {
                    reason: "scripted outage".to_string(),
                });
            }
        }
        Ok(())
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn fetch_count(&self, source: &DataSourceRef) -> Result<u64, SourceError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        let company = source.company_id.as_str();
        let entered = self.enter(company).await;
        self.leave();
        entered?;

        self.counts
            .lock()
            .unwrap()
            .get(company)
            .copied()
            .ok_or_else(|| SourceError::SourceUnavailable {
                reason: format!("unknown company {}", company),
            })
    }

    async fn fetch_batch(&self, source: &DataSourceRef, count: u64) -> Result<Vec<EncryptedRecord>, SourceError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let company = source.company_id.as_str();
        let entered = self.enter(company).await;
        self.leave();
        entered?;

        let records = self
            .batches
            .lock()
            .unwrap()
            .get(company)
            .cloned()
            .unwrap_or_default();
        if (records.len() as u64) < count {
            return Err(SourceError::Incomplete {
                expected: count,
                received: records.len() as u64,
            });
        }
        Ok(records.into_iter().take(count as usize).collect())
    }
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        call_timeout: Duration::from_secs(2),
        retry_backoff: Duration::from_millis(10),
        ..OrchestratorConfig::default()
    }
}

pub fn source_ref(company: &str) -> DataSourceRef {
    DataSourceRef::new(
        format!("http://localhost:3001/api/company/{}/data", company),
        CompanyId::from(company),
    )
}

pub fn new_ledger() -> LocalLedgerClient {
    LocalLedgerClient::new(RequestLedger::new(OPERATOR), OPERATOR)
}

pub fn open(ledger: &LocalLedgerClient, kind: &str, company: &str, claimed: u64) -> RequestId {
    ledger
        .open_request(Requester::new("0xrequester"), kind, source_ref(company), claimed)
        .unwrap()
}

/// A running orchestrator and the handles to stop it.
pub struct Running {
    pub orchestrator: Orchestrator,
    pub shutdown: watch::Sender<bool>,
    pub handle: JoinHandle<Result<(), LedgerError>>,
}

impl Running {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        self.handle.await.unwrap().unwrap();
    }
}

pub fn start(ledger: &LocalLedgerClient, source: &Arc<ScriptedSource>, config: OrchestratorConfig) -> Running {
    let orchestrator = Orchestrator::new(Arc::new(ledger.clone()), source.clone(), config);
    let (shutdown, rx) = watch::channel(false);
    let runner = orchestrator.clone();
    let handle = tokio::spawn(async move { runner.run(rx).await });
    Running {
        orchestrator,
        shutdown,
        handle,
    }
}

/// Poll `check` until it holds, panicking after five seconds.
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Every request on the ledger satisfies `is_processed ⇒ is_validated`.
pub fn assert_ledger_consistent(ledger: &LocalLedgerClient) {
    ledger.with_ledger(|l| {
        for request in l.requests() {
            assert!(request.is_consistent(), "inconsistent request: {:?}", request);
        }
    });
}
