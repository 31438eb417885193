//! Per-request orchestration state
//!
//! Transient and local: the ledger holds every durable flag. Entries exist
//! only to drop redundant work when events are redelivered, and a request is
//! released once it is `Done`; later events for it are answered by the
//! ledger. Failed requests stay tracked so they are not retried. Each entry has
//! its own step lock, held for the whole of a validation or processing step,
//! so steps of one request never overlap while distinct requests never
//! contend.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex as StepLock, MutexGuard as StepGuard};
use types::ids::RequestId;

/// Local phase of a request. Absent from the arena means `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestPhase {
    Idle,
    Validating,
    Validated,
    Processing,
    Done,
    Failed,
}

impl RequestPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestPhase::Done | RequestPhase::Failed)
    }

    /// Whether a `ValidationRequired` for this phase is fresh work.
    pub fn accepts_validation(&self) -> bool {
        matches!(self, RequestPhase::Idle)
    }

    /// Whether an `AggregationRequested` for this phase is fresh work.
    ///
    /// `Idle` is accepted: the orchestrator may have restarted after the
    /// ledger recorded the validation.
    pub fn accepts_processing(&self) -> bool {
        matches!(self, RequestPhase::Idle | RequestPhase::Validated)
    }
}

/// One arena entry
#[derive(Debug)]
pub struct RequestSlot {
    phase: Mutex<RequestPhase>,
    step: StepLock<()>,
}

impl RequestSlot {
    fn new() -> Self {
        Self {
            phase: Mutex::new(RequestPhase::Idle),
            step: StepLock::new(()),
        }
    }

    /// Wait until no other step of this request is running.
    pub async fn begin_step(&self) -> StepGuard<'_, ()> {
        self.step.lock().await
    }

    pub fn phase(&self) -> RequestPhase {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set(&self, phase: RequestPhase) {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner()) = phase;
    }

    /// Atomically move to `next` if `allowed` holds for the current phase.
    /// Returns the phase observed before the attempt.
    pub fn transition_if(&self, allowed: impl Fn(&RequestPhase) -> bool, next: RequestPhase) -> Result<RequestPhase, RequestPhase> {
        let mut phase = self.phase.lock().unwrap_or_else(|p| p.into_inner());
        let observed = *phase;
        if allowed(&observed) {
            *phase = next;
            Ok(observed)
        } else {
            Err(observed)
        }
    }
}

/// Arena of request slots keyed by id.
#[derive(Debug, Default)]
pub struct RequestStates {
    slots: DashMap<RequestId, Arc<RequestSlot>>,
}

impl RequestStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `request_id`, created `Idle` on first use.
    pub fn slot(&self, request_id: RequestId) -> Arc<RequestSlot> {
        self.slots
            .entry(request_id)
            .or_insert_with(|| Arc::new(RequestSlot::new()))
            .clone()
    }

    /// Slot for `request_id` if it is currently tracked.
    pub fn get(&self, request_id: RequestId) -> Option<Arc<RequestSlot>> {
        self.slots.get(&request_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Stop tracking a completed request.
    ///
    /// Removes the entry only while it is still `slot` and `Done`, so a
    /// fresh slot created for the same id in the meantime survives.
    pub fn release(&self, request_id: RequestId, slot: &Arc<RequestSlot>) -> bool {
        self.slots
            .remove_if(&request_id, |_, current| {
                Arc::ptr_eq(current, slot) && current.phase() == RequestPhase::Done
            })
            .is_some()
    }

    pub fn phase(&self, request_id: RequestId) -> RequestPhase {
        self.slots
            .get(&request_id)
            .map(|slot| slot.phase())
            .unwrap_or(RequestPhase::Idle)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of requests currently in a non-terminal, non-idle phase.
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| {
                let phase = entry.value().phase();
                !phase.is_terminal() && phase != RequestPhase::Idle
            })
            .count()
    }
}
