//! Aggregation Request Orchestrator
//!
//! Observes the request ledger, enforces the minimum-record policy against the
//! live count reported by a company's data source, computes the requested
//! statistic and commits the result back to the ledger.
//!
//! # Architecture
//!
//! ```text
//!          Request Ledger (event log)
//!                  │
//!          ┌───────▼────────┐
//!          │  LedgerClient  │  ← subscribe / get_request / validate / mark_processed
//!          └───────┬────────┘
//!                  │
//!          ┌───────▼────────┐      ┌────────────┐
//!          │  Orchestrator  │─────►│ DataSource │  ← fetch_count / fetch_batch
//!          └───────┬────────┘      └────────────┘
//!                  │
//!          ┌───────▼────────┐
//!          │ compute-engine │  ← sum / average / count / median
//!          └────────────────┘
//! ```

pub mod config;
pub mod data_source;
pub mod error;
pub mod ledger_client;
pub mod models;
pub mod orchestrator;
pub mod state;

pub use config::OrchestratorConfig;
pub use orchestrator::{Orchestrator, StatsSnapshot};

// Service version
pub const SERVICE_VERSION: &str = "0.1.0";
