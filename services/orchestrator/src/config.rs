//! Orchestrator configuration from environment variables

use std::env;
use std::time::Duration;

/// Configuration for the orchestrator runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Base URL of the ledger gateway
    pub ledger_endpoint: String,

    /// Identity sent with every ledger call
    pub ledger_operator_id: String,

    /// How often the ledger event log is tailed
    pub ledger_poll_interval: Duration,

    /// Base URL for requests whose data source locator is empty
    pub data_source_base_url: String,

    /// Records per data source page
    pub page_size: u32,

    /// Upper bound on every ledger and data source call
    pub call_timeout: Duration,

    /// Maximum requests worked on concurrently
    pub max_in_flight: usize,

    /// Extra attempts for transient failures (0 = never retry)
    pub retry_attempts: u32,

    /// Linear backoff unit between attempts
    pub retry_backoff: Duration,

    /// Decimal places kept when committing a result
    pub result_decimals: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ledger_endpoint: "http://localhost:8545".to_string(),
            ledger_operator_id: "orchestrator".to_string(),
            ledger_poll_interval: Duration::from_millis(1_000),
            data_source_base_url: "http://localhost:3001/api/company".to_string(),
            page_size: 100,
            call_timeout: Duration::from_millis(10_000),
            max_in_flight: 8,
            retry_attempts: 0,
            retry_backoff: Duration::from_millis(500),
            result_decimals: 0,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `LEDGER_ENDPOINT` (default: http://localhost:8545)
    /// - `LEDGER_OPERATOR_ID` (default: orchestrator)
    /// - `LEDGER_POLL_INTERVAL_MS` (default: 1000)
    /// - `DATA_SOURCE_BASE_URL` (default: http://localhost:3001/api/company)
    /// - `DATA_SOURCE_PAGE_SIZE` (default: 100)
    /// - `CALL_TIMEOUT_MS` (default: 10000)
    /// - `MAX_IN_FLIGHT` (default: 8)
    /// - `RETRY_ATTEMPTS` (default: 0)
    /// - `RETRY_BACKOFF_MS` (default: 500)
    /// - `RESULT_DECIMALS` (default: 0)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let millis = |key: &str, default: Duration| {
            number(key).map(Duration::from_millis).unwrap_or(default)
        };

        Self {
            ledger_endpoint: lookup("LEDGER_ENDPOINT").unwrap_or(defaults.ledger_endpoint),

            ledger_operator_id: lookup("LEDGER_OPERATOR_ID").unwrap_or(defaults.ledger_operator_id),

            ledger_poll_interval: millis("LEDGER_POLL_INTERVAL_MS", defaults.ledger_poll_interval),

            data_source_base_url: lookup("DATA_SOURCE_BASE_URL")
                .unwrap_or(defaults.data_source_base_url),

            page_size: number("DATA_SOURCE_PAGE_SIZE")
                .map(|n| n.clamp(1, u32::MAX as u64) as u32)
                .unwrap_or(defaults.page_size),

            call_timeout: millis("CALL_TIMEOUT_MS", defaults.call_timeout),

            max_in_flight: number("MAX_IN_FLIGHT")
                .map(|n| n.max(1) as usize)
                .unwrap_or(defaults.max_in_flight),

            retry_attempts: number("RETRY_ATTEMPTS")
                .map(|n| n.min(u32::MAX as u64) as u32)
                .unwrap_or(defaults.retry_attempts),

            retry_backoff: millis("RETRY_BACKOFF_MS", defaults.retry_backoff),

            result_decimals: number("RESULT_DECIMALS")
                .map(|n| n.min(28) as u32)
                .unwrap_or(defaults.result_decimals),
        }
    }
}
