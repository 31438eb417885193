//! Data Source Client
//!
//! Reads a company's record batch and live record count from its external
//! data service. Pages are fetched in order and concatenated; a short batch is
//! an error, never silently accepted.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use types::errors::SourceError;
use types::request::{DataSourceRef, EncryptedRecord};

use crate::config::OrchestratorConfig;
use crate::models::{CountResponse, PageResponse};

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Authoritative live record count.
    async fn fetch_count(&self, source: &DataSourceRef) -> Result<u64, SourceError>;

    /// Exactly `count` records in source order.
    async fn fetch_batch(&self, source: &DataSourceRef, count: u64) -> Result<Vec<EncryptedRecord>, SourceError>;
}

/// HTTP client for the paginated company data service.
///
/// Stateless apart from the pooled `reqwest::Client`; safe to share.
#[derive(Clone)]
pub struct HttpDataSource {
    http: Client,
    page_size: u32,
}

impl HttpDataSource {
    pub fn new(config: &OrchestratorConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.call_timeout).build()?;
        Ok(Self::with_client(http, config.page_size))
    }

    pub fn with_client(http: Client, page_size: u32) -> Self {
        Self {
            http,
            page_size: page_size.max(1),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| unavailable(format!("request to {} failed: {}", url, e)))?;

        if !res.status().is_success() {
            return Err(unavailable(format!("{} returned {}", url, res.status())));
        }

        res.json::<T>()
            .await
            .map_err(|e| unavailable(format!("malformed response from {}: {}", url, e)))
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn fetch_count(&self, source: &DataSourceRef) -> Result<u64, SourceError> {
        let url = source.count_url();
        let body: CountResponse = self.get_json(&url).await?;

        match (body.success, body.record_count) {
            (true, Some(count)) => Ok(count),
            (true, None) => Err(unavailable(format!("{} reported no recordCount", url))),
            (false, _) => Err(unavailable(
                body.error.unwrap_or_else(|| format!("{} reported failure", url)),
            )),
        }
    }

    async fn fetch_batch(&self, source: &DataSourceRef, count: u64) -> Result<Vec<EncryptedRecord>, SourceError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut records: Vec<EncryptedRecord> = Vec::with_capacity(count.min(100_000) as usize);
        let mut page = 1u64;

        loop {
            let url = page_url(&source.url, page, self.page_size);
            let body: PageResponse = self.get_json(&url).await?;
            if !body.success {
                return Err(unavailable(
                    body.error.unwrap_or_else(|| format!("page {} reported failure", page)),
                ));
            }

            let received = body.data.len();
            records.extend(body.data);
            debug!(
                company_id = %source.company_id,
                page,
                received,
                collected = records.len(),
                "Fetched data page"
            );

            let has_more = body.pagination.map(|p| p.has_more).unwrap_or(false);
            if records.len() as u64 >= count || !has_more {
                break;
            }
            if received == 0 {
                warn!(company_id = %source.company_id, page, "Source reported more pages but returned none");
                break;
            }
            page += 1;
        }

        if (records.len() as u64) < count {
            return Err(SourceError::Incomplete {
                expected: count,
                received: records.len() as u64,
            });
        }

        records.truncate(count as usize);
        Ok(records)
    }
}

fn page_url(base: &str, page: u64, page_size: u32) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}page={}&pageSize={}", base, separator, page, page_size)
}

fn unavailable(reason: String) -> SourceError {
    SourceError::SourceUnavailable { reason }
}
