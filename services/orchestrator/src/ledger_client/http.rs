use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::errors::LedgerError;
use types::ids::RequestId;
use types::request::AggregationRequest;

use super::{EventStream, LedgerClient, EVENT_BUFFER};
use crate::config::OrchestratorConfig;
use crate::models::{EventsPage, LedgerRequestView, ProcessedBody, ValidateBody};

const OPERATOR_HEADER: &str = "x-operator-id";

/// Ledger client for a JSON ledger gateway.
///
/// The event stream is produced by tailing the gateway's append-only event
/// log with a sequence cursor.
#[derive(Clone)]
pub struct HttpLedgerClient {
    http: Client,
    endpoint: String,
    operator: String,
    poll_interval: Duration,
}

impl HttpLedgerClient {
    pub fn new(config: &OrchestratorConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.call_timeout).build()?;
        Ok(Self {
            http,
            endpoint: config.ledger_endpoint.trim_end_matches('/').to_string(),
            operator: config.ledger_operator_id.clone(),
            poll_interval: config.ledger_poll_interval.max(Duration::from_millis(1)),
        })
    }

    fn request_url(&self, request_id: RequestId, suffix: &str) -> String {
        format!("{}/requests/{}{}", self.endpoint, request_id, suffix)
    }

    async fn post_json<B: serde::Serialize + Sync>(
        &self,
        request_id: RequestId,
        url: String,
        body: &B,
    ) -> Result<(), LedgerError> {
        let res = self
            .http
            .post(&url)
            .header(OPERATOR_HEADER, &self.operator)
            .json(body)
            .send()
            .await
            .map_err(transient)?;

        check_status(request_id, res).await.map(|_| ())
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn subscribe(&self) -> Result<EventStream, LedgerError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let client = self.clone();

        tokio::spawn(async move {
            let mut cursor = 0u64;
            let mut ticker = tokio::time::interval(client.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }

                let url = format!("{}/events?after={}", client.endpoint, cursor);
                let page = match client
                    .http
                    .get(&url)
                    .header(OPERATOR_HEADER, &client.operator)
                    .send()
                    .await
                {
                    Ok(res) if res.status().is_success() => res.json::<EventsPage>().await,
                    Ok(res) => {
                        warn!(status = %res.status(), cursor, "Ledger event poll rejected");
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, cursor, "Ledger event poll failed");
                        continue;
                    }
                };

                let events = match page {
                    Ok(page) => page.events,
                    Err(e) => {
                        warn!(error = %e, cursor, "Malformed ledger event page");
                        continue;
                    }
                };

                for event in events {
                    if event.sequence <= cursor {
                        continue;
                    }
                    cursor = event.sequence;
                    if tx.send(event).await.is_err() {
                        debug!("Event subscriber dropped, stopping ledger poller");
                        return;
                    }
                }
            }
        });

        info!(endpoint = %self.endpoint, "Tailing ledger event log");
        Ok(rx)
    }

    async fn get_request(&self, request_id: RequestId) -> Result<AggregationRequest, LedgerError> {
        let res = self
            .http
            .get(self.request_url(request_id, ""))
            .header(OPERATOR_HEADER, &self.operator)
            .send()
            .await
            .map_err(transient)?;

        let view: LedgerRequestView = check_status(request_id, res)
            .await?
            .json()
            .await
            .map_err(transient)?;
        Ok(view.into_request(request_id))
    }

    async fn validate(&self, request_id: RequestId, confirmed_count: u64) -> Result<(), LedgerError> {
        let url = self.request_url(request_id, "/validate");
        self.post_json(request_id, url, &ValidateBody { confirmed_count })
            .await
    }

    async fn mark_processed(&self, request_id: RequestId, result: Decimal) -> Result<(), LedgerError> {
        let url = self.request_url(request_id, "/processed");
        self.post_json(request_id, url, &ProcessedBody { result }).await
    }
}

/// Map a gateway response onto the ledger error taxonomy.
async fn check_status(request_id: RequestId, res: Response) -> Result<Response, LedgerError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let detail = res.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => LedgerError::NotFound {
            request_id: request_id.value(),
        },
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => LedgerError::Rejected {
            reason: format!("{}: {}", status, detail),
        },
        _ => LedgerError::TransientFailure {
            reason: format!("{}: {}", status, detail),
        },
    })
}

fn transient(e: reqwest::Error) -> LedgerError {
    LedgerError::TransientFailure {
        reason: e.to_string(),
    }
}
