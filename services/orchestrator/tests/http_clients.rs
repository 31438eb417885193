//! HTTP clients against in-process axum mocks of the company data service
//! and the ledger gateway.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use compute_engine::codec::encode_value;
use ledger::errors::RegistryError;
use ledger::RequestLedger;
use orchestrator::data_source::{DataSource, HttpDataSource};
use orchestrator::ledger_client::{HttpLedgerClient, LedgerClient};
use orchestrator::models::LedgerRequestView;
use orchestrator::state::RequestPhase;
use orchestrator::{Orchestrator, OrchestratorConfig};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use types::errors::{LedgerError, SourceError};
use types::ids::{CompanyId, RequestId, Requester};
use types::request::DataSourceRef;

const OPERATOR: &str = "orchestrator";

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ---- company data service ----

#[derive(Default)]
struct Companies {
    /// company -> (reported count, served values)
    data: Mutex<HashMap<String, (u64, Vec<i64>)>>,
    page_requests: AtomicU64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageQuery {
    page: Option<u64>,
    page_size: Option<u64>,
}

async fn company_data(
    State(companies): State<Arc<Companies>>,
    Path(company): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    companies.page_requests.fetch_add(1, Ordering::SeqCst);
    let data = companies.data.lock().unwrap();
    let Some((_, values)) = data.get(&company) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "error": "Company data not found"})),
        )
            .into_response();
    };

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(100).max(1);
    let total = values.len() as u64;
    let start = ((page - 1) * page_size).min(total) as usize;
    let end = (page * page_size).min(total) as usize;
    let records: Vec<String> = values[start..end]
        .iter()
        .map(|v| encode_value(*v).as_str().to_string())
        .collect();

    Json(json!({
        "success": true,
        "data": records,
        "pagination": {
            "page": page,
            "pageSize": page_size,
            "totalRecords": total,
            "totalPages": total.div_ceil(page_size),
            "hasMore": (end as u64) < total,
        }
    }))
    .into_response()
}

async fn company_count(State(companies): State<Arc<Companies>>, Path(company): Path<String>) -> Response {
    match companies.data.lock().unwrap().get(&company) {
        Some((count, _)) => Json(json!({"success": true, "recordCount": count})).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "error": "Company data not found"})),
        )
            .into_response(),
    }
}

async fn company_service(companies: Arc<Companies>) -> String {
    let app = Router::new()
        .route("/api/company/{company}/data", get(company_data))
        .route("/api/company/{company}/count", get(company_count))
        .with_state(companies);
    format!("http://{}", serve(app).await)
}

fn company_ref(base: &str, company: &str) -> DataSourceRef {
    DataSourceRef::new(
        format!("{}/api/company/{}/data", base, company),
        CompanyId::from(company),
    )
}

// ---- ledger gateway ----

type Gateway = Arc<Mutex<RequestLedger>>;

#[derive(Deserialize)]
struct EventsQuery {
    after: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest {
    confirmed_count: u64,
}

#[derive(Deserialize)]
struct ProcessedRequest {
    result: Decimal,
}

fn registry_error(err: RegistryError) -> Response {
    let status = match err {
        RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::CONFLICT,
    };
    (status, err.to_string()).into_response()
}

fn operator(headers: &HeaderMap) -> String {
    headers
        .get("x-operator-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

async fn gateway_request(State(gateway): State<Gateway>, Path(id): Path<u64>) -> Response {
    match gateway.lock().unwrap().get_request(RequestId::new(id)) {
        Ok(request) => Json(LedgerRequestView {
            requester: request.requester,
            aggregation_type: request.aggregation_type,
            timestamp: request.timestamp,
            is_processed: request.is_processed,
            data_count: request.claimed_data_count,
            data_source_ref: request.data_source_ref.url,
            company_id: request.data_source_ref.company_id,
            is_validated: request.is_validated,
            result: request.result,
            confirmed_count: request.confirmed_count,
        })
        .into_response(),
        Err(e) => registry_error(e),
    }
}

async fn gateway_validate(
    State(gateway): State<Gateway>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(body): Json<ValidateRequest>,
) -> Response {
    let outcome = gateway
        .lock()
        .unwrap()
        .validate(&operator(&headers), RequestId::new(id), body.confirmed_count, now());
    match outcome {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => registry_error(e),
    }
}

async fn gateway_processed(
    State(gateway): State<Gateway>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(body): Json<ProcessedRequest>,
) -> Response {
    let outcome = gateway
        .lock()
        .unwrap()
        .mark_processed(&operator(&headers), RequestId::new(id), body.result, now());
    match outcome {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => registry_error(e),
    }
}

async fn gateway_events(State(gateway): State<Gateway>, Query(query): Query<EventsQuery>) -> Response {
    let ledger = gateway.lock().unwrap();
    let events = ledger.events_after(query.after.unwrap_or(0)).to_vec();
    Json(json!({ "events": events })).into_response()
}

async fn outage() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn ledger_gateway(gateway: Gateway) -> String {
    let app = Router::new()
        .route("/requests/{id}", get(gateway_request))
        .route("/requests/{id}/validate", post(gateway_validate))
        .route("/requests/{id}/processed", post(gateway_processed))
        .route("/events", get(gateway_events))
        .route("/outage/requests/{id}", get(outage))
        .with_state(gateway);
    format!("http://{}", serve(app).await)
}

fn config(ledger_endpoint: &str, data_source_base_url: &str) -> OrchestratorConfig {
    OrchestratorConfig {
        ledger_endpoint: ledger_endpoint.to_string(),
        ledger_operator_id: OPERATOR.to_string(),
        ledger_poll_interval: Duration::from_millis(20),
        data_source_base_url: data_source_base_url.to_string(),
        page_size: 100,
        call_timeout: Duration::from_secs(2),
        ..OrchestratorConfig::default()
    }
}

async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---- data source client ----

#[tokio::test]
async fn test_fetch_batch_concatenates_pages_in_order() {
    let companies = Arc::new(Companies::default());
    let values: Vec<i64> = (0..250).collect();
    companies
        .data
        .lock()
        .unwrap()
        .insert("company1".to_string(), (250, values.clone()));
    let base = company_service(companies.clone()).await;

    let source = HttpDataSource::with_client(reqwest::Client::new(), 100);
    let target = company_ref(&base, "company1");

    assert_eq!(source.fetch_count(&target).await.unwrap(), 250);

    let batch = source.fetch_batch(&target, 250).await.unwrap();
    assert_eq!(batch.len(), 250);
    assert_eq!(batch[0], encode_value(0));
    assert_eq!(batch[249], encode_value(249));
    assert_eq!(companies.page_requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_fetch_batch_stops_once_count_is_reached() {
    let companies = Arc::new(Companies::default());
    companies
        .data
        .lock()
        .unwrap()
        .insert("big".to_string(), (500, (0..500).collect()));
    let base = company_service(companies.clone()).await;

    let source = HttpDataSource::with_client(reqwest::Client::new(), 100);
    let batch = source.fetch_batch(&company_ref(&base, "big"), 150).await.unwrap();

    assert_eq!(batch.len(), 150);
    assert_eq!(batch[149], encode_value(149));
    assert_eq!(companies.page_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_short_source_is_incomplete() {
    let companies = Arc::new(Companies::default());
    companies
        .data
        .lock()
        .unwrap()
        .insert("short".to_string(), (1000, (0..950).collect()));
    let base = company_service(companies).await;

    let source = HttpDataSource::with_client(reqwest::Client::new(), 100);
    let err = source
        .fetch_batch(&company_ref(&base, "short"), 1000)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SourceError::Incomplete {
            expected: 1000,
            received: 950
        }
    );
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_unknown_company_is_unavailable() {
    let base = company_service(Arc::new(Companies::default())).await;
    let source = HttpDataSource::with_client(reqwest::Client::new(), 100);

    let err = source.fetch_count(&company_ref(&base, "ghost")).await.unwrap_err();
    assert!(matches!(err, SourceError::SourceUnavailable { .. }));
    assert!(err.is_transient());
}

// ---- ledger gateway client ----

fn gateway_with_request(source: DataSourceRef, claimed: u64) -> (Gateway, RequestId) {
    let mut ledger = RequestLedger::new(OPERATOR);
    let id = ledger
        .open_request(Requester::new("0xrequester"), "sum", source, claimed, now())
        .unwrap();
    (Arc::new(Mutex::new(ledger)), id)
}

#[tokio::test]
async fn test_ledger_client_reads_and_validates() {
    let (gateway, id) = gateway_with_request(company_ref("http://data", "c1"), 40);
    let endpoint = ledger_gateway(gateway.clone()).await;
    let client = HttpLedgerClient::new(&config(&endpoint, "")).unwrap();

    let request = client.get_request(id).await.unwrap();
    assert_eq!(request.claimed_data_count, 40);
    assert!(!request.is_validated);
    assert_eq!(request.result, None);

    client.validate(id, 40).await.unwrap();
    assert!(gateway.lock().unwrap().get_request(id).unwrap().is_validated);

    // Second validation is a ledger rejection, not a transport failure.
    assert!(matches!(
        client.validate(id, 40).await,
        Err(LedgerError::Rejected { .. })
    ));

    client.mark_processed(id, Decimal::from(780)).await.unwrap();
    let request = client.get_request(id).await.unwrap();
    assert!(request.is_processed);
    assert_eq!(request.result, Some(Decimal::from(780)));
}

#[tokio::test]
async fn test_ledger_client_maps_statuses() {
    let (gateway, _) = gateway_with_request(company_ref("http://data", "c1"), 40);
    let endpoint = ledger_gateway(gateway).await;

    let client = HttpLedgerClient::new(&config(&endpoint, "")).unwrap();
    assert!(matches!(
        client.get_request(RequestId::new(99)).await,
        Err(LedgerError::NotFound { request_id: 99 })
    ));

    let outage = HttpLedgerClient::new(&config(&format!("{}/outage", endpoint), "")).unwrap();
    let err = outage.get_request(RequestId::new(1)).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unauthorized_operator_is_rejected() {
    let (gateway, id) = gateway_with_request(company_ref("http://data", "c1"), 40);
    let endpoint = ledger_gateway(gateway.clone()).await;

    let intruder = HttpLedgerClient::new(&OrchestratorConfig {
        ledger_operator_id: "mallory".to_string(),
        ..config(&endpoint, "")
    })
    .unwrap();

    assert!(matches!(
        intruder.validate(id, 40).await,
        Err(LedgerError::Rejected { .. })
    ));
    assert!(!gateway.lock().unwrap().get_request(id).unwrap().is_validated);
}

#[tokio::test]
async fn test_event_stream_tails_gateway_log() {
    let (gateway, first) = gateway_with_request(company_ref("http://data", "c1"), 40);
    let endpoint = ledger_gateway(gateway.clone()).await;
    let client = HttpLedgerClient::new(&config(&endpoint, "")).unwrap();

    let mut events = client.subscribe().await.unwrap();
    let received = events.recv().await.unwrap();
    assert_eq!(received.sequence, 1);
    assert_eq!(received.request_id(), first);

    gateway
        .lock()
        .unwrap()
        .validate(OPERATOR, first, 40, now())
        .unwrap();
    let received = events.recv().await.unwrap();
    assert_eq!(received.sequence, 2);
    assert_eq!(received.event.event_type_label(), "AggregationRequested");
}

// ---- full pipeline over HTTP ----

async fn run_pipeline(reported: u64, served: i64, claimed: u64) -> (Gateway, RequestId, Orchestrator, watch::Sender<bool>) {
    let companies = Arc::new(Companies::default());
    companies
        .data
        .lock()
        .unwrap()
        .insert("company1".to_string(), (reported, (0..served).collect()));
    let base = company_service(companies).await;

    let (gateway, id) = gateway_with_request(company_ref(&base, "company1"), claimed);
    let endpoint = ledger_gateway(gateway.clone()).await;

    let config = config(&endpoint, &format!("{}/api/company", base));
    let ledger = HttpLedgerClient::new(&config).unwrap();
    let source = HttpDataSource::new(&config).unwrap();
    let orchestrator = Orchestrator::new(Arc::new(ledger), Arc::new(source), config);

    let (shutdown, rx) = watch::channel(false);
    let runner = orchestrator.clone();
    tokio::spawn(async move { runner.run(rx).await });

    (gateway, id, orchestrator, shutdown)
}

#[tokio::test]
async fn test_pipeline_commits_sum_over_http() {
    let (gateway, id, orchestrator, shutdown) = run_pipeline(1000, 1000, 1000).await;

    eventually("request processed", || {
        gateway.lock().unwrap().get_request(id).unwrap().is_processed
    })
    .await;

    let request = gateway.lock().unwrap().get_request(id).unwrap();
    assert_eq!(request.confirmed_count, Some(1000));
    assert_eq!(request.result, Some(Decimal::from(499_500)));
    eventually("request released", || orchestrator.tracked_requests() == 0).await;
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn test_pipeline_short_source_never_commits() {
    let (gateway, id, orchestrator, shutdown) = run_pipeline(1000, 950, 1000).await;

    eventually("request failed", || orchestrator.phase(id) == RequestPhase::Failed).await;

    let request = gateway.lock().unwrap().get_request(id).unwrap();
    assert!(request.is_validated);
    assert!(!request.is_processed);
    assert_eq!(request.result, None);
    assert_eq!(gateway.lock().unwrap().last_sequence(), 2);
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn test_pipeline_rejects_small_dataset() {
    let (gateway, id, orchestrator, shutdown) = run_pipeline(9, 9, 9).await;

    eventually("request rejected", || orchestrator.phase(id) == RequestPhase::Failed).await;

    assert!(!gateway.lock().unwrap().get_request(id).unwrap().is_validated);
    assert_eq!(orchestrator.stats().rejected, 1);
    let _ = shutdown.send(true);
}
