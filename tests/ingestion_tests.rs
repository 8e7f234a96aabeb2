/// Ingestion tests against mocked filing APIs and portals
/// Covers retry classification, circuit breaking and per-pair isolation
use lien_prospect_pipeline::circuit_breaker::CircuitStatus;
use lien_prospect_pipeline::config::PipelineConfig;
use lien_prospect_pipeline::ingestion::IngestionService;
use lien_prospect_pipeline::models::{DataSource, DataSourceKind, FilingStatus, RawFiling};
use lien_prospect_pipeline::sources::SourceClients;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_source(id: &str, endpoint: String) -> DataSource {
    DataSource {
        id: id.to_string(),
        name: format!("{} filings API", id),
        kind: DataSourceKind::Api,
        endpoint: Some(endpoint),
        credential: Some("test_token".to_string()),
        rate_limit_per_minute: 60,
    }
}

/// Helper function to create a test config with fast retries
fn create_test_config(sources: Vec<DataSource>, regions: &[&str]) -> PipelineConfig {
    PipelineConfig {
        sources,
        regions: regions.iter().map(|r| r.to_string()).collect(),
        retry_attempts: 3,
        retry_delay_ms: 10,
        max_retry_delay_ms: 40,
        ..PipelineConfig::default()
    }
}

fn filings_body() -> serde_json::Value {
    json!([
        {
            "filingNumber": "CA-2021-0001",
            "filingDate": "2021-03-15",
            "debtorName": "Acme Manufacturing LLC",
            "securedPartyName": "First Capital Bank",
            "status": "lapsed",
            "lienAmount": "$500,000.00"
        },
        {
            "filingNumber": "CA-2022-0042",
            "filingDate": "06/01/2022",
            "debtorName": "Bay Bistro",
            "securedPartyName": "Merchant Advance Co",
            "status": "active",
            "lienAmount": 25000
        }
    ])
}

#[tokio::test]
async fn test_retry_recovers_after_two_server_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/filings"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/filings"))
        .and(query_param("region", "CA"))
        .and(header("authorization", "Bearer test_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(filings_body()))
        .mount(&mock_server)
        .await;

    let config = create_test_config(vec![api_source("ca-sos", mock_server.uri())], &["CA"]);
    let service = IngestionService::from_config(&config).unwrap();

    let results = service.ingest(None).await;

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.success);
    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(result.filings.len(), 2);
    assert_eq!(result.metadata.record_count, 2);
    assert_eq!(result.filings[0].lien_amount, Some(500_000.0));
    assert_eq!(result.filings[0].status, FilingStatus::Lapsed);
    assert_eq!(result.filings[0].jurisdiction, "CA");

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 3);
    assert_eq!(
        service.circuit_state("ca-sos").unwrap().status,
        CircuitStatus::Closed
    );
}

#[tokio::test]
async fn test_exhausted_retries_report_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/filings"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(vec![api_source("ca-sos", mock_server.uri())], &["CA"]);
    let service = IngestionService::from_config(&config).unwrap();

    let results = service.ingest(None).await;

    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert!(results[0].filings.is_empty());
    assert_eq!(results[0].errors.len(), 3);
    assert!(results[0].errors[2].contains("502"));
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/filings"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such region"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(vec![api_source("ca-sos", mock_server.uri())], &["ZZ"]);
    let service = IngestionService::from_config(&config).unwrap();

    let results = service.ingest(None).await;

    assert!(!results[0].success);
    assert_eq!(results[0].errors.len(), 1);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_body_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/filings"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&mock_server)
        .await;

    let config = PipelineConfig {
        circuit_failure_threshold: 1,
        ..create_test_config(vec![api_source("ca-sos", mock_server.uri())], &["CA"])
    };
    let service = IngestionService::from_config(&config).unwrap();

    let results = service.ingest(None).await;

    assert!(!results[0].success);
    assert_eq!(results[0].errors.len(), 1);
    assert!(results[0].errors[0].contains("Validation error"));
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
    // The source answered, so its breaker stays closed
    assert_eq!(
        service.circuit_state("ca-sos").unwrap().status,
        CircuitStatus::Closed
    );
}

#[tokio::test]
async fn test_rate_limited_response_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/filings"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/filings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "filings": [] })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(vec![api_source("ca-sos", mock_server.uri())], &["CA"]);
    let service = IngestionService::from_config(&config).unwrap();

    let results = service.ingest(None).await;

    assert!(results[0].success);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_open_circuit_fails_fast() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/filings"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let config = PipelineConfig {
        retry_attempts: 1,
        circuit_failure_threshold: 2,
        circuit_cooldown_ms: 60_000,
        ..create_test_config(vec![api_source("ca-sos", mock_server.uri())], &["CA"])
    };
    let service = IngestionService::from_config(&config).unwrap();

    service.ingest(None).await;
    service.ingest(None).await;
    assert_eq!(
        service.circuit_state("ca-sos").unwrap().status,
        CircuitStatus::Open
    );

    let results = service.ingest(None).await;

    assert!(!results[0].success);
    assert!(results[0].errors[0].contains("Circuit open"));
    // The third run never reached the server
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_portal_scrape() {
    let mock_server = MockServer::start().await;

    let html = r#"
        <table>
          <tr><th>Number</th><th>Debtor</th><th>Secured Party</th><th>Date</th></tr>
          <tr>
            <td>NY-778</td><td><a href="/d/1">Hudson Freight &amp; Logistics</a></td>
            <td>Empire Lending</td><td>2020-11-02</td><td>Lapsed</td><td>UCC-1</td><td>$80,000</td>
          </tr>
          <tr><td colspan="4">Page 1 of 1</td></tr>
        </table>
    "#;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("region", "NY"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&mock_server)
        .await;

    let portal = DataSource {
        id: "ny-portal".to_string(),
        name: "NY DOS portal".to_string(),
        kind: DataSourceKind::StatePortal,
        endpoint: Some(format!("{}/search", mock_server.uri())),
        credential: None,
        rate_limit_per_minute: 30,
    };
    let config = create_test_config(vec![portal], &["NY"]);
    let service = IngestionService::from_config(&config).unwrap();

    let results = service.ingest(None).await;

    assert!(results[0].success);
    assert_eq!(results[0].filings.len(), 1);
    let filing = &results[0].filings[0];
    assert_eq!(filing.id, "NY-778");
    assert_eq!(filing.debtor_name, "Hudson Freight & Logistics");
    assert_eq!(filing.status, FilingStatus::Lapsed);
    assert_eq!(filing.lien_amount, Some(80_000.0));
}

#[tokio::test]
async fn test_failing_source_does_not_affect_others() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/filings"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let database = DataSource {
        id: "ucc-db".to_string(),
        name: "UCC database".to_string(),
        kind: DataSourceKind::Database,
        endpoint: None,
        credential: None,
        rate_limit_per_minute: 60,
    };
    let config = create_test_config(
        vec![api_source("ca-sos", mock_server.uri()), database],
        &["CA", "TX"],
    );

    let clients = SourceClients::from_sources(&config.sources).unwrap();
    clients.store().insert(
        "tx",
        vec![RawFiling {
            id: Some("TX-1".into()),
            filing_date: Some("2022-01-10".into()),
            debtor_name: Some("Lone Star Construction".into()),
            ..Default::default()
        }],
    );
    let service = IngestionService::with_clients(&config, clients);

    let results = service.ingest(None).await;

    // 2 sources × 2 regions
    assert_eq!(results.len(), 4);
    let api_failures = results
        .iter()
        .filter(|r| r.metadata.source == "ca-sos" && !r.success)
        .count();
    assert_eq!(api_failures, 2);

    let db_results: Vec<_> = results
        .iter()
        .filter(|r| r.metadata.source == "ucc-db")
        .collect();
    assert!(db_results.iter().all(|r| r.success));
    assert_eq!(db_results.iter().map(|r| r.filings.len()).sum::<usize>(), 1);

    let stats = IngestionService::get_statistics(&results);
    assert_eq!(stats.total_records, 1);
    assert_eq!(stats.success_rate, 50.0);
    assert_eq!(stats.error_count, 6);
}

#[tokio::test]
async fn test_invalid_records_are_reported_not_fatal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/filings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "filingNumber": "A-1", "filingDate": "2021-01-01", "debtorName": "Acme" },
                { "filingNumber": "A-1", "filingDate": "2021-01-01", "debtorName": "Acme" },
                { "filingNumber": "A-2", "debtorName": "No Date Inc" },
                { "filingNumber": "A-3", "filingDate": "2021-01-01" }
            ]
        })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(vec![api_source("ca-sos", mock_server.uri())], &["CA"]);
    let service = IngestionService::from_config(&config).unwrap();

    let results = service.ingest(None).await;

    assert!(results[0].success);
    assert_eq!(results[0].filings.len(), 1);
    assert_eq!(results[0].errors.len(), 2);
}

#[tokio::test]
async fn test_find_lapsed_filings_filters_status_and_age() {
    let database = DataSource {
        id: "ucc-db".to_string(),
        name: "UCC database".to_string(),
        kind: DataSourceKind::Database,
        endpoint: None,
        credential: None,
        rate_limit_per_minute: 60,
    };
    let config = create_test_config(vec![database], &["CA"]);
    let clients = SourceClients::from_sources(&config.sources).unwrap();

    let today = chrono::Utc::now().date_naive();
    let days_ago = |d: i64| (today - chrono::Duration::days(d)).format("%Y-%m-%d").to_string();
    let record = |id: &str, age: i64, status: &str| RawFiling {
        id: Some(id.to_string()),
        filing_date: Some(days_ago(age)),
        debtor_name: Some(format!("Debtor {}", id)),
        status: Some(status.to_string()),
        ..Default::default()
    };
    clients.store().insert(
        "CA",
        vec![
            record("recent-lapsed", 100, "lapsed"),
            record("old-lapsed", 900, "lapsed"),
            record("recent-active", 50, "active"),
        ],
    );
    let service = IngestionService::with_clients(&config, clients);

    let lapsed = service.find_lapsed_filings(365).await;

    assert_eq!(lapsed.len(), 1);
    assert_eq!(lapsed[0].id, "recent-lapsed");
}
