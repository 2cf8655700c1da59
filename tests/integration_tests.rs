// Integration tests: HTTP endpoints

use axum_test::TestServer;
use phpfpm_log_exporter::config::AppConfig;
use phpfpm_log_exporter::ingest::IngestLoop;
use phpfpm_log_exporter::metrics::MetricsAggregator;
use phpfpm_log_exporter::routes;
use std::sync::Arc;

fn test_app(config: AppConfig) -> (axum::Router, Arc<MetricsAggregator>) {
    let aggregator = Arc::new(MetricsAggregator::new().unwrap());
    let app = routes::app(aggregator.clone(), config);
    (app, aggregator)
}

#[tokio::test]
async fn test_root_endpoint_links_metrics() {
    let (app, _) = test_app(AppConfig::default());
    let server = TestServer::new(app);
    let response = server.get("/").await;
    response.assert_status_ok();
    assert!(response.text().contains("href=\"/metrics\""));
}

#[tokio::test]
async fn test_version_endpoint() {
    let (app, _) = test_app(AppConfig::default());
    let server = TestServer::new(app);
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(
        json.get("name").and_then(|v| v.as_str()),
        Some("phpfpm-log-exporter")
    );
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_metrics_endpoint_reflects_ingested_lines() {
    let (app, aggregator) = test_app(AppConfig::default());
    let ingest = IngestLoop::new(aggregator, false);
    ingest
        .process("10:00:00 reqid 12.5% 1048576 0.023 200 GET /index.php")
        .unwrap();
    ingest
        .process("10:00:01 reqid 1.5% 2048 0.5 404 POST /login.php")
        .unwrap();
    let _ = ingest.process("a b c d e 999 GET f");

    let server = TestServer::new(app);
    let response = server.get("/metrics").await;
    response.assert_status_ok();
    let content_type = response.header("content-type");
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));

    let body = response.text();
    assert!(body.contains("# TYPE phpfpm_requests_cpu summary"));
    assert!(body.contains("phpfpm_requests_cpu_count 2"));
    assert!(body.contains("phpfpm_requests_cpu_sum 14\n"));
    assert!(body.contains("phpfpm_requests_cpu{quantile=\"0.99\"} 12.5\n"));
    assert!(body.contains("phpfpm_requests_total{code=\"200\",method=\"GET\"} 1"));
    assert!(body.contains("phpfpm_requests_total{code=\"404\",method=\"POST\"} 1"));
    assert!(body.contains("phpfpm_log_lines_rejected_total{reason=\"cpu\"} 1"));
}

#[tokio::test]
async fn test_custom_metrics_path() {
    let config = AppConfig::load_from_str("[server]\nmetrics_path = \"/stats\"\n").unwrap();
    let (app, _) = test_app(config);
    let server = TestServer::new(app);
    server.get("/stats").await.assert_status_ok();
    server.get("/metrics").await.assert_status_not_found();
}
