use pretty_assertions::assert_eq;
use qlog_inspector::diagnostics::{bind, serve, HealthResponse};
use qlog_inspector::pipeline::{RunStats, StatsSnapshot};
use std::io;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type Server = (String, CancellationToken, JoinHandle<io::Result<()>>);

async fn start(stats: Arc<RunStats>) -> Server {
    let listener = bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(serve(listener, stats, shutdown.clone()));
    (base, shutdown, handle)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (base, shutdown, handle) = start(Arc::new(RunStats::new())).await;

    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let health: HealthResponse = response.json().await.unwrap();
    assert_eq!(
        health,
        HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    );

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stats_endpoint_reflects_run() {
    let stats = Arc::new(RunStats::new());
    {
        let _guard = stats.enter();
        stats.record_success(12, 2);
    }
    {
        let _guard = stats.enter();
        stats.record_failure();
    }
    let (base, shutdown, handle) = start(Arc::clone(&stats)).await;

    let body: serde_json::Value = reqwest::get(format!("{}/stats", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["files_started"], 2);
    assert_eq!(body["files_succeeded"], 1);
    assert_eq!(body["files_failed"], 1);
    assert_eq!(body["events"], 12);
    assert_eq!(body["anomalies"], 2);
    assert_eq!(body["in_flight"], 0);
    assert_eq!(body["peak_in_flight"], 1);

    let expected: StatsSnapshot = stats.snapshot();
    assert_eq!(expected.peak_in_flight, 1);

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (base, shutdown, handle) = start(Arc::new(RunStats::new())).await;

    let response = reqwest::get(format!("{}/debug/pprof", base)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}
