/// Integration tests for the HTTP surface
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use futures::StreamExt;
use power_logger::{
    config::{LiveConfig, QueryConfig, StoreConfig},
    handlers::AppState,
    live::LiveFeed,
    logger::DataLogger,
    record::Record,
    scheduler::FlushTrigger,
    server::create_router,
    store::{LogStore, TimeRange},
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    logger: Arc<DataLogger>,
    _dir: tempfile::TempDir,
}

async fn test_app_with(setup: impl FnOnce(&Path)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());

    let store = Arc::new(LogStore::new(&StoreConfig {
        path: dir.path().join("power.db"),
        query_lock_timeout_secs: 0,
        ..StoreConfig::default()
    }));
    store.recover().await;

    let logger = Arc::new(DataLogger::new(
        store,
        Arc::new(LiveFeed::new(3, 16)),
        FlushTrigger::new(),
        Some(dir.path().join("state.json")),
        true,
        1,
    ));
    let (shutdown, _) = broadcast::channel(1);
    let state = AppState {
        logger: logger.clone(),
        query: QueryConfig {
            pad_chunks: false,
            ..QueryConfig::default()
        },
        live: LiveConfig::default(),
        shutdown,
    };

    TestApp {
        router: create_router(state, None),
        logger,
        _dir: dir,
    }
}

async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

async fn send(app: &TestApp, method: &str, uri: &str) -> (StatusCode, String) {
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn log_samples(app: &TestApp) {
    app.logger.add_record(Record::new(100, 1.5, 220000.0), true);
    app.logger.add_record(Record::new(160, 2.0, 219000.0), true);
    app.logger.store().flush().await.unwrap();
}

#[tokio::test]
async fn test_data_without_file_is_empty_array() {
    let app = test_app().await;

    let (status, body) = send(&app, "GET", "/data?from=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
    assert!(!app.logger.store().exists());
}

#[tokio::test]
async fn test_data_streams_rows() {
    let app = test_app().await;
    log_samples(&app).await;

    let (status, body) = send(&app, "GET", "/data?from=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[[100,1.5,220000.0],[160,2.0,219000.0]]");

    let (_, body) = send(&app, "GET", "/data?from=150").await;
    assert_eq!(body, "[[160,2.0,219000.0]]");

    let (_, body) = send(&app, "GET", "/data?from=0&until=150").await;
    assert_eq!(body, "[[100,1.5,220000.0]]");
}

#[tokio::test]
async fn test_data_default_window_skips_old_rows() {
    let app = test_app().await;
    log_samples(&app).await;

    // both rows are far older than the default one-hour window
    let (status, body) = send(&app, "GET", "/data").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

#[tokio::test]
async fn test_data_rejects_malformed_range() {
    let app = test_app().await;

    let (status, body) = send(&app, "GET", "/data?from=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"]["type"], "bad_request");
}

#[tokio::test]
async fn test_data_on_corrupt_file_is_500() {
    let app = test_app_with(|dir| std::fs::write(dir.join("power.db"), b"not a log").unwrap()).await;

    let (status, body) = send(&app, "GET", "/data?from=0").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"]["type"], "inaccessible");
}

#[tokio::test]
async fn test_data_lock_timeout_is_500() {
    let app = test_app().await;
    log_samples(&app).await;

    let held = app.logger.store().query(TimeRange::default()).await.unwrap();
    let (status, body) = send(&app, "GET", "/data?from=0").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"]["type"], "lock_timeout");

    drop(held);
    let (status, _) = send(&app, "GET", "/data?from=0").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_status_and_controls() {
    let app = test_app().await;
    app.logger.observe(Record::new(42, 1.0, 2.0));

    let (status, body) = send(&app, "GET", "/status").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["logging_enabled"], true);
    assert_eq!(json["queue_depth"], 1);
    assert_eq!(json["latest"]["timestamp"], 42);

    let (status, body) = send(&app, "POST", "/control/logging").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"logging_enabled\":false"));

    let (status, _) = send(&app, "POST", "/control/flush").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    app.logger.store().flush().await.unwrap();
    assert!(app.logger.store().exists());
    let (status, _) = send(&app, "POST", "/control/reset").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.logger.store().exists());
}

#[tokio::test]
async fn test_health_and_heap() {
    let app = test_app().await;

    let (status, _) = send(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", "/heap").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("resident_bytes"));
}

#[tokio::test]
async fn test_events_replay_then_live() {
    let app = test_app().await;
    for ts in 0..5 {
        app.logger.add_record(Record::new(ts, 0.5, 1.0), true);
    }

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/dataevents").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    app.logger.add_record(Record::new(5, 0.5, 1.0), false);

    let mut received = String::new();
    while received.matches("data: ").count() < 4 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        received.push_str(&String::from_utf8_lossy(&chunk));
    }

    // the ring holds the last three, then the live row follows
    let rows: Vec<&str> = received
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .collect();
    assert_eq!(rows, vec!["[2,0.5,1.0]", "[3,0.5,1.0]", "[4,0.5,1.0]", "[5,0.5,1.0]"]);
}
