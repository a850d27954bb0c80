use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use acestream_scraper::{
    config::{CheckerConfig, EngineConfig},
    models::Channel,
    repositories::{ChannelRepository, MemoryStore},
    status::{EngineClient, LivenessProbe, StatusChecker},
    utils::retry::RetryConfig,
};

#[derive(Default)]
struct MockEngine {
    active: AtomicUsize,
    peak: AtomicUsize,
    requests: AtomicUsize,
}

async fn getstream(
    State(engine): State<Arc<MockEngine>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let now = engine.active.fetch_add(1, Ordering::SeqCst) + 1;
    engine.peak.fetch_max(now, Ordering::SeqCst);
    engine.requests.fetch_add(1, Ordering::SeqCst);

    let id = params.get("id").cloned().unwrap_or_default();
    let delay = if id == "slow" { 2_000 } else { 25 };
    tokio::time::sleep(Duration::from_millis(delay)).await;
    engine.active.fetch_sub(1, Ordering::SeqCst);

    assert_eq!(params.get("format").map(String::as_str), Some("json"));
    assert_eq!(params.get("method").map(String::as_str), Some("get_status"));

    match id.as_str() {
        "down" => (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response(),
        "garbage" => (StatusCode::OK, "<html>not json</html>").into_response(),
        "quirk" => Json(json!({"response": null, "error": "got NEWER download available"}))
            .into_response(),
        "dead" => Json(json!({"response": {"is_live": 0}, "error": null})).into_response(),
        "broken" => Json(json!({"response": null, "error": "failed to load content"}))
            .into_response(),
        _ => Json(json!({"response": {"is_live": 1}, "error": null})).into_response(),
    }
}

async fn server_api(Query(params): Query<HashMap<String, String>>) -> Response {
    match params.get("method").map(String::as_str) {
        Some("get_status") => Json(json!({
            "result": {
                "version": {"version": "3.1.74", "platform": "linux"},
                "playlist_loaded": true
            }
        }))
        .into_response(),
        Some("get_network_connection_status") => {
            Json(json!({"result": {"connected": true}})).into_response()
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn spawn_engine() -> (SocketAddr, Arc<MockEngine>) {
    let engine = Arc::new(MockEngine::default());
    let app = Router::new()
        .route("/ace/getstream", get(getstream))
        .route("/server/api", get(server_api))
        .with_state(engine.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, engine)
}

fn client_for(addr: SocketAddr) -> EngineClient {
    EngineClient::new(&EngineConfig {
        url: format!("http://{addr}/"),
        probe_timeout: Duration::from_millis(500),
    })
    .unwrap()
}

async fn store_with(ids: &[&str]) -> (Arc<MemoryStore>, Vec<Channel>) {
    let store = Arc::new(MemoryStore::new());
    let channels: Vec<Channel> = ids
        .iter()
        .map(|id| Channel::new(*id, format!("Channel {id}")))
        .collect();
    for channel in &channels {
        store.insert_channel(channel.clone()).await;
    }
    (store, channels)
}

#[tokio::test]
async fn test_probe_classification_against_engine() {
    let (addr, _) = spawn_engine().await;
    let client = client_for(addr);

    let verdict = client.probe("live").await;
    assert!(verdict.is_online);
    assert_eq!(verdict.error, None);

    let verdict = client.probe("quirk").await;
    assert!(verdict.is_online);

    let verdict = client.probe("down").await;
    assert!(!verdict.is_online);
    assert_eq!(verdict.error.as_deref(), Some("HTTP 503"));

    let verdict = client.probe("dead").await;
    assert_eq!(verdict.error.as_deref(), Some("channel is not live"));

    let verdict = client.probe("broken").await;
    assert_eq!(verdict.error.as_deref(), Some("failed to load content"));

    let verdict = client.probe("garbage").await;
    assert!(verdict
        .error
        .unwrap()
        .starts_with("invalid response format"));
}

#[tokio::test]
async fn test_probe_timeout_is_offline() {
    let (addr, _) = spawn_engine().await;
    let verdict = client_for(addr).probe("slow").await;
    assert!(!verdict.is_online);
    assert!(verdict.error.is_some());
}

#[tokio::test]
async fn test_check_all_respects_concurrency_and_records_results() {
    let (addr, engine) = spawn_engine().await;
    let mut ids: Vec<String> = (0..40).map(|i| format!("live{i}")).collect();
    ids.extend(["down", "quirk", "dead"].map(String::from));
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let (store, channels) = store_with(&id_refs).await;

    let checker = StatusChecker::new(
        Arc::new(client_for(addr)),
        store.clone(),
        CheckerConfig {
            concurrency: 5,
            chunk_size: 20,
            chunk_pause: Duration::from_millis(10),
            interval: None,
        },
        RetryConfig::default(),
    );

    let summary = checker.check_all(&channels, &CancellationToken::new()).await;

    assert_eq!(summary.total, 43);
    assert_eq!(summary.online, 41);
    assert_eq!(summary.offline, 2);
    assert_eq!(summary.errors, 0);
    assert_eq!(engine.requests.load(Ordering::SeqCst), 43);
    assert!(engine.peak.load(Ordering::SeqCst) <= 5);

    let down = store.get_channel("down").await.unwrap().unwrap();
    assert_eq!(down.is_online, Some(false));
    assert_eq!(down.check_error.as_deref(), Some("HTTP 503"));
    assert!(down.last_checked.is_some());

    let quirk = store.get_channel("quirk").await.unwrap().unwrap();
    assert_eq!(quirk.is_online, Some(true));
    assert_eq!(quirk.check_error, None);
}

#[tokio::test]
async fn test_engine_status_online() {
    let (addr, _) = spawn_engine().await;
    let status = client_for(addr).engine_status().await;

    assert!(status.available);
    assert_eq!(status.message, "Acestream Engine v3.1.74 is online");
    assert_eq!(status.version.as_deref(), Some("3.1.74"));
    assert_eq!(status.platform.as_deref(), Some("linux"));
    assert_eq!(status.playlist_loaded, Some(true));
    assert_eq!(status.connected, Some(true));
}

#[tokio::test]
async fn test_engine_status_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let status = client_for(addr).engine_status().await;
    assert!(!status.available);
    assert!(status.message.contains("not responding properly"));
    assert_eq!(status.version, None);
}
