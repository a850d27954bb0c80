use axum::{http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use acestream_scraper::{
    config::EpgConfig,
    epg::EpgService,
    models::Channel,
    repositories::{
        ChannelRepository, EpgSourceRepository, MemoryStore, PatternMappingRepository,
        Repositories,
    },
    utils::retry::RetryConfig,
};

const GUIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="espn.us"><display-name>ESPN</display-name></channel>
  <channel id="espn2.us">
    <display-name>ESPN 2</display-name>
    <icon src="http://logos/espn2.png"/>
  </channel>
  <channel id="skysports.main"><display-name>Sky Sports Main Event</display-name></channel>
  <programme channel="espn.us" start="20240501120000 +0000"><title>News</title></programme>
</tv>"#;

async fn guide() -> &'static str {
    tokio::time::sleep(Duration::from_millis(50)).await;
    GUIDE
}

async fn spawn_feeds() -> SocketAddr {
    let app = Router::new()
        .route("/guide.xml", get(guide))
        .route("/missing.xml", get(|| async { StatusCode::NOT_FOUND }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 1,
        backoff: Duration::from_millis(1),
    }
}

fn epg_config() -> EpgConfig {
    EpgConfig {
        fetch_timeout: Duration::from_secs(5),
        ..EpgConfig::default()
    }
}

fn service_for(store: Arc<MemoryStore>) -> EpgService {
    EpgService::new(Repositories::from_store(store), epg_config(), retry()).unwrap()
}

async fn seeded_store(addr: SocketAddr, with_missing_feed: bool) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .add_epg_source(&format!("http://{addr}/guide.xml"), Some("Guide"))
        .await
        .unwrap();
    if with_missing_feed {
        store
            .add_epg_source(&format!("http://{addr}/missing.xml"), None)
            .await
            .unwrap();
    }

    store.add_pattern_mapping("ESPN", Some("espn.us")).await.unwrap();
    store.add_pattern_mapping("ESPN 2", Some("espn2.us")).await.unwrap();
    store.add_pattern_mapping("!Adult", None).await.unwrap();

    store.insert_channel(Channel::new("c1", "ESPN 2 HD")).await;
    store
        .insert_channel(Channel::new("c2", "Sky Sports Main Event HD"))
        .await;

    let mut adult = Channel::new("c3", "Adult Channel");
    adult.tvg_id = Some("adult.tv".to_string());
    store.insert_channel(adult).await;

    let mut locked = Channel::new("c4", "Locked ESPN");
    locked.tvg_id = Some("keep".to_string());
    locked.epg_update_protected = true;
    store.insert_channel(locked).await;

    store.insert_channel(Channel::new("c5", "Zzqx Random")).await;
    store
}

#[tokio::test]
async fn test_refresh_reconciles_channels_and_records_feed_state() {
    let addr = spawn_feeds().await;
    let store = seeded_store(addr, true).await;
    let service = service_for(store.clone());

    let report = service.refresh().await.unwrap().unwrap();
    assert_eq!(report.feeds_ok, 1);
    assert_eq!(report.feeds_failed, 1);
    assert_eq!(report.entries, 3);

    let stats = report.stats.unwrap();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.updated, 2);
    assert_eq!(stats.excluded, 1);
    assert_eq!(stats.locked, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.errors, 0);

    let espn2 = store.get_channel("c1").await.unwrap().unwrap();
    assert_eq!(espn2.tvg_id.as_deref(), Some("espn2.us"));
    assert_eq!(espn2.tvg_name.as_deref(), Some("ESPN 2"));
    assert_eq!(espn2.logo.as_deref(), Some("http://logos/espn2.png"));

    let sky = store.get_channel("c2").await.unwrap().unwrap();
    assert_eq!(sky.tvg_id.as_deref(), Some("skysports.main"));

    let adult = store.get_channel("c3").await.unwrap().unwrap();
    assert_eq!(adult.tvg_id, None);
    assert_eq!(adult.tvg_name, None);
    assert_eq!(adult.logo, None);

    let locked = store.get_channel("c4").await.unwrap().unwrap();
    assert_eq!(locked.tvg_id.as_deref(), Some("keep"));

    let feeds = store.list_enabled_epg_sources().await.unwrap();
    let ok = feeds.iter().find(|f| f.url.ends_with("guide.xml")).unwrap();
    assert_eq!(ok.error_count, 0);
    assert!(ok.last_updated.is_some());
    let failed = feeds.iter().find(|f| f.url.ends_with("missing.xml")).unwrap();
    assert_eq!(failed.error_count, 1);
    assert_eq!(failed.last_error.as_deref(), Some("HTTP error 404"));

    // A second pass over unchanged inputs changes nothing
    let stats = service.refresh().await.unwrap().unwrap().stats.unwrap();
    assert_eq!(stats.updated, 0);
    assert_eq!(stats.unchanged, 2);
}

#[tokio::test]
async fn test_failed_commit_leaves_channels_untouched() {
    let addr = spawn_feeds().await;
    let store = seeded_store(addr, false).await;
    let service = service_for(store.clone());

    // First failing write is the feed bookkeeping, second the EPG commit
    store.fail_next_writes(2).await;
    assert!(service.refresh().await.is_err());

    let espn2 = store.get_channel("c1").await.unwrap().unwrap();
    assert_eq!(espn2.tvg_id, None);
    let adult = store.get_channel("c3").await.unwrap().unwrap();
    assert_eq!(adult.tvg_id.as_deref(), Some("adult.tv"));
    assert!(!service.is_running());
}

#[tokio::test]
async fn test_refresh_is_single_flight() {
    let addr = spawn_feeds().await;
    let store = seeded_store(addr, false).await;
    let service = service_for(store);

    let (first, second) = tokio::join!(service.refresh(), service.refresh());
    assert!(first.unwrap().is_some());
    assert!(second.unwrap().is_none());
}

#[tokio::test]
async fn test_lock_blocks_reconcile_until_unlocked() {
    let addr = spawn_feeds().await;
    let store = seeded_store(addr, false).await;
    let service = service_for(store.clone());

    service.set_protection("c1", true).await.unwrap();
    service.refresh().await.unwrap();
    assert_eq!(store.get_channel("c1").await.unwrap().unwrap().tvg_id, None);

    service.set_protection("c1", false).await.unwrap();
    service.refresh().await.unwrap();
    assert_eq!(
        store.get_channel("c1").await.unwrap().unwrap().tvg_id.as_deref(),
        Some("espn2.us")
    );

    let suggestions = service.suggest(3).await.unwrap();
    let sky = suggestions.iter().find(|s| s.channel_id == "c2").unwrap();
    assert_eq!(sky.candidates[0].epg_id, "skysports.main");
    assert!(suggestions.iter().all(|s| s.channel_id != "c4"));
}

#[tokio::test]
async fn test_suggest_leaves_feed_records_alone() {
    let addr = spawn_feeds().await;
    let store = seeded_store(addr, true).await;
    let service = service_for(store.clone());

    let before = store.list_enabled_epg_sources().await.unwrap();
    let suggestions = service.suggest(3).await.unwrap();
    assert!(suggestions.iter().any(|s| s.channel_id == "c2"));

    let after = store.list_enabled_epg_sources().await.unwrap();
    assert_eq!(after, before);
    assert!(after.iter().all(|f| f.last_updated.is_none()));
    assert!(after.iter().all(|f| f.error_count == 0 && f.last_error.is_none()));
}
