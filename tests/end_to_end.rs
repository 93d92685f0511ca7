//! End-to-end runs against mocked HTTP endpoints.
//!
//! A wiremock server plays both the feed host and the webhook; checkpoints
//! go to an in-memory SQLite database. Everything else is the production
//! wiring used by the binary.

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedrelay::engine::{Engine, EngineOptions, FeedOutcome};
use feedrelay::feed::HttpFeedSource;
use feedrelay::notify::{DiscordNotifier, DiscordOptions};
use feedrelay::storage::{decode_state, CheckpointStore, SqliteStore};
use feedrelay::transport::{RetryPolicy, TransportClient};

fn rss(items: &[(&str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(guid, date)| {
            format!(
                "<item><guid>{guid}</guid><title>Post {guid}</title>\
                 <link>https://blog.example/{guid}</link><pubDate>{date}</pubDate></item>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Blog</title>
<link>https://blog.example</link><description>d</description>{body}</channel></rss>"#
    )
}

fn transport() -> TransportClient {
    TransportClient::new(RetryPolicy {
        timeout: Duration::from_secs(2),
        retries: 1,
        delay: Duration::from_millis(10),
    })
}

async fn engine(server: &MockServer, store: SqliteStore) -> Engine {
    let notifier = DiscordNotifier::new(
        transport(),
        SecretString::from(format!("{}/webhook", server.uri())),
    )
    .with_error_webhook(SecretString::from(format!("{}/errors", server.uri())))
    .with_options(DiscordOptions {
        username: Some("feedrelay".to_string()),
        ..DiscordOptions::default()
    });

    Engine::new(
        Arc::new(store),
        Arc::new(HttpFeedSource::new(transport())),
        Arc::new(notifier),
        EngineOptions::default(),
    )
}

async fn webhook_titles(server: &MockServer) -> Vec<Vec<String>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/webhook")
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["embeds"]
                .as_array()
                .unwrap()
                .iter()
                .map(|e| e["title"].as_str().unwrap().to_string())
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn test_first_run_then_incremental_run() {
    let server = MockServer::start().await;
    let feed_url = format!("{}/feed.xml", server.uri());
    let store = SqliteStore::open(":memory:", "e2e").await.unwrap();

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss(&[
            ("2", "Mon, 02 Jan 2023 00:00:00 GMT"),
            ("1", "Sun, 01 Jan 2023 00:00:00 GMT"),
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss(&[
            ("4", "Wed, 04 Jan 2023 00:00:00 GMT"),
            ("3", "Tue, 03 Jan 2023 00:00:00 GMT"),
            ("2", "Mon, 02 Jan 2023 00:00:00 GMT"),
            ("1", "Sun, 01 Jan 2023 00:00:00 GMT"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let engine = engine(&server, store.clone()).await;

    let first = engine.run(&[feed_url.clone()]).await.unwrap();
    assert_eq!(
        first.outcome(&feed_url),
        Some(&FeedOutcome::Delivered { count: 1, deferred: 0, first_run: true })
    );

    let second = engine.run(&[feed_url.clone()]).await.unwrap();
    assert_eq!(second.delivered_count(), 2);

    assert_eq!(
        webhook_titles(&server).await,
        vec![
            vec!["Post 2".to_string()],
            vec!["Post 3".to_string(), "Post 4".to_string()],
        ]
    );

    let raw = store.load_raw().await.unwrap();
    let state = decode_state(raw.as_deref());
    assert_eq!(state.feeds[&feed_url].last_item_id.as_deref(), Some("4"));
    assert!(raw.unwrap().contains("\"lastCheckedAt\": \"2023-01-04T00:00:00.000Z\""));

    // Nothing new: third run sends nothing more
    engine.run(&[feed_url.clone()]).await.unwrap();
    assert_eq!(webhook_titles(&server).await.len(), 2);
}

#[tokio::test]
async fn test_broken_feed_reported_to_error_webhook() {
    let server = MockServer::start().await;
    let feed_url = format!("{}/missing.xml", server.uri());
    let store = SqliteStore::open(":memory:", "e2e").await.unwrap();

    Mock::given(method("GET"))
        .and(path("/missing.xml"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/errors"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let report = engine(&server, store.clone())
        .await
        .run(&[feed_url.clone()])
        .await
        .unwrap();

    assert_eq!(
        report.outcome(&feed_url),
        Some(&FeedOutcome::FetchFailed {
            reason: "HTTP request failed after 2 attempts: HTTP error 404: Not Found".to_string()
        })
    );

    let requests = server.received_requests().await.unwrap();
    let error_post = requests
        .iter()
        .find(|r| r.url.path() == "/errors")
        .unwrap();
    let body: Value = serde_json::from_slice(&error_post.body).unwrap();
    assert_eq!(body["embeds"][0]["title"], "Error: Feed Processing");
    assert_eq!(body["embeds"][0]["fields"][0]["value"], feed_url.as_str());

    // The run still saved a checkpoint
    let state = store.load().await.unwrap();
    assert!(state.feeds.is_empty());
    assert!(store.load_raw().await.unwrap().is_some());
}

#[tokio::test]
async fn test_webhook_outage_keeps_checkpoint_for_retry() {
    let server = MockServer::start().await;
    let feed_url = format!("{}/feed.xml", server.uri());
    let store = SqliteStore::open(":memory:", "e2e").await.unwrap();

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(rss(&[("1", "Sun, 01 Jan 2023 00:00:00 GMT")])),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/errors"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let engine = engine(&server, store.clone()).await;

    let first = engine.run(&[feed_url.clone()]).await.unwrap();
    assert!(matches!(
        first.outcome(&feed_url),
        Some(FeedOutcome::DeliveryFailed { .. })
    ));
    assert!(store.load().await.unwrap().feeds.is_empty());

    // Webhook is back: the same item is retried as a first run
    let second = engine.run(&[feed_url.clone()]).await.unwrap();
    assert_eq!(second.delivered_count(), 1);
    assert_eq!(
        store.load().await.unwrap().feeds[&feed_url].last_item_id.as_deref(),
        Some("1")
    );
}
