//! Webhook dispatcher tests: signed delivery, endpoint filtering, and
//! per-endpoint failure isolation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mockito::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

use paygrid_core::adapters::memory::{
    InMemorySequence, InMemoryTenantDirectory, InMemoryTransactionStore,
};
use paygrid_core::clock::SystemClock;
use paygrid_core::domain::event::{EventType, LifecycleEvent};
use paygrid_core::domain::tenant::{Tenant, WebhookEndpoint};
use paygrid_core::ports::TenantDirectory;
use paygrid_core::services::{run_dispatcher, TransactionLifecycle, WebhookDispatcher};
use paygrid_core::signing;

fn sample_event(tenant_id: Uuid) -> LifecycleEvent {
    LifecycleEvent {
        event_type: EventType::Created,
        transaction_id: Uuid::new_v4(),
        tenant_id,
        data: serde_json::json!({ "amount": 1000 }),
        timestamp: Utc::now(),
    }
}

async fn register_endpoint(
    directory: &InMemoryTenantDirectory,
    tenant_id: Uuid,
    url: &str,
    events: Vec<&str>,
    secret: &str,
) -> WebhookEndpoint {
    let endpoint = WebhookEndpoint::new(
        tenant_id,
        url.to_string(),
        events.into_iter().map(String::from).collect(),
        secret.to_string(),
        Utc::now(),
    );
    directory.insert_endpoint(&endpoint).await.unwrap()
}

/// Reserve a port and release it, so connecting to it is refused.
fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/gone", addr)
}

/// Accept one HTTP request, return its headers (lowercased names) and body,
/// and answer 200.
async fn capture_one_request(listener: TcpListener) -> (HashMap<String, String>, Vec<u8>) {
    let (mut stream, _) = listener.accept().await.expect("accept");
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.expect("read");
        assert!(n > 0, "connection closed before headers were complete");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let header_text = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut headers = HashMap::new();
    for line in header_text.lines().skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.expect("read body");
        assert!(n > 0, "connection closed before body was complete");
        body.extend_from_slice(&chunk[..n]);
    }

    stream
        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
        .await
        .expect("write response");

    (headers, body)
}

#[tokio::test]
async fn delivery_carries_a_verifiable_signature_over_the_exact_body() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let capture = tokio::spawn(capture_one_request(listener));

    let directory = Arc::new(InMemoryTenantDirectory::new());
    let tenant_id = Uuid::new_v4();
    register_endpoint(
        &directory,
        tenant_id,
        &format!("http://{}/hooks", addr),
        vec!["transaction.created"],
        "ep-secret",
    )
    .await;

    let dispatcher =
        WebhookDispatcher::new(directory, Arc::new(SystemClock), Duration::from_secs(2));
    let outcomes = dispatcher.dispatch(&sample_event(tenant_id)).await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].result, Ok(200));

    let (headers, body) = capture.await.unwrap();
    let signature = headers
        .get("x-webhook-signature")
        .expect("signature header present");
    assert!(signing::verify("ep-secret", &body, signature));

    let envelope: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(envelope["event"], "transaction.created");
    assert_eq!(envelope["data"]["amount"], 1000);
    assert!(envelope["sent_at"].is_string());
}

#[tokio::test]
async fn one_unreachable_endpoint_does_not_affect_the_other() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/ok")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let directory = Arc::new(InMemoryTenantDirectory::new());
    let tenant_id = Uuid::new_v4();
    register_endpoint(
        &directory,
        tenant_id,
        &format!("{}/ok", server.url()),
        vec!["transaction.created"],
        "good-secret",
    )
    .await;
    register_endpoint(
        &directory,
        tenant_id,
        &unreachable_url(),
        vec!["transaction.created"],
        "other-secret",
    )
    .await;

    let dispatcher =
        WebhookDispatcher::new(directory, Arc::new(SystemClock), Duration::from_secs(2));
    let outcomes = dispatcher.dispatch(&sample_event(tenant_id)).await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes.iter().filter(|o| o.result.is_ok()).count(), 1);
    assert_eq!(outcomes.iter().filter(|o| o.result.is_err()).count(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn inactive_and_unsubscribed_endpoints_are_skipped() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/never")
        .expect(0)
        .create_async()
        .await;
    let url = format!("{}/never", server.url());

    let directory = Arc::new(InMemoryTenantDirectory::new());
    let tenant_id = Uuid::new_v4();

    let mut disabled = WebhookEndpoint::new(
        tenant_id,
        url.clone(),
        vec!["transaction.created".to_string()],
        "s1".to_string(),
        Utc::now(),
    );
    disabled.active = false;
    directory.insert_endpoint(&disabled).await.unwrap();

    register_endpoint(
        &directory,
        tenant_id,
        &url,
        vec!["transaction.confirmed"],
        "s2",
    )
    .await;

    let dispatcher =
        WebhookDispatcher::new(directory, Arc::new(SystemClock), Duration::from_secs(2));
    let outcomes = dispatcher.dispatch(&sample_event(tenant_id)).await;

    assert!(outcomes.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn a_slow_endpoint_times_out_as_a_delivery_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        let _ = stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
            .await;
    });

    let directory = Arc::new(InMemoryTenantDirectory::new());
    let tenant_id = Uuid::new_v4();
    register_endpoint(
        &directory,
        tenant_id,
        &format!("http://{}/slow", addr),
        vec!["transaction.created"],
        "s",
    )
    .await;

    let dispatcher = WebhookDispatcher::new(
        directory,
        Arc::new(SystemClock),
        Duration::from_millis(200),
    );

    let start = std::time::Instant::now();
    let outcomes = dispatcher.dispatch(&sample_event(tenant_id)).await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].result.is_err());
    // The client timed out; it did not wait for the server's late answer.
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn create_succeeds_and_fans_out_despite_a_dead_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let capture = tokio::spawn(capture_one_request(listener));

    let store = Arc::new(InMemoryTransactionStore::new());
    let sequences = Arc::new(InMemorySequence::new());
    let directory = Arc::new(InMemoryTenantDirectory::new());
    let tenant_id = Uuid::new_v4();
    directory
        .insert_tenant(Tenant {
            id: tenant_id,
            name: "Acme Coffee".to_string(),
            signing_secret: "tenant-key".to_string(),
        })
        .await;
    register_endpoint(
        &directory,
        tenant_id,
        &format!("http://{}/hooks", addr),
        vec!["transaction.created"],
        "ep-secret",
    )
    .await;
    register_endpoint(
        &directory,
        tenant_id,
        &unreachable_url(),
        vec!["transaction.created"],
        "dead-secret",
    )
    .await;

    let (events, _) = broadcast::channel(64);
    let lifecycle = Arc::new(TransactionLifecycle::new(
        store,
        sequences,
        directory.clone(),
        Arc::new(SystemClock),
        events.clone(),
    ));
    let dispatcher = Arc::new(WebhookDispatcher::new(
        directory.clone(),
        Arc::new(SystemClock),
        Duration::from_secs(2),
    ));
    tokio::spawn(run_dispatcher(events.subscribe(), dispatcher));

    // The dead endpoint must not affect the create call itself.
    let created = lifecycle
        .create(tenant_id, Uuid::new_v4(), "ORD-1", 1000, Some(5))
        .await
        .unwrap();

    let (headers, body) = tokio::time::timeout(Duration::from_secs(5), capture)
        .await
        .expect("delivery arrived")
        .unwrap();
    let signature = headers.get("x-webhook-signature").unwrap();
    assert!(signing::verify("ep-secret", &body, signature));

    let envelope: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(envelope["event"], "transaction.created");
    assert_eq!(
        envelope["data"]["id"],
        serde_json::json!(created.transaction.id)
    );
    assert_eq!(envelope["data"]["no"], 1);
}
