//! Behavior tests for the Graph client against a simulated API.

use std::time::{Duration, Instant};

use graph_client::{GraphClient, GraphError};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> GraphClient {
    GraphClient::new()
        .with_base_url(server.uri())
        .with_authority_base(server.uri())
}

fn page_body(ids: &[&str], next_link: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "value": ids.iter().map(|id| serde_json::json!({"id": id})).collect::<Vec<_>>(),
    });
    if let Some(link) = next_link {
        body["@odata.nextLink"] = serde_json::Value::String(link.to_string());
    }
    body
}

#[tokio::test]
async fn fetch_returns_decoded_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auditLogs/signIns"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page_body(&["s1", "s2"], Some("next"))),
        )
        .mount(&server)
        .await;

    let graph = client_for(&server);
    let url = format!("{}/auditLogs/signIns", server.uri());
    let page = graph
        .fetch_signins_page(&url, "token", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.value.len(), 2);
    assert_eq!(page.next_link.as_deref(), Some("next"));
}

#[tokio::test]
async fn rate_limit_waits_for_retry_after_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auditLogs/signIns"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auditLogs/signIns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["s1"], None)))
        .expect(1)
        .mount(&server)
        .await;

    let graph = client_for(&server);
    let url = format!("{}/auditLogs/signIns", server.uri());

    let started = Instant::now();
    let page = graph
        .fetch_signins_page(&url, "token", &CancellationToken::new())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(page.value.len(), 1);
}

#[tokio::test]
async fn server_errors_exhaust_retries_after_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auditLogs/signIns"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let graph = client_for(&server);
    let url = format!("{}/auditLogs/signIns", server.uri());
    let err = graph
        .fetch_signins_page(&url, "token", &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        GraphError::RetriesExhausted {
            attempts,
            last_status,
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(last_status, 503);
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn client_errors_fail_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auditLogs/signIns"))
        .respond_with(ResponseTemplate::new(403).set_body_string("insufficient privileges"))
        .expect(1)
        .mount(&server)
        .await;

    let graph = client_for(&server);
    let url = format!("{}/auditLogs/signIns", server.uri());
    let err = graph
        .fetch_signins_page(&url, "token", &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        GraphError::Api { status, message } => {
            assert_eq!(status, 403);
            assert!(message.contains("insufficient privileges"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_resolves_backoff_wait_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auditLogs/signIns"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&server)
        .await;

    let graph = client_for(&server);
    let url = format!("{}/auditLogs/signIns", server.uri());
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = graph
        .fetch_signins_page(&url, "token", &cancel)
        .await
        .unwrap_err();

    assert!(err.is_aborted(), "expected Aborted, got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn pre_cancelled_token_skips_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&[], None)))
        .expect(0)
        .mount(&server)
        .await;

    let graph = client_for(&server);
    let url = format!("{}/auditLogs/signIns", server.uri());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = graph
        .fetch_signins_page(&url, "token", &cancel)
        .await
        .unwrap_err();
    assert!(err.is_aborted());
}

#[tokio::test]
async fn tokens_are_cached_per_tenant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-a/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "tok-a",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let graph = client_for(&server);
    let first = graph
        .acquire_token("tenant-a", "app", "secret")
        .await
        .unwrap();
    let second = graph
        .acquire_token("tenant-a", "app", "secret")
        .await
        .unwrap();

    assert_eq!(first, "tok-a");
    assert_eq!(second, "tok-a");
}

#[tokio::test]
async fn rejected_token_grant_surfaces_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-b/oauth2/v2.0/token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_client"}"#),
        )
        .mount(&server)
        .await;

    let graph = client_for(&server);
    let err = graph
        .acquire_token("tenant-b", "app", "bad-secret")
        .await
        .unwrap_err();

    match err {
        GraphError::Api { status, message } => {
            assert_eq!(status, 401);
            assert!(message.contains("invalid_client"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}
