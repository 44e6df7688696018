//! Sign-in extraction session: drives the page fetcher across all pages for
//! one client/credential pair within a date window.
//!
//! Cooperative cancellation is not an error here: a session that stops at a
//! checkpoint returns the totals it reached, and the orchestrator decides
//! what that means for the item. Only fetch and storage failures propagate.

use chrono::{DateTime, Utc};
use graph_client::{GraphClient, GraphError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use crate::common::{ClientId, JobItemId};
use crate::kernel::events::{AppEvent, EventPublisher};

use super::models::sign_in_event::NewSignInEvent;
use super::store::JobStore;

pub const DEFAULT_PAGE_SIZE: u32 = 500;

#[derive(TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct ExtractionParams<'a> {
    pub tenant_id: &'a str,
    pub app_id: &'a str,
    pub client_secret: &'a str,
    pub client_id: ClientId,
    pub job_item_id: JobItemId,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    #[builder(default = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub total_records: u64,
    pub pages_processed: u32,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("failed to persist sign-in batch: {0}")]
    Storage(#[source] anyhow::Error),
}

impl ExtractionError {
    /// Whether this is the cooperative-cancellation condition observed
    /// inside an in-flight fetch.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ExtractionError::Graph(e) if e.is_aborted())
    }
}

/// Extract all sign-in pages for one credential within the date window,
/// persisting every page and emitting cumulative progress after each one.
pub async fn extract_sign_ins(
    params: &ExtractionParams<'_>,
    graph: &GraphClient,
    store: &dyn JobStore,
    events: &dyn EventPublisher,
    cancel: &CancellationToken,
) -> Result<ExtractionOutcome, ExtractionError> {
    let token = graph
        .acquire_token(params.tenant_id, params.app_id, params.client_secret)
        .await?;

    let mut next_link = Some(graph.signins_url(params.date_from, params.date_to, params.page_size));
    let mut total_records = 0u64;
    let mut pages_processed = 0u32;

    while let Some(url) = next_link {
        if cancel.is_cancelled() {
            tracing::info!(
                client_id = %params.client_id,
                job_item_id = %params.job_item_id,
                "extraction cancelled between pages"
            );
            break;
        }

        let page = graph.fetch_signins_page(&url, &token, cancel).await?;

        if !page.value.is_empty() {
            let rows: Vec<NewSignInEvent> = page
                .value
                .iter()
                .map(|record| {
                    NewSignInEvent::from_remote(record, params.client_id, params.job_item_id)
                })
                .collect();
            total_records += rows.len() as u64;
            store
                .insert_sign_ins(rows)
                .await
                .map_err(ExtractionError::Storage)?;
        }

        pages_processed += 1;
        next_link = page.next_link;

        events.publish(AppEvent::ItemProgress {
            job_item_id: params.job_item_id,
            client_id: params.client_id,
            records_fetched: total_records,
            pages_processed,
        });
    }

    tracing::info!(
        client_id = %params.client_id,
        total_records,
        pages_processed,
        "extraction finished"
    );

    Ok(ExtractionOutcome {
        total_records,
        pages_processed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::jobs::testing::InMemoryJobStore;
    use crate::kernel::events::RecordingPublisher;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn records(n: usize) -> Vec<serde_json::Value> {
        (0..n)
            .map(|i| serde_json::json!({"id": format!("signin-{i}"), "userPrincipalName": "u@x.com"}))
            .collect()
    }

    async fn mock_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "expires_in": 3600,
            })))
            .mount(server)
            .await;
    }

    fn params(client_id: ClientId, job_item_id: JobItemId) -> ExtractionParams<'static> {
        ExtractionParams::builder()
            .tenant_id("tenant")
            .app_id("app")
            .client_secret("secret")
            .client_id(client_id)
            .job_item_id(job_item_id)
            .date_from("2026-07-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap())
            .date_to("2026-07-08T00:00:00Z".parse::<DateTime<Utc>>().unwrap())
            .build()
    }

    #[tokio::test]
    async fn pages_are_followed_and_totals_accumulate() {
        let server = MockServer::start().await;
        mock_token(&server).await;

        let second_url = format!("{}/auditLogs/signIns?page=2", server.uri());
        Mock::given(method("GET"))
            .and(path("/auditLogs/signIns"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": records(2),
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auditLogs/signIns"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "@odata.nextLink": second_url,
                "value": records(3),
            })))
            .mount(&server)
            .await;

        let graph = GraphClient::new()
            .with_base_url(server.uri())
            .with_authority_base(server.uri());
        let store = InMemoryJobStore::new();
        let events = RecordingPublisher::new();
        let client_id = ClientId::new();
        let item_id = JobItemId::new();

        let outcome = extract_sign_ins(
            &params(client_id, item_id),
            &graph,
            &store,
            &events,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.total_records, 5);
        assert_eq!(outcome.pages_processed, 2);
        assert_eq!(store.sign_in_count_for_item(item_id), 5);

        // Progress is emitted after every page with cumulative counts.
        let progress: Vec<(u64, u32)> = events
            .events()
            .into_iter()
            .filter_map(|e| match e {
                AppEvent::ItemProgress {
                    records_fetched,
                    pages_processed,
                    ..
                } => Some((records_fetched, pages_processed)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(3, 1), (5, 2)]);
    }

    #[tokio::test]
    async fn empty_pages_still_emit_progress() {
        let server = MockServer::start().await;
        mock_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/auditLogs/signIns"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})),
            )
            .mount(&server)
            .await;

        let graph = GraphClient::new()
            .with_base_url(server.uri())
            .with_authority_base(server.uri());
        let store = InMemoryJobStore::new();
        let events = RecordingPublisher::new();
        let item_id = JobItemId::new();

        let outcome = extract_sign_ins(
            &params(ClientId::new(), item_id),
            &graph,
            &store,
            &events,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.total_records, 0);
        assert_eq!(outcome.pages_processed, 1);
        assert_eq!(events.kinds(), vec!["job:item:progress"]);
        assert_eq!(store.sign_in_count_for_item(item_id), 0);
    }

    #[tokio::test]
    async fn pre_cancelled_session_stops_without_error() {
        let server = MockServer::start().await;
        mock_token(&server).await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": records(1)})),
            )
            .expect(0)
            .mount(&server)
            .await;

        let graph = GraphClient::new()
            .with_base_url(server.uri())
            .with_authority_base(server.uri());
        let store = InMemoryJobStore::new();
        let events = RecordingPublisher::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = extract_sign_ins(
            &params(ClientId::new(), JobItemId::new()),
            &graph,
            &store,
            &events,
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(outcome.total_records, 0);
        assert_eq!(outcome.pages_processed, 0);
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn remote_client_error_propagates_and_is_not_aborted() {
        let server = MockServer::start().await;
        mock_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/auditLogs/signIns"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let graph = GraphClient::new()
            .with_base_url(server.uri())
            .with_authority_base(server.uri());
        let store = InMemoryJobStore::new();
        let events = RecordingPublisher::new();

        let err = extract_sign_ins(
            &params(ClientId::new(), JobItemId::new()),
            &graph,
            &store,
            &events,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(!err.is_aborted());
        assert!(err.to_string().contains("403"));
    }
}
