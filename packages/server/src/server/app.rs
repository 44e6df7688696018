//! Application setup and server configuration.

use std::sync::Arc;

use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use axum::routing::{get, patch, post, put};
use axum::{extract::Extension, Router};
use graph_client::GraphClient;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::domains::jobs::{JobOrchestrator, PostgresJobStore};
use crate::domains::settings::SettingsService;
use crate::kernel::events::EventPublisher;
use crate::kernel::stream_hub::EventHub;
use crate::server::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub hub: EventHub,
    pub orchestrator: Arc<JobOrchestrator>,
    pub graph: Arc<GraphClient>,
    pub settings: Arc<SettingsService>,
}

/// Build the Axum application router.
///
/// Wires the orchestrator to its store, the Graph client, and the event
/// hub, and spawns the single job worker. Must be called inside a Tokio
/// runtime.
pub fn build_app(pool: PgPool) -> Router {
    let hub = EventHub::new();
    let graph = Arc::new(GraphClient::new());
    let settings = Arc::new(SettingsService::new(pool.clone()));
    let store = Arc::new(PostgresJobStore::new(pool.clone()));
    let events: Arc<dyn EventPublisher> = Arc::new(hub.clone());

    let (orchestrator, worker) =
        JobOrchestrator::new(store, graph.clone(), events, settings.clone());
    tokio::spawn(worker.run(CancellationToken::new()));

    let state = AppState {
        db_pool: pool,
        hub,
        orchestrator,
        graph,
        settings,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([CONTENT_TYPE]);

    let api = Router::new()
        // Jobs
        .route("/jobs", get(routes::jobs::list_jobs).post(routes::jobs::start_job))
        .route("/jobs/status", get(routes::jobs::job_status))
        .route("/jobs/{id}", get(routes::jobs::job_detail))
        .route("/jobs/{id}/cancel", post(routes::jobs::cancel_job))
        .route("/jobs/{id}/export", post(routes::jobs::export_job))
        // Roster
        .route(
            "/clients",
            get(routes::clients::list_clients).post(routes::clients::create_client),
        )
        .route("/clients/{id}", patch(routes::clients::set_client_active))
        .route(
            "/credentials",
            get(routes::credentials::list_credentials).post(routes::credentials::create_credential),
        )
        .route(
            "/credentials/{id}/graph-config",
            put(routes::credentials::set_graph_config),
        )
        // Settings
        .route("/settings", get(routes::settings::list_settings))
        .route("/settings/resolved", get(routes::settings::resolved_settings))
        .route(
            "/settings/{key}",
            put(routes::settings::put_setting).delete(routes::settings::delete_setting),
        )
        // Remote API diagnostics
        .route("/graph/test-connection", post(routes::graph::test_connection))
        .route("/prechecks", get(routes::prechecks::latest_prechecks))
        .route("/prechecks/run", post(routes::prechecks::run_prechecks_now))
        // Event stream
        .route("/events", get(routes::stream::events_handler));

    Router::new()
        .route("/health", get(routes::health::health_handler))
        .nest("/api", api)
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
