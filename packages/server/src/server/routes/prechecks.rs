use axum::extract::Extension;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::domains::prechecks::{self, PrecheckResult};
use crate::server::app::AppState;

use super::internal_error;

/// GET /api/prechecks - most recent result per check
pub async fn latest_prechecks(Extension(state): Extension<AppState>) -> impl IntoResponse {
    match PrecheckResult::list_latest(&state.db_pool).await {
        Ok(results) => Json(json!({ "results": results })).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// POST /api/prechecks/run - run all checks now, streaming results as they land
pub async fn run_prechecks_now(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let results = prechecks::run_prechecks(
        &state.db_pool,
        &state.graph,
        &state.settings,
        &state.hub,
    )
    .await;
    Json(json!({ "results": results }))
}
