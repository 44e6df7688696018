use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::common::JobRunId;
use crate::domains::export::{export_job_run, ExportError};
use crate::domains::jobs::{
    CancelRunError, JobItem, JobRun, StartRunError, StartRunRequest,
};
use crate::server::app::AppState;

use super::{error_response, internal_error};

#[derive(Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

/// GET /api/jobs - recent runs, newest first
pub async fn list_jobs(
    Extension(state): Extension<AppState>,
    Query(pagination): Query<Pagination>,
) -> impl IntoResponse {
    let page = pagination.page.max(1);
    let limit = pagination.limit.clamp(1, 100);
    let offset = (page - 1) * limit;

    match JobRun::list_recent(limit, offset, &state.db_pool).await {
        Ok(runs) => (
            StatusCode::OK,
            Json(json!({
                "runs": runs,
                "page": page,
                "limit": limit,
                "activeJobRunId": state.orchestrator.active_run_id().await,
            })),
        )
            .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// GET /api/jobs/status - is a run active right now?
pub async fn job_status(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(json!({
        "running": state.orchestrator.is_running().await,
        "activeJobRunId": state.orchestrator.active_run_id().await,
    }))
}

/// GET /api/jobs/{id} - one run with its items
pub async fn job_detail(
    Extension(state): Extension<AppState>,
    Path(id): Path<JobRunId>,
) -> impl IntoResponse {
    let run = match JobRun::find_by_id(id, &state.db_pool).await {
        Ok(Some(run)) => run,
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, "Job run not found").into_response()
        }
        Err(e) => return internal_error(e).into_response(),
    };

    match JobItem::list_for_run(id, &state.db_pool).await {
        Ok(items) => (StatusCode::OK, Json(json!({ "run": run, "items": items }))).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// POST /api/jobs - start a new run
pub async fn start_job(
    Extension(state): Extension<AppState>,
    Json(request): Json<StartRunRequest>,
) -> impl IntoResponse {
    match state.orchestrator.start_run(request).await {
        Ok(run_id) => (StatusCode::CREATED, Json(json!({ "jobRunId": run_id }))).into_response(),
        Err(e @ StartRunError::AlreadyRunning(_)) => {
            error_response(StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Err(e @ (StartRunError::NoActiveClients | StartRunError::NoCredentialedClients)) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(StartRunError::Internal(e)) => internal_error(e).into_response(),
    }
}

/// POST /api/jobs/{id}/cancel - cancel the active run or clean up a dead one
pub async fn cancel_job(
    Extension(state): Extension<AppState>,
    Path(id): Path<JobRunId>,
) -> impl IntoResponse {
    match state.orchestrator.cancel_run(id).await {
        Ok(()) => Json(json!({ "message": "Cancel requested.", "jobRunId": id })).into_response(),
        Err(e @ CancelRunError::NotFound) => {
            error_response(StatusCode::NOT_FOUND, e.to_string()).into_response()
        }
        Err(e @ CancelRunError::AlreadyFinished(_)) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(CancelRunError::Internal(e)) => internal_error(e).into_response(),
    }
}

/// POST /api/jobs/{id}/export - write JSON exports for a finished run
pub async fn export_job(
    Extension(state): Extension<AppState>,
    Path(id): Path<JobRunId>,
) -> impl IntoResponse {
    match export_job_run(id, &state.db_pool, &state.settings).await {
        Ok(files) => {
            let total_records: usize = files.iter().map(|f| f.record_count).sum();
            Json(json!({
                "jobRunId": id,
                "files": files,
                "totalRecords": total_records,
            }))
            .into_response()
        }
        Err(e @ ExportError::NotFound) => {
            error_response(StatusCode::NOT_FOUND, e.to_string()).into_response()
        }
        Err(e @ ExportError::NotExportable(_)) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => internal_error(e).into_response(),
    }
}
