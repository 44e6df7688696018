use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::common::ClientId;
use crate::domains::clients::{Client, CreateClient};
use crate::server::app::AppState;

use super::{error_response, internal_error};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientBody {
    pub abbreviation: String,
    pub name: Option<String>,
    pub group: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchClientBody {
    pub is_active: bool,
}

/// GET /api/clients - the full roster
pub async fn list_clients(Extension(state): Extension<AppState>) -> impl IntoResponse {
    match Client::list_all(&state.db_pool).await {
        Ok(clients) => Json(json!({ "clients": clients })).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// POST /api/clients - add a client to the roster
pub async fn create_client(
    Extension(state): Extension<AppState>,
    Json(body): Json<CreateClientBody>,
) -> impl IntoResponse {
    let abbreviation = body.abbreviation.trim();
    if abbreviation.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "abbreviation is required")
            .into_response();
    }

    let params = CreateClient::builder()
        .abbreviation(abbreviation)
        .name(body.name.as_deref())
        .group_name(body.group.as_deref())
        .build();

    match Client::create(&params, &state.db_pool).await {
        Ok(client) => (StatusCode::CREATED, Json(json!({ "client": client }))).into_response(),
        Err(e) => match e.downcast_ref::<sqlx::Error>() {
            Some(sqlx::Error::Database(db)) if db.is_unique_violation() => error_response(
                StatusCode::CONFLICT,
                "A client with this abbreviation already exists",
            )
            .into_response(),
            _ => internal_error(e).into_response(),
        },
    }
}

/// PATCH /api/clients/{id} - toggle active/inactive
pub async fn set_client_active(
    Extension(state): Extension<AppState>,
    Path(id): Path<ClientId>,
    Json(body): Json<PatchClientBody>,
) -> impl IntoResponse {
    match Client::set_active(id, body.is_active, &state.db_pool).await {
        Ok(Some(client)) => Json(json!({ "client": client })).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Client not found").into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}
