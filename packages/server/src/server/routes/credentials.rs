use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::common::{ClientId, CredentialId};
use crate::domains::clients::{ApiConfig, CreateCredential, Credential};
use crate::server::app::AppState;

use super::{error_response, internal_error};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialFilter {
    pub client_id: Option<ClientId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCredentialBody {
    pub client_id: ClientId,
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphConfigBody {
    pub tenant_id: String,
    pub app_id: String,
    pub client_secret: String,
}

/// GET /api/credentials[?clientId=] - credentials with secrets redacted
pub async fn list_credentials(
    Extension(state): Extension<AppState>,
    Query(filter): Query<CredentialFilter>,
) -> impl IntoResponse {
    let result = match filter.client_id {
        Some(client_id) => Credential::find_by_client(client_id, &state.db_pool).await,
        None => Credential::list_all(&state.db_pool).await,
    };

    match result {
        Ok(credentials) => {
            let safe: Vec<_> = credentials.iter().map(Credential::redacted).collect();
            Json(json!({ "credentials": safe })).into_response()
        }
        Err(e) => internal_error(e).into_response(),
    }
}

/// POST /api/credentials - add a credential for a client
pub async fn create_credential(
    Extension(state): Extension<AppState>,
    Json(body): Json<CreateCredentialBody>,
) -> impl IntoResponse {
    let email = body.email.trim();
    if email.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "email is required").into_response();
    }

    let params = CreateCredential::builder()
        .client_id(body.client_id)
        .email(email)
        .build();

    match Credential::create(&params, &state.db_pool).await {
        Ok(credential) => (
            StatusCode::CREATED,
            Json(json!({ "credential": credential.redacted() })),
        )
            .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// PUT /api/credentials/{id}/graph-config - set the remote-API configuration
pub async fn set_graph_config(
    Extension(state): Extension<AppState>,
    Path(id): Path<CredentialId>,
    Json(body): Json<GraphConfigBody>,
) -> impl IntoResponse {
    let config = ApiConfig {
        tenant_id: body.tenant_id.trim().to_string(),
        app_id: body.app_id.trim().to_string(),
        client_secret: body.client_secret,
    };
    if config.tenant_id.is_empty() || config.app_id.is_empty() || config.client_secret.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "tenantId, appId and clientSecret are all required",
        )
        .into_response();
    }

    match Credential::set_api_config(id, &config, &state.db_pool).await {
        Ok(Some(_)) => {
            // A changed secret invalidates any token cached for the tenant.
            state.graph.clear_token_cache(Some(&config.tenant_id)).await;
            Json(json!({ "success": true })).into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Credential not found").into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}
