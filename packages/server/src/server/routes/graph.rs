use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::common::CredentialId;
use crate::domains::clients::Credential;
use crate::server::app::AppState;

use super::{error_response, internal_error};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConnectionBody {
    pub credential_id: CredentialId,
}

/// POST /api/graph/test-connection - acquire a token and probe the tenant
pub async fn test_connection(
    Extension(state): Extension<AppState>,
    Json(body): Json<TestConnectionBody>,
) -> impl IntoResponse {
    let credential = match Credential::find_by_id(body.credential_id, &state.db_pool).await {
        Ok(Some(credential)) => credential,
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, "Credential not found").into_response()
        }
        Err(e) => return internal_error(e).into_response(),
    };

    let Some(config) = credential.api_config() else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Credential is missing remote API configuration (tenantId, appId, or clientSecret)",
        )
        .into_response();
    };

    let result = state
        .graph
        .test_connection(&config.tenant_id, &config.app_id, &config.client_secret)
        .await;

    if result.success {
        if let Err(e) = Credential::touch_last_used(credential.id, &state.db_pool).await {
            tracing::warn!(credential_id = %credential.id, error = %e, "failed to stamp last_used_at");
        }
    }

    Json(json!({
        "success": result.success,
        "tenantName": result.tenant_name,
        "error": result.error,
    }))
    .into_response()
}
