use axum::extract::{Extension, Path};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::domains::settings::Setting;
use crate::server::app::AppState;

use super::internal_error;

#[derive(Deserialize)]
pub struct PutSettingBody {
    pub value: String,
}

/// GET /api/settings - raw database overrides
pub async fn list_settings(Extension(state): Extension<AppState>) -> impl IntoResponse {
    match Setting::list_all(&state.db_pool).await {
        Ok(settings) => Json(json!({ "settings": settings })).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// GET /api/settings/resolved - every key with env/default fallbacks applied
pub async fn resolved_settings(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(json!(state.settings.resolve_all().await))
}

/// PUT /api/settings/{key} - set a database override
pub async fn put_setting(
    Extension(state): Extension<AppState>,
    Path(key): Path<String>,
    Json(body): Json<PutSettingBody>,
) -> impl IntoResponse {
    match Setting::upsert(&key, &body.value, &state.db_pool).await {
        Ok(setting) => Json(json!({ "success": true, "setting": setting })).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// DELETE /api/settings/{key} - drop the override, reverting to env/default
pub async fn delete_setting(
    Extension(state): Extension<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match Setting::delete(&key, &state.db_pool).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}
