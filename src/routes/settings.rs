use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{
    error::EngineError,
    middleware::auth::require_admin,
    models::{
        auth::AuthenticatedUser,
        settings::{UpdateNotificationConfigRequest, UpdateSystemSettingsRequest},
    },
    routes::{engine_error, ApiError},
    AppState,
};

/// GET /admin/settings/notifications
pub async fn get_notification_config(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let cfg = state
        .store
        .load_notification_config()
        .await
        .map_err(engine_error)?;
    Ok(Json(json!({
        "lead_days": cfg.lead_days,
        "send_time": cfg.send_time(),
    })))
}

/// PUT /admin/settings/notifications
pub async fn update_notification_config(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateNotificationConfigRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let mut cfg = state
        .store
        .load_notification_config()
        .await
        .map_err(engine_error)?;
    cfg.apply(&body)
        .map_err(|msg| engine_error(EngineError::Validation(msg)))?;
    state
        .store
        .save_notification_config(&cfg)
        .await
        .map_err(engine_error)?;

    tracing::info!(
        "Notification config updated: {} day(s) at {}Z",
        cfg.lead_days,
        cfg.send_time()
    );
    Ok(Json(json!({
        "lead_days": cfg.lead_days,
        "send_time": cfg.send_time(),
    })))
}

/// GET /admin/settings/system
pub async fn get_system_settings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let settings = state
        .store
        .load_system_settings()
        .await
        .map_err(engine_error)?;
    Ok(Json(json!(settings)))
}

/// PUT /admin/settings/system
pub async fn update_system_settings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateSystemSettingsRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let mut settings = state
        .store
        .load_system_settings()
        .await
        .map_err(engine_error)?;
    settings
        .apply(body)
        .map_err(|msg| engine_error(EngineError::Validation(msg)))?;
    state
        .store
        .save_system_settings(&settings)
        .await
        .map_err(engine_error)?;
    Ok(Json(json!(settings)))
}
