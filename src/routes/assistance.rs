use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    middleware::auth::require_admin,
    models::{
        assistance::{DecideRequest, ResolveNotificationRequest},
        auth::AuthenticatedUser,
    },
    routes::{engine_error, ApiError},
    services::assistance::AssistanceService,
    AppState,
};

/// GET /admin/assistance — runs reconciliation, then lists the queue
pub async fn get_queue(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let queue = AssistanceService::queue(state.store.as_ref(), state.clock.now())
        .await
        .map_err(engine_error)?;
    Ok(Json(json!(queue)))
}

/// POST /admin/assistance/{id}/decide
pub async fn decide(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
    Json(body): Json<DecideRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let request = AssistanceService::decide(
        state.store.as_ref(),
        request_id,
        body.action,
        Some(user.user_id),
        body.notes.as_deref(),
        state.clock.now(),
    )
    .await
    .map_err(engine_error)?;
    Ok(Json(json!({ "changed": true, "request": request })))
}

/// POST /admin/notifications/{id}/resolve
pub async fn resolve_from_notification(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(notification_id): Path<Uuid>,
    Json(body): Json<ResolveNotificationRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let request = AssistanceService::resolve_from_notification(
        state.store.as_ref(),
        notification_id,
        Some(user.user_id),
        body.notes.as_deref(),
        state.clock.now(),
    )
    .await
    .map_err(engine_error)?;
    Ok(Json(json!({ "changed": true, "request": request })))
}
