use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    middleware::auth::require_admin,
    models::{auth::AuthenticatedUser, notification::TestEmailRequest},
    routes::{
        assignments::{company_scope, CompanyFilter},
        engine_error, ApiError,
    },
    services::notifications::NotificationService,
    AppState,
};

fn required_company(scope: Option<Uuid>) -> Result<Uuid, ApiError> {
    scope.ok_or_else(|| {
        engine_error(crate::error::EngineError::Validation(
            "company_id is required".into(),
        ))
    })
}

/// GET /notifications — unread notifications plus overdue items
pub async fn get_inbox(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<CompanyFilter>,
) -> Result<Json<Value>, ApiError> {
    let company_id = required_company(company_scope(&user, filter.company_id)?)?;
    let inbox = NotificationService::inbox(state.store.as_ref(), company_id, state.clock.now())
        .await
        .map_err(engine_error)?;
    Ok(Json(json!(inbox)))
}

/// POST /notifications/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let scope = company_scope(&user, None)?;
    let changed = NotificationService::mark_read(state.store.as_ref(), id, scope, state.clock.now())
        .await
        .map_err(engine_error)?;
    Ok(Json(json!({ "changed": changed })))
}

/// POST /notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<CompanyFilter>,
) -> Result<Json<Value>, ApiError> {
    let company_id = required_company(company_scope(&user, filter.company_id)?)?;
    let updated =
        NotificationService::mark_all_read(state.store.as_ref(), company_id, state.clock.now())
            .await
            .map_err(engine_error)?;
    Ok(Json(json!({ "updated": updated })))
}

/// POST /admin/notifications/test-email
pub async fn send_test_email(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<TestEmailRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let outcome = NotificationService::send_test_email(
        state.store.as_ref(),
        state.mailer.as_ref(),
        body.company_id,
        &body.subject,
        &body.message,
        state.clock.now(),
    )
    .await
    .map_err(engine_error)?;
    Ok(Json(json!(outcome)))
}
