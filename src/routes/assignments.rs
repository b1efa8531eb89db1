use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    middleware::auth::require_admin,
    models::{assignment::AssignMeasureRequest, auth::AuthenticatedUser},
    routes::{engine_error, forbidden, ApiError},
    services::{assignments::AssignmentService, assistance::AssistanceService},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct CompanyFilter {
    pub company_id: Option<Uuid>,
}

/// Company scope of a request: admins may pick any company (or none), company
/// users are pinned to their own.
pub(crate) fn company_scope(
    user: &AuthenticatedUser,
    requested: Option<Uuid>,
) -> Result<Option<Uuid>, ApiError> {
    if user.is_admin() {
        return Ok(requested);
    }
    match (requested, user.company_id) {
        (Some(req), Some(own)) if req != own => Err(forbidden()),
        (_, own) => Ok(own),
    }
}

/// GET /assignments
pub async fn list_assignments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<CompanyFilter>,
) -> Result<Json<Value>, ApiError> {
    let scope = company_scope(&user, filter.company_id)?;
    let items = AssignmentService::list(state.store.as_ref(), scope, state.clock.now())
        .await
        .map_err(engine_error)?;
    Ok(Json(json!(items)))
}

/// GET /assignments/{id}
pub async fn get_assignment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let scope = company_scope(&user, None)?;
    let detail = AssignmentService::detail(state.store.as_ref(), id, scope, state.clock.now())
        .await
        .map_err(engine_error)?;
    Ok(Json(json!(detail)))
}

/// POST /admin/assignments — admin only
pub async fn assign_measure(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<AssignMeasureRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_admin(&user)?;
    let detail =
        AssignmentService::assign(state.store.as_ref(), &body, user.user_id, state.clock.now())
            .await
            .map_err(engine_error)?;
    Ok((StatusCode::CREATED, Json(json!(detail))))
}

/// DELETE /admin/assignments/{id} — admin only, soft delete
pub async fn unassign_measure(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    AssignmentService::unassign(state.store.as_ref(), id, user.user_id, state.clock.now())
        .await
        .map_err(engine_error)?;
    Ok(Json(json!({ "message": "Measure unassigned" })))
}

/// POST /steps/{id}/toggle
pub async fn toggle_step(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(step_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let scope = company_scope(&user, None)?;
    let detail = AssignmentService::toggle_step(
        state.store.as_ref(),
        step_id,
        Some(user.user_id),
        scope,
        state.clock.now(),
    )
    .await
    .map_err(engine_error)?;
    Ok(Json(json!(detail)))
}

/// POST /assignments/{id}/assistance — company asks for help
pub async fn request_assistance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let scope = company_scope(&user, None)?;
    let request = AssistanceService::request(
        state.store.as_ref(),
        state.mailer.as_ref(),
        id,
        Some(user.user_id),
        scope,
        state.clock.now(),
    )
    .await
    .map_err(engine_error)?;
    Ok(Json(json!({ "changed": true, "request": request })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::UserRole;

    fn company_user(company: Uuid) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            role: UserRole::Company,
            company_id: Some(company),
        }
    }

    #[test]
    fn company_users_are_pinned_to_their_company() {
        let own = Uuid::new_v4();
        let user = company_user(own);
        assert_eq!(company_scope(&user, None).unwrap(), Some(own));
        assert_eq!(company_scope(&user, Some(own)).unwrap(), Some(own));
        assert_eq!(
            company_scope(&user, Some(Uuid::new_v4())).unwrap_err().0,
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn admins_choose_their_scope() {
        let admin = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            role: UserRole::Admin,
            company_id: None,
        };
        let other = Uuid::new_v4();
        assert_eq!(company_scope(&admin, None).unwrap(), None);
        assert_eq!(company_scope(&admin, Some(other)).unwrap(), Some(other));
    }
}
