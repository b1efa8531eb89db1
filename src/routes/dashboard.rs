use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{
    middleware::auth::require_admin,
    models::auth::AuthenticatedUser,
    routes::{engine_error, ApiError},
    services::report,
    AppState,
};

/// GET /admin/dashboard — same aggregation the progress report uses
pub async fn get_dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let now = state.clock.now();
    let store = state.store.as_ref();

    let companies = store.list_companies().await.map_err(engine_error)?;
    let assignments = store.list_assignments(None).await.map_err(engine_error)?;
    let open_requests = store.list_open_requests().await.map_err(engine_error)?;

    let stats = report::aggregate(&companies, &assignments, open_requests.len() as i64, now);

    Ok(Json(json!({
        "stats": stats,
        "open_assistance_requests": open_requests.len(),
    })))
}
