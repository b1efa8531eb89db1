pub mod assignments;
pub mod assistance;
pub mod cron;
pub mod dashboard;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod settings;

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

use crate::error::EngineError;

pub type ApiError = (StatusCode, Json<Value>);

/// Map an engine error onto the HTTP surface. `InvalidState` is a user-facing
/// no-op, not a failure.
pub fn engine_error(e: EngineError) -> ApiError {
    let status = match &e {
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::Conflict(_) | EngineError::DuplicateKey { .. } => StatusCode::CONFLICT,
        EngineError::InvalidState(msg) => {
            return (
                StatusCode::OK,
                Json(json!({ "changed": false, "message": msg })),
            )
        }
        EngineError::Persistence(err) => {
            tracing::error!("Persistence error: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": e.to_string() })))
}

pub fn forbidden() -> ApiError {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "Access denied" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn invalid_state_is_a_soft_no_op() {
        let (status, Json(body)) = engine_error(EngineError::InvalidState("already open".into()));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], false);
        assert_eq!(body["message"], "already open");
    }

    #[test]
    fn maps_error_kinds_to_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(engine_error(EngineError::not_found("assignment", id)).0, StatusCode::NOT_FOUND);
        assert_eq!(engine_error(EngineError::Validation("x".into())).0, StatusCode::BAD_REQUEST);
        assert_eq!(engine_error(EngineError::Conflict("x".into())).0, StatusCode::CONFLICT);
        assert_eq!(
            engine_error(EngineError::DuplicateKey { assignment_id: Some(id), kind: "due_7d".into() }).0,
            StatusCode::CONFLICT
        );
    }
}
