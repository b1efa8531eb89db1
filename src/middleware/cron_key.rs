use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

use crate::AppState;

/// Extractor that validates the `X-Cron-Key` header against `config.cron_key`.
pub struct CronAuth;

impl FromRequestParts<AppState> for CronAuth {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get("X-Cron-Key")
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing X-Cron-Key header"))?;

        if key != state.config.cron_key {
            return Err((StatusCode::UNAUTHORIZED, "Invalid cron key"));
        }

        Ok(CronAuth)
    }
}
