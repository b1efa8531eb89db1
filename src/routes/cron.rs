use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    middleware::{auth::require_admin, cron_key::CronAuth},
    models::auth::AuthenticatedUser,
    routes::{engine_error, ApiError},
    services::scheduler::DueSweepOptions,
    AppState,
};

/// Query flags of `POST /cron/notify-due`. All optional.
#[derive(Debug, Default, Deserialize)]
pub struct NotifyDueParams {
    pub lead_days: Option<i64>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub skip_email: bool,
    #[serde(default)]
    pub ignore_send_window: bool,
}

impl From<NotifyDueParams> for DueSweepOptions {
    fn from(p: NotifyDueParams) -> Self {
        DueSweepOptions {
            lead_days: p.lead_days,
            dry_run: p.dry_run,
            skip_email: p.skip_email,
            ignore_send_window: p.ignore_send_window,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ForceParam {
    #[serde(default)]
    pub force: bool,
}

/// POST /cron/notify-due — external scheduler entry for the due-soon sweep
pub async fn notify_due(
    State(state): State<AppState>,
    _auth: CronAuth,
    Query(params): Query<NotifyDueParams>,
) -> Result<Json<Value>, ApiError> {
    let summary = state
        .scheduler()
        .notify_due(params.into())
        .await
        .map_err(engine_error)?;
    Ok(Json(json!(summary)))
}

/// POST /cron/progress-report
pub async fn progress_report(
    State(state): State<AppState>,
    _auth: CronAuth,
    Query(params): Query<ForceParam>,
) -> Json<Value> {
    let outcome = state.scheduler().send_progress_report(params.force).await;
    Json(json!(outcome))
}

/// POST /cron/due-reminders
pub async fn due_reminders(State(state): State<AppState>, _auth: CronAuth) -> Json<Value> {
    let outcome = state.scheduler().send_due_date_reminders().await;
    Json(json!(outcome))
}

/// POST /admin/reports/send-now — always sends, regardless of cadence
pub async fn send_report_now(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let outcome = state.scheduler().send_progress_report(true).await;
    tracing::info!(
        "Progress report requested by {}: {}",
        user.user_id,
        outcome.message
    );
    Ok(Json(json!(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_due_flags_default_to_a_regular_run() {
        let opts: DueSweepOptions = NotifyDueParams::default().into();
        assert_eq!(opts.lead_days, None);
        assert!(!opts.dry_run && !opts.skip_email && !opts.ignore_send_window);
    }

    #[test]
    fn notify_due_flags_pass_through() {
        let params = NotifyDueParams {
            lead_days: Some(3),
            dry_run: true,
            skip_email: false,
            ignore_send_window: true,
        };
        let opts: DueSweepOptions = params.into();
        assert_eq!(opts.lead_days, Some(3));
        assert!(opts.dry_run && opts.ignore_send_window && !opts.skip_email);
    }
}
