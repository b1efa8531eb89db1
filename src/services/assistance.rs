use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    db::Store,
    error::{EngineError, EngineResult},
    models::{
        assignment::{Assignment, AssignmentStatus},
        assistance::{AssistanceQueue, AssistanceRequest, Decision, DecisionAction, NewAssistanceRequest},
        notification::{NewNotification, KIND_ASSISTANCE_OPEN, KIND_ASSISTANCE_RESOLVED},
    },
    services::{
        activity,
        email::{text_to_html, wrap_html, BulkMailer, MailJob},
        metrics,
        notifications::NotificationService,
    },
};

/// How many decided requests the queue view shows.
pub const RECENT_DECISIONS: i64 = 20;

/// Status restored when a resolved request carries no usable `prev_status`.
pub const DEFAULT_RESTORED_STATUS: AssignmentStatus = AssignmentStatus::InProgress;

// ─── Transitions ─────────────────────────────────────────────────────────────

/// Opening a request: returns the status to remember for later restoration.
pub fn request_transition(current: AssignmentStatus) -> EngineResult<AssignmentStatus> {
    if current == AssignmentStatus::NeedsAssistance {
        return Err(EngineError::InvalidState(
            "Assistance has already been requested for this measure".into(),
        ));
    }
    Ok(current)
}

/// Deciding a request: returns the terminal decision and the assignment status
/// that goes with it.
pub fn decide_transition(
    request: &AssistanceRequest,
    action: DecisionAction,
) -> EngineResult<(Decision, AssignmentStatus)> {
    if !request.is_open() {
        return Err(EngineError::InvalidState(format!(
            "Assistance request was already marked {}",
            request.decision
        )));
    }

    let status = match action {
        DecisionAction::Resolved => restored_status(request.prev_status),
        DecisionAction::NotResolved => AssignmentStatus::NeedsAssistance,
    };
    Ok((action.into(), status))
}

fn restored_status(prev: Option<AssignmentStatus>) -> AssignmentStatus {
    match prev {
        Some(AssignmentStatus::NeedsAssistance) | None => DEFAULT_RESTORED_STATUS,
        Some(s) => s,
    }
}

// ─── Workflow ────────────────────────────────────────────────────────────────

pub struct AssistanceService;

impl AssistanceService {
    /// Company-initiated request for help on an assignment.
    ///
    /// Fails with `InvalidState` when the assignment already needs assistance.
    pub async fn request(
        store: &dyn Store,
        mailer: &BulkMailer,
        assignment_id: Uuid,
        requested_by: Option<Uuid>,
        company_scope: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> EngineResult<AssistanceRequest> {
        let assignment = load_assignment(store, assignment_id, company_scope).await?;
        let prev_status = request_transition(assignment.status)?;

        let request = store
            .insert_assistance_request(
                &NewAssistanceRequest {
                    assignment_id,
                    requested_by,
                    prev_status: Some(prev_status),
                    requested_at: now,
                },
                Some(AssignmentStatus::NeedsAssistance),
            )
            .await
            .map_err(|e| {
                if e.is_duplicate() {
                    EngineError::InvalidState(
                        "Assistance has already been requested for this measure".into(),
                    )
                } else {
                    e
                }
            })?;

        NotificationService::create_or_refresh(
            store,
            &NewNotification {
                company_id: assignment.company_id,
                user_id: None,
                assignment_id: Some(assignment_id),
                kind: KIND_ASSISTANCE_OPEN.to_string(),
                subject: format!("Assistance requested: {}", assignment.measure_name),
                body: format!(
                    "Your request for assistance on \"{}\" was sent to the administrators.",
                    assignment.measure_name
                ),
                notify_at: now,
            },
        )
        .await?;

        activity::record(
            store,
            activity::entry(
                requested_by,
                "assistance_requested",
                "assignment",
                assignment_id,
                json!({ "request_id": request.id, "prev_status": prev_status }),
                now,
            ),
        )
        .await;

        info!(
            "Assistance requested for assignment {assignment_id} (was {})",
            prev_status
        );

        // Already committed; mail trouble is only logged.
        if let Err(e) = Self::email_admins(store, mailer, &assignment).await {
            warn!("Assistance email for assignment {assignment_id} failed: {e}");
        }
        metrics::refresh_open_assistance(store).await;

        Ok(request)
    }

    /// Admin decision on an open request.
    pub async fn decide(
        store: &dyn Store,
        request_id: Uuid,
        action: DecisionAction,
        decided_by: Option<Uuid>,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> EngineResult<AssistanceRequest> {
        let request = store
            .find_assistance_request(request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("assistance request", request_id))?;
        let (decision, status) = decide_transition(&request, action)?;
        let assignment = load_assignment(store, request.assignment_id, None).await?;

        store
            .close_assistance_request(request_id, decision, decided_by, now, notes, status)
            .await?;

        if decision == Decision::Resolved {
            NotificationService::create_or_refresh(
                store,
                &NewNotification {
                    company_id: assignment.company_id,
                    user_id: None,
                    assignment_id: Some(assignment.id),
                    kind: KIND_ASSISTANCE_RESOLVED.to_string(),
                    subject: format!("Assistance resolved: {}", assignment.measure_name),
                    body: format!(
                        "The administrators resolved your assistance request on \"{}\". Status is back to {}.",
                        assignment.measure_name,
                        status.label()
                    ),
                    notify_at: now,
                },
            )
            .await?;
        }

        activity::record(
            store,
            activity::entry(
                decided_by,
                "assistance_decided",
                "assignment",
                assignment.id,
                json!({ "request_id": request_id, "decision": decision, "status": status }),
                now,
            ),
        )
        .await;

        info!("Assistance request {request_id} marked {decision}");
        metrics::refresh_open_assistance(store).await;

        Ok(AssistanceRequest {
            decision,
            decided_by,
            decided_at: Some(now),
            notes: notes.map(String::from),
            ..request
        })
    }

    /// Give every `NeedsAssistance` assignment lacking an open request a fresh one.
    ///
    /// A `not_resolved` decision leaves the assignment stuck without an open
    /// request; this pass re-queues it. Idempotent. Returns the number repaired.
    pub async fn reconcile(store: &dyn Store, now: DateTime<Utc>) -> EngineResult<usize> {
        let mut repaired = 0;

        for assignment in store
            .assignments_with_status(AssignmentStatus::NeedsAssistance)
            .await?
        {
            if store.open_request_for(assignment.id).await?.is_some() {
                continue;
            }

            let new = NewAssistanceRequest {
                assignment_id: assignment.id,
                requested_by: None,
                prev_status: None,
                requested_at: now,
            };
            match store.insert_assistance_request(&new, None).await {
                Ok(request) => {
                    info!(
                        "Reconciliation: re-opened assistance request {} for assignment {}",
                        request.id, assignment.id
                    );
                    repaired += 1;
                }
                Err(e) if e.is_duplicate() => continue,
                Err(e) => return Err(e),
            }
        }

        if repaired > 0 {
            metrics::refresh_open_assistance(store).await;
        }
        Ok(repaired)
    }

    /// Admin queue view: reconcile first, then list open and recently decided requests.
    pub async fn queue(store: &dyn Store, now: DateTime<Utc>) -> EngineResult<AssistanceQueue> {
        let repaired = Self::reconcile(store, now).await?;
        let open = store.list_open_requests().await?;
        let recent = store.list_decided_requests(RECENT_DECISIONS).await?;

        metrics::OPEN_ASSISTANCE.set(open.len() as f64);

        Ok(AssistanceQueue {
            open,
            recent,
            repaired,
        })
    }

    /// Resolve straight from an `assistance_open` notification, creating the
    /// open request first if none exists, then mark the notification read.
    pub async fn resolve_from_notification(
        store: &dyn Store,
        notification_id: Uuid,
        decided_by: Option<Uuid>,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> EngineResult<AssistanceRequest> {
        let notification = store
            .find_notification(notification_id)
            .await?
            .ok_or_else(|| EngineError::not_found("notification", notification_id))?;

        if notification.kind != KIND_ASSISTANCE_OPEN {
            return Err(EngineError::Validation(format!(
                "Notification is a '{}' notification, not an assistance request",
                notification.kind
            )));
        }
        let assignment_id = notification.assignment_id.ok_or_else(|| {
            EngineError::Validation("Notification is not linked to an assignment".into())
        })?;
        let assignment = load_assignment(store, assignment_id, None).await?;

        let request = match store.open_request_for(assignment_id).await? {
            Some(open) => open,
            None => {
                let prev_status = match assignment.status {
                    AssignmentStatus::NeedsAssistance => DEFAULT_RESTORED_STATUS,
                    other => other,
                };
                let new = NewAssistanceRequest {
                    assignment_id,
                    requested_by: None,
                    prev_status: Some(prev_status),
                    requested_at: now,
                };
                match store.insert_assistance_request(&new, None).await {
                    Ok(created) => created,
                    Err(e) if e.is_duplicate() => store
                        .open_request_for(assignment_id)
                        .await?
                        .ok_or_else(|| EngineError::not_found("assistance request", assignment_id))?,
                    Err(e) => return Err(e),
                }
            }
        };

        let decided = Self::decide(
            store,
            request.id,
            DecisionAction::Resolved,
            decided_by,
            notes,
            now,
        )
        .await?;

        store.mark_read(notification_id, now).await?;
        Ok(decided)
    }

    async fn email_admins(
        store: &dyn Store,
        mailer: &BulkMailer,
        assignment: &Assignment,
    ) -> EngineResult<()> {
        let settings = store.load_system_settings().await?;
        if !settings.assistance_email_enabled {
            return Ok(());
        }

        let admins = store.active_admin_emails().await?;
        if admins.is_empty() {
            warn!("Assistance requested but no active admin to notify");
            return Ok(());
        }

        let company = store
            .find_company(assignment.company_id)
            .await?
            .map(|c| c.name)
            .unwrap_or_else(|| assignment.company_id.to_string());

        let subject = format!("Assistance requested: {} ({company})", assignment.measure_name);
        let body = format!(
            "{company} requested assistance on the measure \"{}\".\n\nOpen the assistance queue to review it.",
            assignment.measure_name
        );
        let html = wrap_html(&subject, &text_to_html(&body));

        let jobs: Vec<MailJob> = admins
            .iter()
            .map(|to| MailJob::text(to, &subject, &body).with_html(html.clone()))
            .collect();

        let outcome = mailer.send_detailed(&jobs).await;
        metrics::mail_batch("assistance", outcome.sent, outcome.failed);
        Ok(())
    }
}

async fn load_assignment(
    store: &dyn Store,
    id: Uuid,
    company_scope: Option<Uuid>,
) -> EngineResult<Assignment> {
    let assignment = store
        .find_assignment(id)
        .await?
        .ok_or_else(|| EngineError::not_found("assignment", id))?;

    match company_scope {
        Some(company_id) if assignment.company_id != company_id => {
            Err(EngineError::not_found("assignment", id))
        }
        _ => Ok(assignment),
    }
}
