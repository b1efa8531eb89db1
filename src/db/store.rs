use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::EngineResult,
    models::{
        assignment::{Assignment, AssignmentStatus, AssignmentStep, NewAssignment, NewStep},
        assistance::{AssistanceRequest, Decision, NewAssistanceRequest},
        company::{ActivityEntry, Company, MeasureTemplate, User},
        notification::{NewNotification, Notification},
        settings::{NotificationConfig, SystemSettings},
    },
};

/// Pseudo-kind reported in [`crate::error::EngineError::DuplicateKey`] when a
/// second open assistance request is inserted for the same assignment.
pub const OPEN_REQUEST_KEY: &str = "open_assistance_request";

/// Repository boundary of the engine.
///
/// Implementations must enforce two uniqueness rules at the storage layer and
/// report violations as `EngineError::DuplicateKey`:
/// - one notification per `(assignment_id, kind)` when `assignment_id` is set;
/// - at most one `open` assistance request per assignment.
///
/// Soft-deleted assignments are never returned.
#[async_trait]
pub trait Store: Send + Sync {
    // ─── Singletons ─────────────────────────────────────────────────────────

    /// Load the notification config, seeding the default row if absent.
    async fn load_notification_config(&self) -> EngineResult<NotificationConfig>;
    async fn save_notification_config(&self, cfg: &NotificationConfig) -> EngineResult<()>;
    /// Load the system settings, seeding the default row if absent.
    async fn load_system_settings(&self) -> EngineResult<SystemSettings>;
    async fn save_system_settings(&self, settings: &SystemSettings) -> EngineResult<()>;
    async fn stamp_progress_report_sent(&self, at: DateTime<Utc>) -> EngineResult<()>;
    async fn stamp_reminder_check(&self, at: DateTime<Utc>) -> EngineResult<()>;

    // ─── Directory ──────────────────────────────────────────────────────────

    async fn list_companies(&self) -> EngineResult<Vec<Company>>;
    async fn find_company(&self, id: Uuid) -> EngineResult<Option<Company>>;
    /// Active users with role `company` belonging to the company.
    async fn active_company_users(&self, company_id: Uuid) -> EngineResult<Vec<User>>;
    async fn active_admin_emails(&self) -> EngineResult<Vec<String>>;
    async fn find_measure_template(&self, id: Uuid) -> EngineResult<Option<MeasureTemplate>>;

    // ─── Assignments ────────────────────────────────────────────────────────

    /// Insert the assignment and its cloned steps atomically.
    async fn create_assignment(
        &self,
        new: &NewAssignment,
        steps: &[NewStep],
    ) -> EngineResult<Assignment>;
    async fn find_assignment(&self, id: Uuid) -> EngineResult<Option<Assignment>>;
    async fn find_live_assignment(
        &self,
        company_id: Uuid,
        measure_id: Uuid,
    ) -> EngineResult<Option<Assignment>>;
    /// Returns false when the assignment was already gone.
    async fn soft_delete_assignment(
        &self,
        id: Uuid,
        deleted_by: Uuid,
        at: DateTime<Utc>,
    ) -> EngineResult<bool>;
    async fn list_assignments(&self, company_id: Option<Uuid>) -> EngineResult<Vec<Assignment>>;
    /// Non-completed assignments with `from <= due_at < to`.
    async fn assignments_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<Vec<Assignment>>;
    async fn assignments_with_status(
        &self,
        status: AssignmentStatus,
    ) -> EngineResult<Vec<Assignment>>;
    async fn list_steps(&self, assignment_id: Uuid) -> EngineResult<Vec<AssignmentStep>>;
    async fn find_step(&self, step_id: Uuid) -> EngineResult<Option<AssignmentStep>>;
    /// Persist a toggled step and re-derive the assignment status from the
    /// status held under a row lock. Returns the status now stored.
    async fn save_step_and_status(&self, step: &AssignmentStep) -> EngineResult<AssignmentStatus>;

    // ─── Assistance requests ────────────────────────────────────────────────

    async fn find_assistance_request(&self, id: Uuid) -> EngineResult<Option<AssistanceRequest>>;
    async fn open_request_for(&self, assignment_id: Uuid)
        -> EngineResult<Option<AssistanceRequest>>;
    /// Insert an open request and, when `status` is given, set the assignment
    /// status in the same transaction.
    async fn insert_assistance_request(
        &self,
        new: &NewAssistanceRequest,
        status: Option<AssignmentStatus>,
    ) -> EngineResult<AssistanceRequest>;
    /// Record a terminal decision and the resulting assignment status atomically.
    /// Fails with `InvalidState` when the request is no longer open.
    async fn close_assistance_request(
        &self,
        id: Uuid,
        decision: Decision,
        decided_by: Option<Uuid>,
        at: DateTime<Utc>,
        notes: Option<&str>,
        status: AssignmentStatus,
    ) -> EngineResult<()>;
    /// Open requests, newest first.
    async fn list_open_requests(&self) -> EngineResult<Vec<AssistanceRequest>>;
    /// Decided requests, most recently decided first.
    async fn list_decided_requests(&self, limit: i64) -> EngineResult<Vec<AssistanceRequest>>;
    async fn count_open_requests_since(&self, since: DateTime<Utc>) -> EngineResult<i64>;

    // ─── Notifications ──────────────────────────────────────────────────────

    async fn notification_exists(&self, assignment_id: Uuid, kind: &str) -> EngineResult<bool>;
    async fn find_notification(&self, id: Uuid) -> EngineResult<Option<Notification>>;
    async fn find_notification_by_kind(
        &self,
        assignment_id: Uuid,
        kind: &str,
    ) -> EngineResult<Option<Notification>>;
    async fn insert_notification(&self, new: &NewNotification) -> EngineResult<Notification>;
    /// Rewrite subject/body, bump `notify_at` and mark unread again.
    async fn refresh_notification(
        &self,
        id: Uuid,
        subject: &str,
        body: &str,
        notify_at: DateTime<Utc>,
    ) -> EngineResult<()>;
    async fn unsent_notification_ids(&self, kind: &str) -> EngineResult<Vec<Uuid>>;
    async fn mark_email_sent(&self, ids: &[Uuid], at: DateTime<Utc>) -> EngineResult<u64>;
    /// Returns false when the notification was already read.
    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> EngineResult<bool>;
    async fn mark_all_read(&self, company_id: Uuid, at: DateTime<Utc>) -> EngineResult<u64>;
    /// Unread notifications for a company, newest first.
    async fn unread_notifications(&self, company_id: Uuid) -> EngineResult<Vec<Notification>>;

    // ─── Activity ───────────────────────────────────────────────────────────

    async fn log_activity(&self, entry: &ActivityEntry) -> EngineResult<()>;
}
