use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::store::{Store, OPEN_REQUEST_KEY};
use crate::{
    error::{EngineError, EngineResult},
    models::{
        assignment::{Assignment, AssignmentStatus, AssignmentStep, NewAssignment, NewStep},
        assistance::{AssistanceRequest, Decision, NewAssistanceRequest},
        company::{ActivityEntry, Company, MeasureTemplate, StepTemplate, User},
        notification::{NewNotification, Notification},
        settings::{NotificationConfig, ReportFrequency, SystemSettings},
    },
    services::status,
};

/// Postgres-backed [`Store`]. Enum columns are plain TEXT and parsed on the way out.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_err(e: anyhow::Error) -> EngineError {
    EngineError::Persistence(sqlx::Error::Decode(e.into()))
}

/// Map a unique violation to `DuplicateKey`, everything else to `Persistence`.
fn map_unique(e: sqlx::Error, assignment_id: Option<Uuid>, kind: &str) -> EngineError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => EngineError::DuplicateKey {
            assignment_id,
            kind: kind.to_string(),
        },
        _ => EngineError::Persistence(e),
    }
}

// ─── Row types ──────────────────────────────────────────────────────────────

const ASSIGNMENT_COLUMNS: &str = "a.id, a.company_id, a.measure_id, m.name AS measure_name, \
     a.status, a.urgency, a.start_date, a.end_date, a.due_at, a.target, a.departments, \
     a.responsible, a.participants, a.created_at, a.deleted_at, a.deleted_by";

#[derive(FromRow)]
struct AssignmentRow {
    id: Uuid,
    company_id: Uuid,
    measure_id: Uuid,
    measure_name: String,
    status: String,
    urgency: i16,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    due_at: Option<DateTime<Utc>>,
    target: Option<String>,
    departments: Option<String>,
    responsible: Option<String>,
    participants: Option<String>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<Uuid>,
}

impl TryFrom<AssignmentRow> for Assignment {
    type Error = EngineError;

    fn try_from(r: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(Assignment {
            id: r.id,
            company_id: r.company_id,
            measure_id: r.measure_id,
            measure_name: r.measure_name,
            status: r.status.parse().map_err(decode_err)?,
            urgency: r.urgency,
            start_date: r.start_date,
            end_date: r.end_date,
            due_at: r.due_at,
            target: r.target,
            departments: r.departments,
            responsible: r.responsible,
            participants: r.participants,
            created_at: r.created_at,
            deleted_at: r.deleted_at,
            deleted_by: r.deleted_by,
        })
    }
}

#[derive(FromRow)]
struct StepRow {
    id: Uuid,
    assignment_id: Uuid,
    title: String,
    step_order: i32,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl From<StepRow> for AssignmentStep {
    fn from(r: StepRow) -> Self {
        AssignmentStep {
            id: r.id,
            assignment_id: r.assignment_id,
            title: r.title,
            step_order: r.step_order,
            is_completed: r.is_completed,
            completed_at: r.completed_at,
        }
    }
}

const REQUEST_COLUMNS: &str = "id, assignment_id, requested_by, prev_status, requested_at, \
     decision, decided_by, decided_at, notes";

const LIVE_REQUEST_COLUMNS: &str = "r.id, r.assignment_id, r.requested_by, r.prev_status, \
     r.requested_at, r.decision, r.decided_by, r.decided_at, r.notes";

/// Requests whose assignment has not been unassigned.
const LIVE_REQUESTS: &str = "assistance_requests r
     JOIN assignments a ON a.id = r.assignment_id AND a.deleted_at IS NULL";

#[derive(FromRow)]
struct RequestRow {
    id: Uuid,
    assignment_id: Uuid,
    requested_by: Option<Uuid>,
    prev_status: Option<String>,
    requested_at: DateTime<Utc>,
    decision: String,
    decided_by: Option<Uuid>,
    decided_at: Option<DateTime<Utc>>,
    notes: Option<String>,
}

impl TryFrom<RequestRow> for AssistanceRequest {
    type Error = EngineError;

    fn try_from(r: RequestRow) -> Result<Self, Self::Error> {
        let prev_status = match r.prev_status {
            Some(s) => Some(s.parse().map_err(decode_err)?),
            None => None,
        };
        Ok(AssistanceRequest {
            id: r.id,
            assignment_id: r.assignment_id,
            requested_by: r.requested_by,
            prev_status,
            requested_at: r.requested_at,
            decision: r.decision.parse().map_err(decode_err)?,
            decided_by: r.decided_by,
            decided_at: r.decided_at,
            notes: r.notes,
        })
    }
}

const NOTIFICATION_COLUMNS: &str = "id, company_id, user_id, assignment_id, kind, subject, body, \
     notify_at, email_sent_at, read_at";

#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    company_id: Uuid,
    user_id: Option<Uuid>,
    assignment_id: Option<Uuid>,
    kind: String,
    subject: String,
    body: String,
    notify_at: DateTime<Utc>,
    email_sent_at: Option<DateTime<Utc>>,
    read_at: Option<DateTime<Utc>>,
}

impl From<NotificationRow> for Notification {
    fn from(r: NotificationRow) -> Self {
        Notification {
            id: r.id,
            company_id: r.company_id,
            user_id: r.user_id,
            assignment_id: r.assignment_id,
            kind: r.kind,
            subject: r.subject,
            body: r.body,
            notify_at: r.notify_at,
            email_sent_at: r.email_sent_at,
            read_at: r.read_at,
        }
    }
}

#[derive(FromRow)]
struct SettingsRow {
    progress_report_enabled: bool,
    progress_report_frequency: String,
    progress_report_day: i32,
    progress_report_hour: i32,
    progress_report_additional_emails: Option<String>,
    last_progress_report_sent: Option<DateTime<Utc>>,
    reminder_email_enabled: bool,
    reminder_days_before: i32,
    last_reminder_check: Option<DateTime<Utc>>,
    assistance_email_enabled: bool,
}

impl TryFrom<SettingsRow> for SystemSettings {
    type Error = EngineError;

    fn try_from(r: SettingsRow) -> Result<Self, Self::Error> {
        let frequency: ReportFrequency = r.progress_report_frequency.parse().map_err(decode_err)?;
        Ok(SystemSettings {
            progress_report_enabled: r.progress_report_enabled,
            progress_report_frequency: frequency,
            progress_report_day: r.progress_report_day,
            progress_report_hour: r.progress_report_hour,
            progress_report_additional_emails: r.progress_report_additional_emails,
            last_progress_report_sent: r.last_progress_report_sent,
            reminder_email_enabled: r.reminder_email_enabled,
            reminder_days_before: r.reminder_days_before,
            last_reminder_check: r.last_reminder_check,
            assistance_email_enabled: r.assistance_email_enabled,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> EngineResult<Vec<T>>
where
    T: TryFrom<R, Error = EngineError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl Store for PgStore {
    // ─── Singletons ─────────────────────────────────────────────────────────

    async fn load_notification_config(&self) -> EngineResult<NotificationConfig> {
        sqlx::query("INSERT INTO notification_config (id) VALUES (1) ON CONFLICT (id) DO NOTHING")
            .execute(&self.pool)
            .await?;

        let (lead_days, send_hour_utc, send_minute_utc): (i32, i32, i32) = sqlx::query_as(
            "SELECT lead_days, send_hour_utc, send_minute_utc FROM notification_config WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(NotificationConfig {
            lead_days,
            send_hour_utc,
            send_minute_utc,
        })
    }

    async fn save_notification_config(&self, cfg: &NotificationConfig) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO notification_config (id, lead_days, send_hour_utc, send_minute_utc)
             VALUES (1, $1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET
                lead_days = EXCLUDED.lead_days,
                send_hour_utc = EXCLUDED.send_hour_utc,
                send_minute_utc = EXCLUDED.send_minute_utc,
                updated_at = NOW()",
        )
        .bind(cfg.lead_days)
        .bind(cfg.send_hour_utc)
        .bind(cfg.send_minute_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_system_settings(&self) -> EngineResult<SystemSettings> {
        sqlx::query("INSERT INTO system_settings (id) VALUES (1) ON CONFLICT (id) DO NOTHING")
            .execute(&self.pool)
            .await?;

        let row = sqlx::query_as::<_, SettingsRow>(
            "SELECT progress_report_enabled, progress_report_frequency, progress_report_day,
                    progress_report_hour, progress_report_additional_emails,
                    last_progress_report_sent, reminder_email_enabled, reminder_days_before,
                    last_reminder_check, assistance_email_enabled
             FROM system_settings WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn save_system_settings(&self, s: &SystemSettings) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO system_settings (id, progress_report_enabled, progress_report_frequency,
                 progress_report_day, progress_report_hour, progress_report_additional_emails,
                 reminder_email_enabled, reminder_days_before, assistance_email_enabled)
             VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (id) DO UPDATE SET
                progress_report_enabled = EXCLUDED.progress_report_enabled,
                progress_report_frequency = EXCLUDED.progress_report_frequency,
                progress_report_day = EXCLUDED.progress_report_day,
                progress_report_hour = EXCLUDED.progress_report_hour,
                progress_report_additional_emails = EXCLUDED.progress_report_additional_emails,
                reminder_email_enabled = EXCLUDED.reminder_email_enabled,
                reminder_days_before = EXCLUDED.reminder_days_before,
                assistance_email_enabled = EXCLUDED.assistance_email_enabled,
                updated_at = NOW()",
        )
        .bind(s.progress_report_enabled)
        .bind(s.progress_report_frequency.as_str())
        .bind(s.progress_report_day)
        .bind(s.progress_report_hour)
        .bind(&s.progress_report_additional_emails)
        .bind(s.reminder_email_enabled)
        .bind(s.reminder_days_before)
        .bind(s.assistance_email_enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stamp_progress_report_sent(&self, at: DateTime<Utc>) -> EngineResult<()> {
        sqlx::query("UPDATE system_settings SET last_progress_report_sent = $1 WHERE id = 1")
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stamp_reminder_check(&self, at: DateTime<Utc>) -> EngineResult<()> {
        sqlx::query("UPDATE system_settings SET last_reminder_check = $1 WHERE id = 1")
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ─── Directory ──────────────────────────────────────────────────────────

    async fn list_companies(&self) -> EngineResult<Vec<Company>> {
        let companies = sqlx::query_as::<_, Company>(
            "SELECT id, name, created_at FROM companies ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(companies)
    }

    async fn find_company(&self, id: Uuid) -> EngineResult<Option<Company>> {
        let company = sqlx::query_as::<_, Company>(
            "SELECT id, name, created_at FROM companies WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(company)
    }

    async fn active_company_users(&self, company_id: Uuid) -> EngineResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, email, name, role, company_id, is_active
             FROM users
             WHERE company_id = $1 AND role = 'company' AND is_active = TRUE
             ORDER BY email",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn active_admin_emails(&self) -> EngineResult<Vec<String>> {
        let emails: Vec<String> = sqlx::query_scalar(
            "SELECT email FROM users WHERE role = 'admin' AND is_active = TRUE ORDER BY email",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(emails)
    }

    async fn find_measure_template(&self, id: Uuid) -> EngineResult<Option<MeasureTemplate>> {
        #[allow(clippy::type_complexity)]
        let row: Option<(
            Uuid,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
        )> = sqlx::query_as(
            "SELECT id, name, detail, target, departments, responsible, participants
             FROM measures WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, name, detail, target, departments, responsible, participants)) = row else {
            return Ok(None);
        };

        let steps = sqlx::query_as::<_, StepTemplate>(
            "SELECT id, measure_id, title, step_order
             FROM measure_steps WHERE measure_id = $1
             ORDER BY step_order, title",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(MeasureTemplate {
            id,
            name,
            detail,
            target,
            departments,
            responsible,
            participants,
            steps,
        }))
    }

    // ─── Assignments ────────────────────────────────────────────────────────

    async fn create_assignment(
        &self,
        new: &NewAssignment,
        steps: &[NewStep],
    ) -> EngineResult<Assignment> {
        let mut tx = self.pool.begin().await?;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO assignments
                (company_id, measure_id, status, urgency, start_date, end_date, due_at,
                 target, departments, responsible, participants)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING id",
        )
        .bind(new.company_id)
        .bind(new.measure_id)
        .bind(new.status.as_str())
        .bind(new.urgency)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(new.due_at)
        .bind(&new.target)
        .bind(&new.departments)
        .bind(&new.responsible)
        .bind(&new.participants)
        .fetch_one(&mut *tx)
        .await?;

        for step in steps {
            sqlx::query(
                "INSERT INTO assignment_steps (assignment_id, title, step_order)
                 VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(&step.title)
            .bind(step.step_order)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS}
             FROM assignments a JOIN measures m ON m.id = a.measure_id
             WHERE a.id = $1"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn find_assignment(&self, id: Uuid) -> EngineResult<Option<Assignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS}
             FROM assignments a JOIN measures m ON m.id = a.measure_id
             WHERE a.id = $1 AND a.deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Assignment::try_from).transpose()
    }

    async fn find_live_assignment(
        &self,
        company_id: Uuid,
        measure_id: Uuid,
    ) -> EngineResult<Option<Assignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS}
             FROM assignments a JOIN measures m ON m.id = a.measure_id
             WHERE a.company_id = $1 AND a.measure_id = $2 AND a.deleted_at IS NULL
             LIMIT 1"
        ))
        .bind(company_id)
        .bind(measure_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Assignment::try_from).transpose()
    }

    async fn soft_delete_assignment(
        &self,
        id: Uuid,
        deleted_by: Uuid,
        at: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let result = sqlx::query(
            "UPDATE assignments SET deleted_at = $2, deleted_by = $3, updated_at = $2
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .bind(deleted_by)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_assignments(&self, company_id: Option<Uuid>) -> EngineResult<Vec<Assignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS}
             FROM assignments a JOIN measures m ON m.id = a.measure_id
             WHERE a.deleted_at IS NULL AND ($1::uuid IS NULL OR a.company_id = $1)
             ORDER BY a.due_at NULLS LAST, m.name"
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn assignments_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<Vec<Assignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS}
             FROM assignments a JOIN measures m ON m.id = a.measure_id
             WHERE a.deleted_at IS NULL
               AND a.status <> 'completed'
               AND a.due_at >= $1 AND a.due_at < $2
             ORDER BY a.due_at"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn assignments_with_status(
        &self,
        status: AssignmentStatus,
    ) -> EngineResult<Vec<Assignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS}
             FROM assignments a JOIN measures m ON m.id = a.measure_id
             WHERE a.deleted_at IS NULL AND a.status = $1
             ORDER BY a.created_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn list_steps(&self, assignment_id: Uuid) -> EngineResult<Vec<AssignmentStep>> {
        let rows = sqlx::query_as::<_, StepRow>(
            "SELECT id, assignment_id, title, step_order, is_completed, completed_at
             FROM assignment_steps WHERE assignment_id = $1
             ORDER BY step_order, title",
        )
        .bind(assignment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AssignmentStep::from).collect())
    }

    async fn find_step(&self, step_id: Uuid) -> EngineResult<Option<AssignmentStep>> {
        let row = sqlx::query_as::<_, StepRow>(
            "SELECT id, assignment_id, title, step_order, is_completed, completed_at
             FROM assignment_steps WHERE id = $1",
        )
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AssignmentStep::from))
    }

    async fn save_step_and_status(&self, step: &AssignmentStep) -> EngineResult<AssignmentStatus> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises against assistance requests and other toggles.
        let current: String = sqlx::query_scalar(
            "SELECT status FROM assignments WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(step.assignment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| EngineError::not_found("assignment", step.assignment_id))?;
        let current: AssignmentStatus = current.parse().map_err(decode_err)?;

        sqlx::query(
            "UPDATE assignment_steps SET is_completed = $2, completed_at = $3 WHERE id = $1",
        )
        .bind(step.id)
        .bind(step.is_completed)
        .bind(step.completed_at)
        .execute(&mut *tx)
        .await?;

        let steps: Vec<AssignmentStep> = sqlx::query_as::<_, StepRow>(
            "SELECT id, assignment_id, title, step_order, is_completed, completed_at
             FROM assignment_steps WHERE assignment_id = $1",
        )
        .bind(step.assignment_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(AssignmentStep::from)
        .collect();
        let derived = status::derive(current, &steps);

        if derived != current {
            sqlx::query("UPDATE assignments SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(step.assignment_id)
                .bind(derived.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(derived)
    }

    // ─── Assistance requests ────────────────────────────────────────────────

    async fn find_assistance_request(&self, id: Uuid) -> EngineResult<Option<AssistanceRequest>> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM assistance_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AssistanceRequest::try_from).transpose()
    }

    async fn open_request_for(
        &self,
        assignment_id: Uuid,
    ) -> EngineResult<Option<AssistanceRequest>> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM assistance_requests
             WHERE assignment_id = $1 AND decision = 'open'"
        ))
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AssistanceRequest::try_from).transpose()
    }

    async fn insert_assistance_request(
        &self,
        new: &NewAssistanceRequest,
        status: Option<AssignmentStatus>,
    ) -> EngineResult<AssistanceRequest> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "INSERT INTO assistance_requests (assignment_id, requested_by, prev_status, requested_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(new.assignment_id)
        .bind(new.requested_by)
        .bind(new.prev_status.map(|s| s.as_str()))
        .bind(new.requested_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e, Some(new.assignment_id), OPEN_REQUEST_KEY))?;

        if let Some(status) = status {
            sqlx::query("UPDATE assignments SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(new.assignment_id)
                .bind(status.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        row.try_into()
    }

    async fn close_assistance_request(
        &self,
        id: Uuid,
        decision: Decision,
        decided_by: Option<Uuid>,
        at: DateTime<Utc>,
        notes: Option<&str>,
        status: AssignmentStatus,
    ) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;

        let assignment_id: Option<Uuid> = sqlx::query_scalar(
            "UPDATE assistance_requests
             SET decision = $2, decided_by = $3, decided_at = $4, notes = $5
             WHERE id = $1 AND decision = 'open'
             RETURNING assignment_id",
        )
        .bind(id)
        .bind(decision.as_str())
        .bind(decided_by)
        .bind(at)
        .bind(notes)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(assignment_id) = assignment_id else {
            return Err(EngineError::InvalidState(
                "Assistance request is no longer open".into(),
            ));
        };

        sqlx::query("UPDATE assignments SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(assignment_id)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_open_requests(&self) -> EngineResult<Vec<AssistanceRequest>> {
        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {LIVE_REQUEST_COLUMNS} FROM {LIVE_REQUESTS}
             WHERE r.decision = 'open'
             ORDER BY r.requested_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn list_decided_requests(&self, limit: i64) -> EngineResult<Vec<AssistanceRequest>> {
        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {LIVE_REQUEST_COLUMNS} FROM {LIVE_REQUESTS}
             WHERE r.decision <> 'open'
             ORDER BY r.decided_at DESC NULLS LAST
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn count_open_requests_since(&self, since: DateTime<Utc>) -> EngineResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {LIVE_REQUESTS}
             WHERE r.decision = 'open' AND r.requested_at >= $1"
        ))
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ─── Notifications ──────────────────────────────────────────────────────

    async fn notification_exists(&self, assignment_id: Uuid, kind: &str) -> EngineResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM notifications WHERE assignment_id = $1 AND kind = $2)",
        )
        .bind(assignment_id)
        .bind(kind)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn find_notification(&self, id: Uuid) -> EngineResult<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Notification::from))
    }

    async fn find_notification_by_kind(
        &self,
        assignment_id: Uuid,
        kind: &str,
    ) -> EngineResult<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE assignment_id = $1 AND kind = $2"
        ))
        .bind(assignment_id)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Notification::from))
    }

    async fn insert_notification(&self, new: &NewNotification) -> EngineResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications
                (company_id, user_id, assignment_id, kind, subject, body, notify_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(new.company_id)
        .bind(new.user_id)
        .bind(new.assignment_id)
        .bind(&new.kind)
        .bind(&new.subject)
        .bind(&new.body)
        .bind(new.notify_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, new.assignment_id, &new.kind))?;
        Ok(row.into())
    }

    async fn refresh_notification(
        &self,
        id: Uuid,
        subject: &str,
        body: &str,
        notify_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        sqlx::query(
            "UPDATE notifications
             SET subject = $2, body = $3, notify_at = $4, read_at = NULL
             WHERE id = $1",
        )
        .bind(id)
        .bind(subject)
        .bind(body)
        .bind(notify_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unsent_notification_ids(&self, kind: &str) -> EngineResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM notifications WHERE kind = $1 AND email_sent_at IS NULL",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn mark_email_sent(&self, ids: &[Uuid], at: DateTime<Utc>) -> EngineResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE notifications SET email_sent_at = $2
             WHERE id = ANY($1) AND email_sent_at IS NULL",
        )
        .bind(ids)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> EngineResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = $2 WHERE id = $1 AND read_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, company_id: Uuid, at: DateTime<Utc>) -> EngineResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = $2 WHERE company_id = $1 AND read_at IS NULL",
        )
        .bind(company_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn unread_notifications(&self, company_id: Uuid) -> EngineResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE company_id = $1 AND read_at IS NULL
             ORDER BY notify_at DESC"
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }

    // ─── Activity ───────────────────────────────────────────────────────────

    async fn log_activity(&self, entry: &ActivityEntry) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO activity_logs (user_id, action, entity_type, entity_id, details, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.details)
        .bind(entry.at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
