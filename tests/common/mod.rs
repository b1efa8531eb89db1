#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use measures_api::{
    db::{store::OPEN_REQUEST_KEY, Store},
    error::{EngineError, EngineResult},
    models::{
        assignment::{Assignment, AssignmentStatus, AssignmentStep, NewAssignment, NewStep},
        assistance::{AssistanceRequest, Decision, NewAssistanceRequest},
        company::{ActivityEntry, Company, MeasureTemplate, StepTemplate, User},
        notification::{NewNotification, Notification},
        settings::{NotificationConfig, SystemSettings},
    },
    services::{
        email::{BulkMailer, MailConnection, MailError, MailJob, MailTransport},
        status,
    },
};

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

// ─── In-memory store ─────────────────────────────────────────────────────────

#[derive(Default)]
struct State {
    notification_config: Option<NotificationConfig>,
    system_settings: Option<SystemSettings>,
    companies: Vec<Company>,
    users: Vec<User>,
    measures: Vec<MeasureTemplate>,
    assignments: Vec<Assignment>,
    steps: Vec<AssignmentStep>,
    requests: Vec<AssistanceRequest>,
    notifications: Vec<Notification>,
    activity: Vec<ActivityEntry>,
    stale_existence_checks: bool,
    settings_unavailable: bool,
}

/// `Store` backed by vectors, enforcing the same unique keys as the schema.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_company(&self, name: &str) -> Company {
        let company = Company {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: at(2025, 1, 1, 0, 0),
        };
        self.state.lock().unwrap().companies.push(company.clone());
        company
    }

    pub fn add_user(&self, company_id: Option<Uuid>, role: &str, email: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.into(),
            name: None,
            role: role.into(),
            company_id,
            is_active: true,
        };
        self.state.lock().unwrap().users.push(user.clone());
        user
    }

    pub fn deactivate_user(&self, id: Uuid) {
        let mut state = self.state.lock().unwrap();
        for u in state.users.iter_mut().filter(|u| u.id == id) {
            u.is_active = false;
        }
    }

    pub fn add_measure(&self, name: &str, steps: &[&str]) -> MeasureTemplate {
        let id = Uuid::new_v4();
        let template = MeasureTemplate {
            id,
            name: name.into(),
            detail: None,
            target: Some("Cut by 10%".into()),
            departments: Some("Operations".into()),
            responsible: None,
            participants: None,
            steps: steps
                .iter()
                .enumerate()
                .map(|(i, title)| StepTemplate {
                    id: Uuid::new_v4(),
                    measure_id: id,
                    title: (*title).into(),
                    step_order: i as i32 + 1,
                })
                .collect(),
        };
        self.state.lock().unwrap().measures.push(template.clone());
        template
    }

    /// Insert an assignment directly, bypassing the assignment service.
    /// `steps` are `(title, completed)` pairs.
    pub fn add_assignment(
        &self,
        company_id: Uuid,
        name: &str,
        status: AssignmentStatus,
        due_at: Option<DateTime<Utc>>,
        steps: &[(&str, bool)],
    ) -> Assignment {
        let measure = self.add_measure(name, &[]);
        let assignment = Assignment {
            id: Uuid::new_v4(),
            company_id,
            measure_id: measure.id,
            measure_name: name.into(),
            status,
            urgency: 1,
            start_date: None,
            end_date: due_at.map(|d| d.date_naive()),
            due_at,
            target: None,
            departments: None,
            responsible: None,
            participants: None,
            created_at: at(2025, 1, 1, 0, 0),
            deleted_at: None,
            deleted_by: None,
        };
        let mut state = self.state.lock().unwrap();
        for (i, (title, done)) in steps.iter().enumerate() {
            state.steps.push(AssignmentStep {
                id: Uuid::new_v4(),
                assignment_id: assignment.id,
                title: (*title).into(),
                step_order: i as i32 + 1,
                is_completed: *done,
                completed_at: done.then(|| at(2025, 1, 2, 0, 0)),
            });
        }
        state.assignments.push(assignment.clone());
        assignment
    }

    pub fn set_notification_config(&self, cfg: NotificationConfig) {
        self.state.lock().unwrap().notification_config = Some(cfg);
    }

    pub fn set_system_settings(&self, settings: SystemSettings) {
        self.state.lock().unwrap().system_settings = Some(settings);
    }

    /// Make `notification_exists` always answer false, as a concurrent
    /// sweep would see it before the other one commits. Inserts still collide.
    pub fn stale_existence_checks(&self) {
        self.state.lock().unwrap().stale_existence_checks = true;
    }

    /// Make `load_system_settings` fail like a dropped connection.
    pub fn settings_unavailable(&self) {
        self.state.lock().unwrap().settings_unavailable = true;
    }

    pub fn system_settings(&self) -> SystemSettings {
        self.state
            .lock()
            .unwrap()
            .system_settings
            .clone()
            .unwrap_or_default()
    }

    pub fn assignment(&self, id: Uuid) -> Assignment {
        self.state
            .lock()
            .unwrap()
            .assignments
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .unwrap()
    }

    pub fn steps_of(&self, assignment_id: Uuid) -> Vec<AssignmentStep> {
        let mut steps: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .steps
            .iter()
            .filter(|s| s.assignment_id == assignment_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_order);
        steps
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state.lock().unwrap().notifications.clone()
    }

    pub fn notifications_of_kind(&self, kind: &str) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }

    pub fn requests_for(&self, assignment_id: Uuid) -> Vec<AssistanceRequest> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.assignment_id == assignment_id)
            .cloned()
            .collect()
    }

    pub fn activity_actions(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .activity
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }
}

fn live(a: &Assignment) -> bool {
    a.deleted_at.is_none()
}

impl State {
    fn on_live_assignment(&self, r: &AssistanceRequest) -> bool {
        self.assignments
            .iter()
            .any(|a| a.id == r.assignment_id && live(a))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_notification_config(&self) -> EngineResult<NotificationConfig> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .notification_config
            .get_or_insert_with(NotificationConfig::default)
            .clone())
    }

    async fn save_notification_config(&self, cfg: &NotificationConfig) -> EngineResult<()> {
        self.state.lock().unwrap().notification_config = Some(cfg.clone());
        Ok(())
    }

    async fn load_system_settings(&self) -> EngineResult<SystemSettings> {
        let mut state = self.state.lock().unwrap();
        if state.settings_unavailable {
            return Err(EngineError::Persistence(sqlx::Error::PoolTimedOut));
        }
        Ok(state
            .system_settings
            .get_or_insert_with(SystemSettings::default)
            .clone())
    }

    async fn save_system_settings(&self, settings: &SystemSettings) -> EngineResult<()> {
        self.state.lock().unwrap().system_settings = Some(settings.clone());
        Ok(())
    }

    async fn stamp_progress_report_sent(&self, at: DateTime<Utc>) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .system_settings
            .get_or_insert_with(SystemSettings::default)
            .last_progress_report_sent = Some(at);
        Ok(())
    }

    async fn stamp_reminder_check(&self, at: DateTime<Utc>) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .system_settings
            .get_or_insert_with(SystemSettings::default)
            .last_reminder_check = Some(at);
        Ok(())
    }

    async fn list_companies(&self) -> EngineResult<Vec<Company>> {
        let mut companies = self.state.lock().unwrap().companies.clone();
        companies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(companies)
    }

    async fn find_company(&self, id: Uuid) -> EngineResult<Option<Company>> {
        let state = self.state.lock().unwrap();
        Ok(state.companies.iter().find(|c| c.id == id).cloned())
    }

    async fn active_company_users(&self, company_id: Uuid) -> EngineResult<Vec<User>> {
        let state = self.state.lock().unwrap();
        let mut users: Vec<User> = state
            .users
            .iter()
            .filter(|u| u.company_id == Some(company_id) && u.role == "company" && u.is_active)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn active_admin_emails(&self) -> EngineResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut emails: Vec<String> = state
            .users
            .iter()
            .filter(|u| u.role == "admin" && u.is_active)
            .map(|u| u.email.clone())
            .collect();
        emails.sort();
        Ok(emails)
    }

    async fn find_measure_template(&self, id: Uuid) -> EngineResult<Option<MeasureTemplate>> {
        let state = self.state.lock().unwrap();
        Ok(state.measures.iter().find(|m| m.id == id).cloned())
    }

    async fn create_assignment(
        &self,
        new: &NewAssignment,
        steps: &[NewStep],
    ) -> EngineResult<Assignment> {
        let mut state = self.state.lock().unwrap();
        let measure_name = state
            .measures
            .iter()
            .find(|m| m.id == new.measure_id)
            .map(|m| m.name.clone())
            .unwrap_or_default();
        let assignment = Assignment {
            id: Uuid::new_v4(),
            company_id: new.company_id,
            measure_id: new.measure_id,
            measure_name,
            status: new.status,
            urgency: new.urgency,
            start_date: Some(new.start_date),
            end_date: new.end_date,
            due_at: new.due_at,
            target: new.target.clone(),
            departments: new.departments.clone(),
            responsible: new.responsible.clone(),
            participants: new.participants.clone(),
            created_at: Utc::now(),
            deleted_at: None,
            deleted_by: None,
        };
        for step in steps {
            state.steps.push(AssignmentStep {
                id: Uuid::new_v4(),
                assignment_id: assignment.id,
                title: step.title.clone(),
                step_order: step.step_order,
                is_completed: false,
                completed_at: None,
            });
        }
        state.assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn find_assignment(&self, id: Uuid) -> EngineResult<Option<Assignment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .iter()
            .find(|a| a.id == id && live(a))
            .cloned())
    }

    async fn find_live_assignment(
        &self,
        company_id: Uuid,
        measure_id: Uuid,
    ) -> EngineResult<Option<Assignment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .iter()
            .find(|a| a.company_id == company_id && a.measure_id == measure_id && live(a))
            .cloned())
    }

    async fn soft_delete_assignment(
        &self,
        id: Uuid,
        deleted_by: Uuid,
        at: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let mut state = self.state.lock().unwrap();
        match state.assignments.iter_mut().find(|a| a.id == id && live(a)) {
            Some(a) => {
                a.deleted_at = Some(at);
                a.deleted_by = Some(deleted_by);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_assignments(&self, company_id: Option<Uuid>) -> EngineResult<Vec<Assignment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .iter()
            .filter(|a| live(a) && company_id.map_or(true, |c| a.company_id == c))
            .cloned()
            .collect())
    }

    async fn assignments_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<Vec<Assignment>> {
        let state = self.state.lock().unwrap();
        let mut due: Vec<Assignment> = state
            .assignments
            .iter()
            .filter(|a| live(a) && a.status != AssignmentStatus::Completed)
            .filter(|a| a.due_at.is_some_and(|d| d >= from && d < to))
            .cloned()
            .collect();
        due.sort_by_key(|a| a.due_at);
        Ok(due)
    }

    async fn assignments_with_status(
        &self,
        status: AssignmentStatus,
    ) -> EngineResult<Vec<Assignment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .iter()
            .filter(|a| live(a) && a.status == status)
            .cloned()
            .collect())
    }

    async fn list_steps(&self, assignment_id: Uuid) -> EngineResult<Vec<AssignmentStep>> {
        Ok(self.steps_of(assignment_id))
    }

    async fn find_step(&self, step_id: Uuid) -> EngineResult<Option<AssignmentStep>> {
        let state = self.state.lock().unwrap();
        Ok(state.steps.iter().find(|s| s.id == step_id).cloned())
    }

    async fn save_step_and_status(&self, step: &AssignmentStep) -> EngineResult<AssignmentStatus> {
        let mut state = self.state.lock().unwrap();
        for s in state.steps.iter_mut().filter(|s| s.id == step.id) {
            *s = step.clone();
        }
        let steps: Vec<AssignmentStep> = state
            .steps
            .iter()
            .filter(|s| s.assignment_id == step.assignment_id)
            .cloned()
            .collect();
        let Some(assignment) = state
            .assignments
            .iter_mut()
            .find(|a| a.id == step.assignment_id && live(a))
        else {
            return Err(EngineError::not_found("assignment", step.assignment_id));
        };
        assignment.status = status::derive(assignment.status, &steps);
        Ok(assignment.status)
    }

    async fn find_assistance_request(&self, id: Uuid) -> EngineResult<Option<AssistanceRequest>> {
        let state = self.state.lock().unwrap();
        Ok(state.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn open_request_for(
        &self,
        assignment_id: Uuid,
    ) -> EngineResult<Option<AssistanceRequest>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .requests
            .iter()
            .find(|r| r.assignment_id == assignment_id && r.is_open())
            .cloned())
    }

    async fn insert_assistance_request(
        &self,
        new: &NewAssistanceRequest,
        status: Option<AssignmentStatus>,
    ) -> EngineResult<AssistanceRequest> {
        let mut state = self.state.lock().unwrap();
        if state
            .requests
            .iter()
            .any(|r| r.assignment_id == new.assignment_id && r.is_open())
        {
            return Err(EngineError::DuplicateKey {
                assignment_id: Some(new.assignment_id),
                kind: OPEN_REQUEST_KEY.into(),
            });
        }
        let request = AssistanceRequest {
            id: Uuid::new_v4(),
            assignment_id: new.assignment_id,
            requested_by: new.requested_by,
            prev_status: new.prev_status,
            requested_at: new.requested_at,
            decision: Decision::Open,
            decided_by: None,
            decided_at: None,
            notes: None,
        };
        state.requests.push(request.clone());
        if let Some(status) = status {
            for a in state
                .assignments
                .iter_mut()
                .filter(|a| a.id == new.assignment_id)
            {
                a.status = status;
            }
        }
        Ok(request)
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
        let mut state = self.state.lock().unwrap();
        let Some(request) = state.requests.iter_mut().find(|r| r.id == id && r.is_open()) else {
            return Err(EngineError::InvalidState(
                "This request has already been decided".into(),
            ));
        };
        request.decision = decision;
        request.decided_by = decided_by;
        request.decided_at = Some(at);
        request.notes = notes.map(str::to_string);
        let assignment_id = request.assignment_id;
        for a in state.assignments.iter_mut().filter(|a| a.id == assignment_id) {
            a.status = status;
        }
        Ok(())
    }

    async fn list_open_requests(&self) -> EngineResult<Vec<AssistanceRequest>> {
        let state = self.state.lock().unwrap();
        let mut open: Vec<_> = state
            .requests
            .iter()
            .filter(|r| r.is_open() && state.on_live_assignment(r))
            .cloned()
            .collect();
        open.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(open)
    }

    async fn list_decided_requests(&self, limit: i64) -> EngineResult<Vec<AssistanceRequest>> {
        let state = self.state.lock().unwrap();
        let mut decided: Vec<_> = state
            .requests
            .iter()
            .filter(|r| !r.is_open() && state.on_live_assignment(r))
            .cloned()
            .collect();
        decided.sort_by(|a, b| b.decided_at.cmp(&a.decided_at));
        decided.truncate(limit.max(0) as usize);
        Ok(decided)
    }

    async fn count_open_requests_since(&self, since: DateTime<Utc>) -> EngineResult<i64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .requests
            .iter()
            .filter(|r| r.is_open() && r.requested_at >= since && state.on_live_assignment(r))
            .count() as i64)
    }

    async fn notification_exists(&self, assignment_id: Uuid, kind: &str) -> EngineResult<bool> {
        let state = self.state.lock().unwrap();
        if state.stale_existence_checks {
            return Ok(false);
        }
        Ok(state
            .notifications
            .iter()
            .any(|n| n.assignment_id == Some(assignment_id) && n.kind == kind))
    }

    async fn find_notification(&self, id: Uuid) -> EngineResult<Option<Notification>> {
        let state = self.state.lock().unwrap();
        Ok(state.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn find_notification_by_kind(
        &self,
        assignment_id: Uuid,
        kind: &str,
    ) -> EngineResult<Option<Notification>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .notifications
            .iter()
            .find(|n| n.assignment_id == Some(assignment_id) && n.kind == kind)
            .cloned())
    }

    async fn insert_notification(&self, new: &NewNotification) -> EngineResult<Notification> {
        let mut state = self.state.lock().unwrap();
        if let Some(assignment_id) = new.assignment_id {
            if state
                .notifications
                .iter()
                .any(|n| n.assignment_id == Some(assignment_id) && n.kind == new.kind)
            {
                return Err(EngineError::DuplicateKey {
                    assignment_id: Some(assignment_id),
                    kind: new.kind.clone(),
                });
            }
        }
        let notification = Notification {
            id: Uuid::new_v4(),
            company_id: new.company_id,
            user_id: new.user_id,
            assignment_id: new.assignment_id,
            kind: new.kind.clone(),
            subject: new.subject.clone(),
            body: new.body.clone(),
            notify_at: new.notify_at,
            email_sent_at: None,
            read_at: None,
        };
        state.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn refresh_notification(
        &self,
        id: Uuid,
        subject: &str,
        body: &str,
        notify_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        for n in state.notifications.iter_mut().filter(|n| n.id == id) {
            n.subject = subject.into();
            n.body = body.into();
            n.notify_at = notify_at;
            n.read_at = None;
        }
        Ok(())
    }

    async fn unsent_notification_ids(&self, kind: &str) -> EngineResult<Vec<Uuid>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .notifications
            .iter()
            .filter(|n| n.kind == kind && n.email_sent_at.is_none())
            .map(|n| n.id)
            .collect())
    }

    async fn mark_email_sent(&self, ids: &[Uuid], at: DateTime<Utc>) -> EngineResult<u64> {
        let ids: HashSet<&Uuid> = ids.iter().collect();
        let mut state = self.state.lock().unwrap();
        let mut updated = 0;
        for n in state
            .notifications
            .iter_mut()
            .filter(|n| ids.contains(&n.id) && n.email_sent_at.is_none())
        {
            n.email_sent_at = Some(at);
            updated += 1;
        }
        Ok(updated)
    }

    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> EngineResult<bool> {
        let mut state = self.state.lock().unwrap();
        match state
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.read_at.is_none())
        {
            Some(n) => {
                n.read_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, company_id: Uuid, at: DateTime<Utc>) -> EngineResult<u64> {
        let mut state = self.state.lock().unwrap();
        let mut updated = 0;
        for n in state
            .notifications
            .iter_mut()
            .filter(|n| n.company_id == company_id && n.read_at.is_none())
        {
            n.read_at = Some(at);
            updated += 1;
        }
        Ok(updated)
    }

    async fn unread_notifications(&self, company_id: Uuid) -> EngineResult<Vec<Notification>> {
        let state = self.state.lock().unwrap();
        let mut unread: Vec<_> = state
            .notifications
            .iter()
            .filter(|n| n.company_id == company_id && n.read_at.is_none())
            .cloned()
            .collect();
        unread.sort_by(|a, b| b.notify_at.cmp(&a.notify_at));
        Ok(unread)
    }

    async fn log_activity(&self, entry: &ActivityEntry) -> EngineResult<()> {
        self.state.lock().unwrap().activity.push(entry.clone());
        Ok(())
    }
}

// ─── Recording mail transport ────────────────────────────────────────────────

#[derive(Default)]
struct Outbox {
    sent: Vec<MailJob>,
    attempts: usize,
    connects: usize,
    closes: usize,
}

/// Mail transport that records every job. Recipients listed in `failing`
/// are rejected; `refuse_connect` makes every connection attempt fail.
#[derive(Default)]
pub struct RecordingTransport {
    outbox: Arc<Mutex<Outbox>>,
    failing: HashSet<String>,
    refuse_connect: bool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(recipients: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: recipients.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            refuse_connect: true,
            ..Self::default()
        })
    }

    pub fn mailer(self: &Arc<Self>) -> BulkMailer {
        BulkMailer::new(Some(self.clone() as Arc<dyn MailTransport>))
    }

    pub fn sent(&self) -> Vec<MailJob> {
        self.outbox.lock().unwrap().sent.clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent().into_iter().map(|j| j.to).collect()
    }

    pub fn attempts(&self) -> usize {
        self.outbox.lock().unwrap().attempts
    }

    pub fn connects(&self) -> usize {
        self.outbox.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.outbox.lock().unwrap().closes
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn connect(&self) -> Result<Box<dyn MailConnection>, MailError> {
        if self.refuse_connect {
            return Err(MailError::Transport("connection refused".into()));
        }
        self.outbox.lock().unwrap().connects += 1;
        Ok(Box::new(RecordingConnection {
            outbox: self.outbox.clone(),
            failing: self.failing.clone(),
        }))
    }
}

struct RecordingConnection {
    outbox: Arc<Mutex<Outbox>>,
    failing: HashSet<String>,
}

#[async_trait]
impl MailConnection for RecordingConnection {
    async fn send_one(&mut self, job: &MailJob) -> Result<(), MailError> {
        let mut outbox = self.outbox.lock().unwrap();
        outbox.attempts += 1;
        if self.failing.contains(&job.to) {
            return Err(MailError::Rejected(format!("550 mailbox unavailable: {}", job.to)));
        }
        outbox.sent.push(job.clone());
        Ok(())
    }

    async fn close(&mut self) {
        self.outbox.lock().unwrap().closes += 1;
    }
}
