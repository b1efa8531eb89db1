use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    db::Store,
    error::{EngineError, EngineResult},
    models::notification::{
        Inbox, NewNotification, Notification, OverdueItem, KIND_TEST_EMAIL,
    },
    services::{
        email::{text_to_html, wrap_html, BulkMailer, MailJob},
        metrics,
        overdue::assignment_is_overdue,
    },
};

#[derive(Debug, Clone, Serialize)]
pub struct TestEmailOutcome {
    pub recipients: usize,
    pub notifications: usize,
    pub sent: usize,
}

pub struct NotificationService;

impl NotificationService {
    /// Create the notification unless one already exists for `(assignment_id, kind)`.
    ///
    /// Returns `None` when the key was taken, either by the pre-check or by a
    /// concurrent writer tripping the unique constraint.
    pub async fn create_once(
        store: &dyn Store,
        new: &NewNotification,
    ) -> EngineResult<Option<Notification>> {
        if let Some(assignment_id) = new.assignment_id {
            if store.notification_exists(assignment_id, &new.kind).await? {
                debug!("Notification {} already exists for {assignment_id}", new.kind);
                return Ok(None);
            }
        }

        match store.insert_notification(new).await {
            Ok(n) => {
                metrics::notification_created(&n.kind);
                Ok(Some(n))
            }
            Err(e) if e.is_duplicate() => {
                debug!("Lost race creating {} for {:?}", new.kind, new.assignment_id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Create the notification, or rewrite the existing `(assignment_id, kind)` row
    /// and flag it unread again.
    pub async fn create_or_refresh(
        store: &dyn Store,
        new: &NewNotification,
    ) -> EngineResult<Notification> {
        if let Some(created) = Self::create_once(store, new).await? {
            return Ok(created);
        }

        let assignment_id = new.assignment_id.ok_or_else(|| EngineError::DuplicateKey {
            assignment_id: None,
            kind: new.kind.clone(),
        })?;

        let existing = store
            .find_notification_by_kind(assignment_id, &new.kind)
            .await?
            .ok_or_else(|| EngineError::not_found("notification", assignment_id))?;

        store
            .refresh_notification(existing.id, &new.subject, &new.body, new.notify_at)
            .await?;

        Ok(Notification {
            subject: new.subject.clone(),
            body: new.body.clone(),
            notify_at: new.notify_at,
            read_at: None,
            ..existing
        })
    }

    /// Unread notifications plus overdue assignments, which are computed on the
    /// fly rather than stored.
    pub async fn inbox(
        store: &dyn Store,
        company_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<Inbox> {
        let notifications = store.unread_notifications(company_id).await?;

        let overdue = store
            .list_assignments(Some(company_id))
            .await?
            .into_iter()
            .filter(|a| assignment_is_overdue(a, now))
            .filter_map(|a| {
                a.due_at.map(|due_at| OverdueItem {
                    assignment_id: a.id,
                    title: format!("Overdue: {}", a.measure_name),
                    due_at,
                })
            })
            .collect();

        Ok(Inbox {
            notifications,
            overdue,
        })
    }

    /// Mark one notification read. A `company_scope` hides other companies'
    /// notifications behind `NotFound`.
    pub async fn mark_read(
        store: &dyn Store,
        id: Uuid,
        company_scope: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let notification = store
            .find_notification(id)
            .await?
            .ok_or_else(|| EngineError::not_found("notification", id))?;

        if let Some(company_id) = company_scope {
            if notification.company_id != company_id {
                return Err(EngineError::not_found("notification", id));
            }
        }

        store.mark_read(id, now).await
    }

    pub async fn mark_all_read(
        store: &dyn Store,
        company_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<u64> {
        store.mark_all_read(company_id, now).await
    }

    /// Send an ad-hoc message to every active user of a company, recording one
    /// `test_email` notification per user.
    pub async fn send_test_email(
        store: &dyn Store,
        mailer: &BulkMailer,
        company_id: Uuid,
        subject: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<TestEmailOutcome> {
        if subject.trim().is_empty() || message.trim().is_empty() {
            return Err(EngineError::Validation(
                "Subject and message are required".into(),
            ));
        }

        let company = store
            .find_company(company_id)
            .await?
            .ok_or_else(|| EngineError::not_found("company", company_id))?;
        let users = store.active_company_users(company_id).await?;

        let html = wrap_html(subject, &text_to_html(message));
        let mut created = Vec::with_capacity(users.len());
        let mut jobs = Vec::with_capacity(users.len());

        for user in &users {
            let n = store
                .insert_notification(&NewNotification {
                    company_id,
                    user_id: Some(user.id),
                    assignment_id: None,
                    kind: KIND_TEST_EMAIL.to_string(),
                    subject: subject.to_string(),
                    body: message.to_string(),
                    notify_at: now,
                })
                .await?;
            metrics::notification_created(&n.kind);
            created.push(n.id);
            jobs.push(MailJob::text(&user.email, subject, message).with_html(html.clone()));
        }

        let outcome = mailer.send_detailed(&jobs).await;
        metrics::mail_batch("test_email", outcome.sent, outcome.failed);
        if outcome.sent > 0 {
            store.mark_email_sent(&created, now).await?;
        }

        info!(
            "Test email to '{}': {} recipient(s), {} sent",
            company.name,
            users.len(),
            outcome.sent
        );

        Ok(TestEmailOutcome {
            recipients: users.len(),
            notifications: created.len(),
            sent: outcome.sent,
        })
    }
}
