use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const KIND_ASSISTANCE_OPEN: &str = "assistance_open";
pub const KIND_ASSISTANCE_RESOLVED: &str = "assistance_resolved";
pub const KIND_TEST_EMAIL: &str = "test_email";

/// Kind of the due-soon sweep notification for a given lead time, e.g. `due_7d`.
pub fn due_kind(lead_days: i64) -> String {
    format!("due_{lead_days}d")
}

/// Kind of the per-company reminder digest entry, e.g. `reminder_7d`.
pub fn reminder_kind(days_before: i64) -> String {
    format!("reminder_{days_before}d")
}

/// A notification row. `(assignment_id, kind)` is unique whenever `assignment_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub company_id: Uuid,
    /// `None` means broadcast to the whole company.
    pub user_id: Option<Uuid>,
    pub assignment_id: Option<Uuid>,
    pub kind: String,
    pub subject: String,
    pub body: String,
    pub notify_at: DateTime<Utc>,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub company_id: Uuid,
    pub user_id: Option<Uuid>,
    pub assignment_id: Option<Uuid>,
    pub kind: String,
    pub subject: String,
    pub body: String,
    pub notify_at: DateTime<Utc>,
}

/// Overdue assignment surfaced in the company inbox without a stored row.
#[derive(Debug, Clone, Serialize)]
pub struct OverdueItem {
    pub assignment_id: Uuid,
    pub title: String,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Inbox {
    pub notifications: Vec<Notification>,
    pub overdue: Vec<OverdueItem>,
}

/// Body for POST /admin/notifications/test-email.
#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    pub company_id: Uuid,
    pub subject: String,
    pub message: String,
}
