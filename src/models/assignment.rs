use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    NotStarted,
    InProgress,
    Completed,
    NeedsAssistance,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::NotStarted => "not_started",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::NeedsAssistance => "needs_assistance",
        }
    }

    /// Label used in email bodies and reports.
    pub fn label(&self) -> &'static str {
        match self {
            AssignmentStatus::NotStarted => "Not Started",
            AssignmentStatus::InProgress => "In Progress",
            AssignmentStatus::Completed => "Completed",
            AssignmentStatus::NeedsAssistance => "Needs Assistance",
        }
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AssignmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(AssignmentStatus::NotStarted),
            "in_progress" => Ok(AssignmentStatus::InProgress),
            "completed" => Ok(AssignmentStatus::Completed),
            "needs_assistance" => Ok(AssignmentStatus::NeedsAssistance),
            _ => Err(anyhow::anyhow!("Unknown assignment status: {s}")),
        }
    }
}

/// One company's instance of a measure template.
///
/// `target`, `departments`, `responsible` and `participants` are a snapshot taken
/// when the template was assigned; later template edits never touch them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub company_id: Uuid,
    pub measure_id: Uuid,
    /// Joined from the template for display; not part of the snapshot.
    pub measure_name: String,
    pub status: AssignmentStatus,
    /// 1 = low, 2 = medium, 3 = high.
    pub urgency: i16,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub due_at: Option<DateTime<Utc>>,
    pub target: Option<String>,
    pub departments: Option<String>,
    pub responsible: Option<String>,
    pub participants: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentStep {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub title: String,
    pub step_order: i32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Insert payload built by the assignment service.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub company_id: Uuid,
    pub measure_id: Uuid,
    pub status: AssignmentStatus,
    pub urgency: i16,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub due_at: Option<DateTime<Utc>>,
    pub target: Option<String>,
    pub departments: Option<String>,
    pub responsible: Option<String>,
    pub participants: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewStep {
    pub title: String,
    pub step_order: i32,
}

/// Body for POST /admin/assignments.
#[derive(Debug, Deserialize)]
pub struct AssignMeasureRequest {
    pub measure_id: Uuid,
    pub company_id: Uuid,
    pub end_date: Option<NaiveDate>,
    pub urgency: Option<i16>,
}

/// An assignment together with its ordered steps.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentDetail {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub steps: Vec<AssignmentStep>,
    pub is_overdue: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_its_own_display() {
        for s in [
            AssignmentStatus::NotStarted,
            AssignmentStatus::InProgress,
            AssignmentStatus::Completed,
            AssignmentStatus::NeedsAssistance,
        ] {
            assert_eq!(s.to_string().parse::<AssignmentStatus>().unwrap(), s);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("blocked".parse::<AssignmentStatus>().is_err());
    }
}
