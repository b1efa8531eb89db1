use chrono::{DateTime, Utc};

use crate::models::assignment::{Assignment, AssignmentStatus};

/// An assignment is overdue once its due instant has passed without completion.
pub fn is_overdue(
    status: AssignmentStatus,
    due_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match due_at {
        Some(due) => status != AssignmentStatus::Completed && due < now,
        None => false,
    }
}

pub fn assignment_is_overdue(assignment: &Assignment, now: DateTime<Utc>) -> bool {
    is_overdue(assignment.status, assignment.due_at, now)
}
