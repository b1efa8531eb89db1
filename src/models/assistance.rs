use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::assignment::AssignmentStatus;

/// `open` is the only non-terminal decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Open,
    Resolved,
    NotResolved,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Open => "open",
            Decision::Resolved => "resolved",
            Decision::NotResolved => "not_resolved",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Decision {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Decision::Open),
            "resolved" => Ok(Decision::Resolved),
            "not_resolved" => Ok(Decision::NotResolved),
            _ => Err(anyhow::anyhow!("Unknown assistance decision: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistanceRequest {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub requested_by: Option<Uuid>,
    /// Status restored on resolution. `None` for requests synthesized by reconciliation.
    pub prev_status: Option<AssignmentStatus>,
    pub requested_at: DateTime<Utc>,
    pub decision: Decision,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl AssistanceRequest {
    pub fn is_open(&self) -> bool {
        self.decision == Decision::Open
    }
}

#[derive(Debug, Clone)]
pub struct NewAssistanceRequest {
    pub assignment_id: Uuid,
    pub requested_by: Option<Uuid>,
    pub prev_status: Option<AssignmentStatus>,
    pub requested_at: DateTime<Utc>,
}

/// Admin verdict on an open request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Resolved,
    NotResolved,
}

impl From<DecisionAction> for Decision {
    fn from(action: DecisionAction) -> Self {
        match action {
            DecisionAction::Resolved => Decision::Resolved,
            DecisionAction::NotResolved => Decision::NotResolved,
        }
    }
}

/// Body for POST /admin/assistance/{id}/decide.
#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub action: DecisionAction,
    pub notes: Option<String>,
}

/// Body for POST /admin/notifications/{id}/resolve.
#[derive(Debug, Deserialize)]
pub struct ResolveNotificationRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistanceQueue {
    pub open: Vec<AssistanceRequest>,
    pub recent: Vec<AssistanceRequest>,
    /// Requests synthesized by the reconciliation pass that ran for this view.
    pub repaired: usize,
}
