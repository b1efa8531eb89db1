use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// DB row struct — role is fetched as TEXT and parsed into [`super::auth::UserRole`] where needed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    pub company_id: Option<Uuid>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StepTemplate {
    pub id: Uuid,
    pub measure_id: Uuid,
    pub title: String,
    pub step_order: i32,
}

/// Administrator-defined measure that assignments are cloned from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureTemplate {
    pub id: Uuid,
    pub name: String,
    pub detail: Option<String>,
    pub target: Option<String>,
    pub departments: Option<String>,
    pub responsible: Option<String>,
    pub participants: Option<String>,
    pub steps: Vec<StepTemplate>,
}

/// Append-only activity record.
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub details: serde_json::Value,
    pub at: DateTime<Utc>,
}
