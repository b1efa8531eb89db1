use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{db::Store, models::company::ActivityEntry};

pub fn entry(
    user_id: Option<Uuid>,
    action: &str,
    entity_type: &str,
    entity_id: Uuid,
    details: serde_json::Value,
    at: DateTime<Utc>,
) -> ActivityEntry {
    ActivityEntry {
        user_id,
        action: action.to_string(),
        entity_type: entity_type.to_string(),
        entity_id,
        details,
        at,
    }
}

/// Append an activity row. Never propagates errors (logs a warning on failure).
pub async fn record(store: &dyn Store, entry: ActivityEntry) {
    if let Err(e) = store.log_activity(&entry).await {
        tracing::warn!(
            "activity log insert failed for {} {}: {e}",
            entry.entity_type,
            entry.entity_id
        );
    }
}
