use uuid::Uuid;

/// Errors raised by the assignment, assistance and scheduling services.
///
/// Only [`EngineError::Persistence`] is fatal to a sweep; every other variant is
/// either expected ([`EngineError::DuplicateKey`]) or surfaced to the caller as
/// a user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("notification '{kind}' already exists for assignment {assignment_id:?}")]
    DuplicateKey {
        assignment_id: Option<Uuid>,
        kind: String,
    },

    #[error("{0}")]
    InvalidState(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        EngineError::NotFound { entity, id }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, EngineError::DuplicateKey { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
