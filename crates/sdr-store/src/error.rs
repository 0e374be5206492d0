use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Lead not found: {id}")]
    LeadNotFound { id: String },

    #[error("Follow-up not found: {id}")]
    FollowUpNotFound { id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::LeadNotFound { .. } => "LEAD_NOT_FOUND",
            StoreError::FollowUpNotFound { .. } => "FOLLOW_UP_NOT_FOUND",
            StoreError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether a caller's safe-retry policy should retry this failure:
    /// SQLite busy/locked is the only transient case this store produces.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
