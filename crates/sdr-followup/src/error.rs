use thiserror::Error;

/// Errors that can occur within the follow-up scheduler.
#[derive(Debug, Error)]
pub enum FollowupError {
    #[error("store error: {0}")]
    Store(#[from] sdr_store::StoreError),

    #[error("delivery failed: {0}")]
    Delivery(#[from] sdr_humanizer::HumanizerError),

    #[error("persona composition failed: {0}")]
    Compose(String),

    #[error("lead not found for follow-up")]
    LeadNotFound,
}

impl FollowupError {
    pub fn code(&self) -> &'static str {
        match self {
            FollowupError::Store(_) => "store_error",
            FollowupError::Delivery(_) => "delivery_failed",
            FollowupError::Compose(_) => "compose_failed",
            FollowupError::LeadNotFound => "lead_not_found",
        }
    }
}

pub type Result<T> = std::result::Result<T, FollowupError>;
