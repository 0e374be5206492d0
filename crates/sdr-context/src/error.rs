use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("store error: {0}")]
    Store(#[from] sdr_store::StoreError),

    #[error("no session for phone")]
    NoSession,
}

impl ContextError {
    pub fn code(&self) -> &'static str {
        match self {
            ContextError::Store(_) => "CONTEXT_STORE_ERROR",
            ContextError::NoSession => "CONTEXT_NO_SESSION",
        }
    }
}

pub type Result<T> = std::result::Result<T, ContextError>;
