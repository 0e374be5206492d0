use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("provider error: {0}")]
    Provider(#[from] crate::provider::ProviderError),

    #[error("tool loop exceeded max_tool_hops")]
    HopsExceeded,

    #[error("turn exceeded its time budget")]
    Timeout,

    #[error("store error: {0}")]
    Store(#[from] sdr_store::StoreError),

    #[error("context error: {0}")]
    Context(#[from] sdr_context::ContextError),
}

impl AgentError {
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::Provider(_) => "provider_error",
            AgentError::HopsExceeded => "hops_exceeded",
            AgentError::Timeout => "turn_timeout",
            AgentError::Store(_) => "store_error",
            AgentError::Context(_) => "context_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
