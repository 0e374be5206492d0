use thiserror::Error;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("internal buffer error: {0}")]
    Internal(String),
}

impl BufferError {
    pub fn code(&self) -> &'static str {
        match self {
            BufferError::Internal(_) => "BUFFER_INTERNAL",
        }
    }
}

pub type Result<T> = std::result::Result<T, BufferError>;
