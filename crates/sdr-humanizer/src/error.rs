use thiserror::Error;

#[derive(Debug, Error)]
pub enum HumanizerError {
    #[error("gateway error: {0}")]
    Gateway(String),
}

impl HumanizerError {
    pub fn code(&self) -> &'static str {
        match self {
            HumanizerError::Gateway(_) => "HUMANIZER_GATEWAY_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, HumanizerError>;
