use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("media download failed: {0}")]
    MediaDownloadFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ChannelError {
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::SendFailed(_) => "CHANNEL_SEND_FAILED",
            ChannelError::MediaDownloadFailed(_) => "CHANNEL_MEDIA_DOWNLOAD_FAILED",
            ChannelError::AuthFailed(_) => "CHANNEL_AUTH_FAILED",
            ChannelError::Timeout { .. } => "CHANNEL_TIMEOUT",
            ChannelError::ConfigError(_) => "CHANNEL_CONFIG_ERROR",
            ChannelError::Http(_) => "CHANNEL_HTTP_ERROR",
        }
    }
}

impl From<ChannelError> for sdr_humanizer::HumanizerError {
    fn from(e: ChannelError) -> Self {
        sdr_humanizer::HumanizerError::Gateway(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
