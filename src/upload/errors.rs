use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: status code {status_code}, message: {message}")]
    ServerError {
        status_code: u16,
        message: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upload session expired or unknown, a fresh upload is required")]
    SessionExpired,

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("Retry limit exceeded")]
    RetryLimitExceeded,

    #[error("State file error: {0}")]
    StateFile(#[from] serde_json::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Param error: {0}")]
    ParamError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl UploadError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status_code,
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// 分片级重试只针对瞬时错误；校验 / 会话失效 / 取消不重试
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Io(_) => true,
            Self::ServerError { status_code, .. } => {
                *status_code >= 500 || *status_code == 429
            }
            _ => false,
        }
    }
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
