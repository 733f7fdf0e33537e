use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limit exceeded, please retry in a moment")]
    RateLimited,

    #[error("Payment required, please add credits to your workspace")]
    PaymentRequired,

    #[error("File is too large for the transcription provider, import an SRT file manually instead")]
    FileTooLarge,

    #[error("Function error: status code {status_code}, message: {message}")]
    Function {
        status_code: u16,
        message: String,
    },

    #[error("Malformed payload: {0}")]
    Payload(String),

    #[error("Param error: {0}")]
    ParamError(String),
}

impl ApiError {
    pub fn function_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::Function {
            status_code,
            message: message.into(),
        }
    }
}

/// Error alias
pub type Result<T, E = ApiError> = std::result::Result<T, E>;
