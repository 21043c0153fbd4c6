use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WonderError>;

#[derive(Debug, Error)]
pub enum WonderError {
    /// Connection-level failure from the HTTP client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// Retryable failures kept happening until the attempt cap was hit.
    #[error("gave up after {attempts} attempts: {last}")]
    RetryLimit { attempts: u32, last: String },

    /// The server sent an explicit `error` envelope. `partial` is the text
    /// streamed before it.
    #[error("{message}")]
    Server { message: String, partial: String },

    /// The byte stream broke before a terminal envelope arrived.
    #[error("stream interrupted: {reason}")]
    Interrupted { reason: String, partial: String },

    #[error("no data received for {0:?}")]
    IdleTimeout(std::time::Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("a response is already streaming")]
    Busy,

    #[error("message is empty")]
    EmptyPrompt,

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WonderError {
    /// Whether repeating the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            WonderError::Transport(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            WonderError::Status { status, .. } => is_retryable_status(*status),
            WonderError::IdleTimeout(_) => true,
            _ => false,
        }
    }

    /// Transport-class failures flip the store into the disconnected state.
    /// Client errors such as 404 do not count.
    pub fn is_transport(&self) -> bool {
        match self {
            WonderError::Status { status, .. } => is_retryable_status(*status),
            WonderError::Transport(_)
            | WonderError::RetryLimit { .. }
            | WonderError::Interrupted { .. }
            | WonderError::IdleTimeout(_) => true,
            _ => false,
        }
    }

    /// Text accumulated before the failure, if any.
    pub fn partial_content(&self) -> Option<&str> {
        match self {
            WonderError::Interrupted { partial, .. } | WonderError::Server { partial, .. }
                if !partial.is_empty() =>
            {
                Some(partial)
            }
            _ => None,
        }
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}
