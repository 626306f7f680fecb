use thiserror::Error;

/// Maximum number of upstream body bytes kept on a status error.
pub(crate) const BODY_EXCERPT_LEN: usize = 512;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid client configuration: {0}")]
    InvalidConfiguration(String),

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("upstream transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("upstream answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream body is not valid JSON: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

impl ClientError {
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ClientError::Timeout
        } else if error.is_connect() {
            ClientError::Unreachable(error)
        } else {
            ClientError::Transport(error)
        }
    }

    pub(crate) fn status(status: u16, body: &[u8]) -> Self {
        let excerpt = &body[..body.len().min(BODY_EXCERPT_LEN)];
        ClientError::Status {
            status,
            body: String::from_utf8_lossy(excerpt).into_owned(),
        }
    }
}
