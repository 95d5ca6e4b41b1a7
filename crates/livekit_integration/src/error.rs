use thiserror::Error;

#[derive(Debug, Error)]
pub enum LiveKitError {
    #[error("failed to sign access token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("invalid media service url '{0}'")]
    InvalidUrl(String),
    #[error("room service request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("room service request timed out")]
    Timeout,
    #[error("room service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode room service response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl From<reqwest::Error> for LiveKitError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error)
        } else {
            Self::Http(error)
        }
    }
}
