use reqwest::StatusCode;
use thiserror::Error as ThisError;

use super::IsRetryable;
use super::oauth::OauthError;

/// Internal error taxonomy (§7). Dialect-specific wire bodies are built
/// separately by `error::envelope`, since the same internal failure renders
/// differently depending on which public endpoint the caller hit.
#[derive(Debug, ThisError)]
pub enum GatewayError {
    #[error("Upstream error with status: {0}")]
    UpstreamStatus(StatusCode),

    #[error(transparent)]
    Oauth(#[from] OauthError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Stream protocol error: {0}")]
    StreamProtocol(String),

    #[error("Missing access token; refresh first")]
    MissingAccessToken,

    #[error("Missing expiry; refresh first")]
    MissingExpiry,

    #[error("Credential refresh failed: {0}")]
    CredentialRefreshFailed(String),

    #[error("No available credential")]
    NoAvailableCredential,

    #[error("Actor error: {0}")]
    Actor(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl IsRetryable for GatewayError {
    fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Reqwest(_) => true,
            GatewayError::UpstreamStatus(status) => matches!(
                *status,
                StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::UNAUTHORIZED
                    | StatusCode::FORBIDDEN
                    | StatusCode::NOT_FOUND
            ),
            GatewayError::Oauth(inner) => inner.is_retryable(),
            GatewayError::Validation(_) => false,
            _ => false,
        }
    }
}

/// Maps an internal error to the (status, message) pair the dispatch engine
/// writes when the retry budget is exhausted (§4.6 terminal outcome).
impl GatewayError {
    pub fn terminal_status(&self) -> StatusCode {
        match self {
            GatewayError::UpstreamStatus(status) => *status,
            GatewayError::NoAvailableCredential => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Oauth(OauthError::UpstreamStatus(status)) => *status,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}
