//! Error types for the login handshake and the Web API client

use thiserror::Error;

/// Failure of a login attempt.
#[derive(Error, Debug)]
pub enum AuthError {
    /// `code` or the stored verifier is absent: no attempt is in progress
    #[error("missing {0}: no login attempt in progress")]
    MissingParameter(&'static str),

    /// The identity provider rejected the authorization or the exchange
    #[error("provider rejected the request: {error}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Provider {
        error: String,
        description: Option<String>,
        /// Response body as returned, when there was one
        body: Option<serde_json::Value>,
    },

    /// Network failure, non-JSON or malformed response, relay failure
    #[error("token exchange transport failure: {0}")]
    Transport(String),

    /// Missing confidential configuration
    #[error("environment error: {0}")]
    Environment(String),

    /// Local persistence failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// True when restarting the login is the right response.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AuthError::MissingParameter(_) | AuthError::Provider { .. })
    }

    /// Short indicator shown by the unauthenticated entry point.
    pub fn indicator(&self) -> &str {
        match self {
            AuthError::MissingParameter("code") => "no_code",
            AuthError::MissingParameter(_) => "no_verifier",
            AuthError::Provider { error, .. } if error == "access_denied" => "access_denied",
            _ => "auth_failed",
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Storage(format!("{err:#}"))
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Transport(err.to_string())
    }
}

/// Failure of a call to the Web API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No access token stored
    #[error("not logged in")]
    NotAuthenticated,

    /// The API rejected the stored token; a new login is required
    #[error("access token rejected, log in again")]
    Unauthorized,

    #[error("request failed: {status} => {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Storage(format!("{err:#}"))
    }
}
