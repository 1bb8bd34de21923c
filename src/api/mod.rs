pub mod lyrics;
pub mod mock;
pub mod pkce;
pub mod spotify;
pub mod spotify_auth;

use crate::error::AuthError;
use serde::{Deserialize, Serialize};

/// Success contract of a code exchange, shared by the direct and relay paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".into()
}

/// Redeems an authorization code plus PKCE verifier for an access token.
/// Implementations: spotify_auth::DirectExchange, spotify_auth::RelayExchange, mock::MockExchange.
#[async_trait::async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<TokenResponse, AuthError>;

    /// Name of the path taken (for logging)
    fn name(&self) -> &str;
}
