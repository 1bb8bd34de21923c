use super::{TokenExchange, TokenResponse};
use crate::error::AuthError;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

/// A token exchange used in tests and offline runs.
/// It records every `{code, code_verifier}` it is handed and either issues a
/// deterministic token or rejects with `invalid_grant`.
pub struct MockExchange {
    accept: bool,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockExchange {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            accept: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TokenExchange for MockExchange {
    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<TokenResponse, AuthError> {
        info!("MockExchange: exchange code {}", code);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((code.to_string(), code_verifier.to_string()));
        }
        if !self.accept {
            return Err(AuthError::Provider {
                error: "invalid_grant".into(),
                description: Some("mock rejection".into()),
                body: None,
            });
        }
        Ok(TokenResponse {
            access_token: format!("mock-token-{}", code),
            token_type: "Bearer".into(),
            expires_in: Some(3600),
            refresh_token: None,
            scope: None,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
