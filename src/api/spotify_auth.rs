use super::pkce::PkcePair;
use super::{TokenExchange, TokenResponse};
use crate::config::{Config, ExchangeMode};
use crate::error::AuthError;
use crate::session::{CredentialStore, StoredToken};
use crate::util;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Login handshake:
/// 1. `begin_login` stores a fresh PKCE verifier in session storage and returns
///    the authorization URL to send the user agent to.
/// 2. The provider redirects back to `redirect_uri?code=...`.
/// 3. `complete_login` redeems `{code, verifier}` (directly or through the
///    relay) and stores the access token in durable storage.
///
/// Nothing in memory survives the redirect; a new `AuthFlow` picks up where
/// the old one stopped by looking at storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    AwaitingRedirect,
    ExchangingCode,
    Authenticated,
    Failed { indicator: String, reason: String },
}

#[derive(Debug)]
pub enum LoginOutcome {
    /// Code redeemed and token stored.
    Authenticated { token: StoredToken, clean_url: Url },
    /// A valid token was already stored; the code was left alone.
    AlreadyAuthenticated { clean_url: Url },
}

impl LoginOutcome {
    /// Redirect URL to show after login, with the code removed.
    pub fn clean_url(&self) -> &Url {
        match self {
            LoginOutcome::Authenticated { clean_url, .. } => clean_url,
            LoginOutcome::AlreadyAuthenticated { clean_url } => clean_url,
        }
    }
}

pub struct AuthFlow {
    client_id: String,
    redirect_uri: String,
    scopes: Vec<String>,
    authorize_url: String,
    clear_verifier_on_failure: bool,
    store: CredentialStore,
    exchange: Arc<dyn TokenExchange>,
    state: AuthState,
}

impl AuthFlow {
    pub fn new(
        cfg: &Config,
        store: CredentialStore,
        exchange: Arc<dyn TokenExchange>,
    ) -> Result<Self, AuthError> {
        let state = if store.valid_token()?.is_some() {
            AuthState::Authenticated
        } else if store.code_verifier()?.is_some() {
            AuthState::AwaitingRedirect
        } else {
            AuthState::Idle
        };
        debug!("auth flow resumed in state {:?}", state);
        Ok(Self {
            client_id: cfg.client_id.clone(),
            redirect_uri: cfg.redirect_uri.clone(),
            scopes: cfg.scopes.clone(),
            authorize_url: cfg.authorize_url(),
            clear_verifier_on_failure: cfg.clear_verifier_on_failure,
            store,
            exchange,
            state,
        })
    }

    /// Flow using the exchange path selected by `exchange_mode`.
    pub fn from_config(cfg: &Config, store: CredentialStore) -> Result<Self, AuthError> {
        Self::new(cfg, store, exchange_for(cfg))
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Start a login attempt; the returned URL is where the user agent must go.
    pub fn begin_login(&mut self) -> Result<Url, AuthError> {
        let pkce = PkcePair::generate()?;
        self.store.save_code_verifier(pkce.verifier.as_str())?;

        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| AuthError::Environment(format!("invalid authorize url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("code_challenge_method", "S256")
            .append_pair("code_challenge", pkce.challenge.as_str());

        info!("login started; awaiting redirect to {}", self.redirect_uri);
        self.state = AuthState::AwaitingRedirect;
        Ok(url)
    }

    /// Handle the redirect back from the provider.
    pub async fn complete_login(&mut self, callback: &Url) -> Result<LoginOutcome, AuthError> {
        let clean_url = util::strip_query(callback);

        if self.store.valid_token()?.is_some() {
            debug!("access token already present; skipping code exchange");
            self.state = AuthState::Authenticated;
            return Ok(LoginOutcome::AlreadyAuthenticated { clean_url });
        }

        if let Some(error) = util::query_param(callback, "error") {
            let description = util::query_param(callback, "error_description");
            return Err(self.fail(AuthError::Provider {
                error,
                description,
                body: None,
            }));
        }

        let code = match util::query_param(callback, "code") {
            Some(c) => c,
            None => return Err(self.fail(AuthError::MissingParameter("code"))),
        };
        let verifier = match self.store.code_verifier()? {
            Some(v) => v,
            None => return Err(self.fail(AuthError::MissingParameter("code_verifier"))),
        };

        self.state = AuthState::ExchangingCode;
        info!(
            "exchanging authorization code {} via {}",
            util::redact(&code),
            self.exchange.name()
        );
        let tr = match self.exchange.exchange(&code, &verifier).await {
            Ok(tr) => tr,
            Err(e) => return Err(self.fail(e)),
        };

        let token = StoredToken {
            access_token: tr.access_token,
            token_type: tr.token_type,
            // provider-supplied; clamp instead of overflowing
            expires_at: Utc::now()
                .timestamp()
                .saturating_add(tr.expires_in.unwrap_or(3600).max(0)),
            refresh_token: tr.refresh_token,
            scope: tr.scope,
        };
        self.store.save_token(&token)?;
        self.store.clear_code_verifier()?;
        self.state = AuthState::Authenticated;
        info!("login complete");
        Ok(LoginOutcome::Authenticated { token, clean_url })
    }

    pub fn logout(&mut self) -> Result<(), AuthError> {
        self.store.logout()?;
        self.state = AuthState::Idle;
        info!("logged out");
        Ok(())
    }

    fn fail(&mut self, err: AuthError) -> AuthError {
        warn!("login failed: {}", err);
        let exchange_failed = !matches!(err, AuthError::MissingParameter(_));
        if exchange_failed && self.clear_verifier_on_failure {
            if let Err(e) = self.store.clear_code_verifier() {
                warn!("could not clear code verifier: {:#}", e);
            }
        }
        self.state = AuthState::Failed {
            indicator: err.indicator().to_string(),
            reason: err.to_string(),
        };
        err
    }
}

pub fn exchange_for(cfg: &Config) -> Arc<dyn TokenExchange> {
    match cfg.exchange_mode {
        ExchangeMode::Direct => Arc::new(DirectExchange::new(cfg)),
        ExchangeMode::Relay => Arc::new(RelayExchange::new(cfg.relay_url.clone())),
    }
}

/// PKCE-only exchange against the provider's token endpoint; no client secret.
pub struct DirectExchange {
    client: Client,
    token_url: String,
    client_id: String,
    redirect_uri: String,
}

impl DirectExchange {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            token_url: cfg.token_url(),
            client_id: cfg.client_id.clone(),
            redirect_uri: cfg.redirect_uri.clone(),
        }
    }
}

#[async_trait]
impl TokenExchange for DirectExchange {
    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<TokenResponse, AuthError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];
        let resp = self.client.post(&self.token_url).form(&params).send().await?;
        read_token_response(resp).await
    }

    fn name(&self) -> &str {
        "direct"
    }
}

/// Exchange through the relay, which holds the client secret.
pub struct RelayExchange {
    client: Client,
    relay_url: String,
}

impl RelayExchange {
    pub fn new(relay_url: String) -> Self {
        Self {
            client: Client::new(),
            relay_url,
        }
    }
}

#[async_trait]
impl TokenExchange for RelayExchange {
    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<TokenResponse, AuthError> {
        let body = json!({ "code": code, "code_verifier": code_verifier });
        let resp = self.client.post(&self.relay_url).json(&body).send().await?;
        read_token_response(resp).await
    }

    fn name(&self) -> &str {
        "relay"
    }
}

/// Classify a token endpoint (or relay) response.
/// 5xx is a transport failure even when the body carries an `error` field,
/// so a broken relay is not mistaken for rejected credentials.
async fn read_token_response(resp: reqwest::Response) -> Result<TokenResponse, AuthError> {
    let status = resp.status();
    let text = resp.text().await?;
    if status.is_server_error() {
        return Err(AuthError::Transport(format!(
            "token endpoint returned {} => {}",
            status, text
        )));
    }
    let body: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| AuthError::Transport(format!("non-JSON token response ({}): {}", status, e)))?;

    if let Some(error) = body.get("error") {
        let error = error
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| error.to_string());
        let description = body
            .get("error_description")
            .and_then(|v| v.as_str())
            .map(String::from);
        return Err(AuthError::Provider {
            error,
            description,
            body: Some(body),
        });
    }
    if !status.is_success() {
        return Err(AuthError::Provider {
            error: format!("http_{}", status.as_u16()),
            description: None,
            body: Some(body),
        });
    }
    serde_json::from_value(body)
        .map_err(|e| AuthError::Transport(format!("malformed token response: {}", e)))
}
