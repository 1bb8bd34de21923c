//! Token relay: the one backend route.
//!
//! Accepts `{code, code_verifier}` from the client, adds HTTP Basic
//! credentials held only here, and forwards the exchange to the provider's
//! token endpoint. Stateless; every request stands alone.

use crate::config::RelayConfig;
use crate::util;
use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

pub const CALLBACK_PATH: &str = "/auth/spotify/callback";

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub code: Option<String>,
    pub code_verifier: Option<String>,
}

#[derive(Debug)]
pub enum RelayError {
    /// `code` or `code_verifier` absent, null or empty
    MissingParameters,
    /// The provider answered with an `error` body; passed through as 400
    Provider(Value),
    /// Anything that went wrong on our side of the exchange
    Internal(String),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::MissingParameters => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Missing authorization parameters" })),
            )
                .into_response(),
            RelayError::Provider(body) => (StatusCode::BAD_REQUEST, Json(body)).into_response(),
            RelayError::Internal(msg) => {
                error!("relay failure: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

pub struct RelayState {
    client: Client,
    config: RelayConfig,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn forward(&self, code: &str, code_verifier: &str) -> Result<Value, RelayError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];
        let creds = &self.config.credentials;
        let resp = self
            .client
            .post(&self.config.token_url)
            .header(
                AUTHORIZATION,
                util::basic_auth_header(&creds.client_id, &creds.client_secret),
            )
            .form(&params)
            .send()
            .await
            .map_err(|e| RelayError::Internal(format!("token request failed: {}", e)))?;

        let status = resp.status();
        let body: Value = resp.json().await.map_err(|e| {
            RelayError::Internal(format!("non-JSON token response ({}): {}", status, e))
        })?;

        if body.get("error").is_some() {
            warn!("provider rejected exchange ({}): {}", status, body);
            return Err(RelayError::Provider(body));
        }
        if !status.is_success() {
            return Err(RelayError::Internal(format!(
                "provider returned {} without an error field",
                status
            )));
        }
        Ok(body)
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

async fn spotify_callback(
    State(state): State<Arc<RelayState>>,
    payload: Result<Json<CallbackRequest>, JsonRejection>,
) -> Result<Json<Value>, RelayError> {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!("unreadable callback body: {}", rejection);
            return Err(RelayError::MissingParameters);
        }
    };
    let (code, code_verifier) = match (non_empty(req.code), non_empty(req.code_verifier)) {
        (Some(c), Some(v)) => (c, v),
        _ => {
            warn!("missing code or verifier");
            return Err(RelayError::MissingParameters);
        }
    };
    debug!(
        "relaying code {} with verifier {}",
        util::redact(&code),
        util::redact(&code_verifier)
    );
    let body = state.forward(&code, &code_verifier).await?;
    info!("token exchange relayed");
    Ok(Json(body))
}

pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route(CALLBACK_PATH, post(spotify_callback))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind `config.bind` and serve until Ctrl-C.
pub async fn serve(config: RelayConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding relay to {}", config.bind))?;
    info!(
        "relay listening on {} (client {})",
        listener.local_addr()?,
        config.credentials.client_id
    );
    let app = router(Arc::new(RelayState::new(config)));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("relay shutting down");
        })
        .await?;
    Ok(())
}
