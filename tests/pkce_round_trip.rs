//! Full login against a local stub provider that only accepts a verifier
//! whose S256 challenge matches the one sent to its authorize endpoint.
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Json, Router};
use onetune::api::pkce::code_challenge_s256;
use onetune::api::spotify_auth::{AuthFlow, AuthState, LoginOutcome};
use onetune::config::{ClientCredentials, Config, RelayConfig};
use onetune::error::AuthError;
use onetune::relay;
use onetune::session::CredentialStore;
use onetune::util::query_param;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use url::Url;

const GOOD_CODE: &str = "issued-code";

#[derive(Clone, Default)]
struct StubProvider {
    /// challenge seen on the authorize request
    challenge: Arc<Mutex<Option<String>>>,
}

async fn token(
    State(stub): State<StubProvider>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let expected = stub.challenge.lock().unwrap().clone();
    let verifier = form.get("code_verifier").cloned().unwrap_or_default();
    let code_ok = form.get("code").map(String::as_str) == Some(GOOD_CODE);
    let verifier_ok = expected.as_deref() == Some(code_challenge_s256(&verifier).as_str());
    if code_ok && verifier_ok {
        (
            StatusCode::OK,
            Json(json!({
                "access_token": "stub-access-token",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "streaming"
            })),
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "code_verifier was incorrect"
            })),
        )
    }
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_provider(stub: StubProvider) -> SocketAddr {
    spawn(Router::new().route("/api/token", post(token)).with_state(stub)).await
}

/// What the provider does on the authorize step: remember the challenge and
/// redirect back with a code.
fn authorize(stub: &StubProvider, authorize_url: &Url) -> Url {
    let challenge = query_param(authorize_url, "code_challenge").expect("challenge sent");
    assert_eq!(query_param(authorize_url, "code_challenge_method").as_deref(), Some("S256"));
    *stub.challenge.lock().unwrap() = Some(challenge);
    let redirect = query_param(authorize_url, "redirect_uri").unwrap();
    Url::parse(&format!("{}?code={}", redirect, GOOD_CODE)).unwrap()
}

fn direct_config(provider: SocketAddr) -> Config {
    Config::from_toml_str(&format!(
        "client_id = \"test-client\"\nauth_base = \"http://{}\"",
        provider
    ))
    .unwrap()
}

async fn relay_config(provider: SocketAddr) -> Config {
    let base = direct_config(provider);
    let relay_cfg = RelayConfig {
        credentials: ClientCredentials {
            client_id: "cid".into(),
            client_secret: "secret".into(),
        },
        bind: "127.0.0.1:0".into(),
        token_url: base.token_url(),
        redirect_uri: base.redirect_uri.clone(),
    };
    let relay_addr = spawn(relay::router(Arc::new(relay::RelayState::new(relay_cfg)))).await;
    Config::from_toml_str(&format!(
        "client_id = \"test-client\"\nauth_base = \"http://{}\"\nexchange_mode = \"relay\"\nrelay_url = \"http://{}{}\"",
        provider,
        relay_addr,
        relay::CALLBACK_PATH
    ))
    .unwrap()
}

async fn login_succeeds(cfg: Config, stub: StubProvider) {
    let store = CredentialStore::in_memory();
    let mut flow = AuthFlow::from_config(&cfg, store.clone()).unwrap();
    let authorize_url = flow.begin_login().unwrap();
    let redirect = authorize(&stub, &authorize_url);

    let outcome = flow.complete_login(&redirect).await.expect("login");
    assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));
    assert_eq!(outcome.clean_url().as_str(), "http://127.0.0.1:5173/callback");
    assert_eq!(*flow.state(), AuthState::Authenticated);
    assert_eq!(
        store.valid_token().unwrap().unwrap().access_token,
        "stub-access-token"
    );
    assert!(store.code_verifier().unwrap().is_none());
}

async fn tampered_verifier_is_rejected(cfg: Config, stub: StubProvider) {
    let store = CredentialStore::in_memory();
    let mut flow = AuthFlow::from_config(&cfg, store.clone()).unwrap();
    let authorize_url = flow.begin_login().unwrap();
    let redirect = authorize(&stub, &authorize_url);

    let mut verifier = store.code_verifier().unwrap().unwrap();
    let last = verifier.pop().unwrap();
    verifier.push(if last == 'a' { 'b' } else { 'a' });
    store.save_code_verifier(&verifier).unwrap();

    let err = flow.complete_login(&redirect).await.unwrap_err();
    match &err {
        AuthError::Provider { error, .. } => assert_eq!(error, "invalid_grant"),
        other => panic!("expected provider error, got {:?}", other),
    }
    assert!(matches!(flow.state(), AuthState::Failed { .. }));
    assert!(store.token().unwrap().is_none());
    // kept for a retry in the same session
    assert_eq!(store.code_verifier().unwrap(), Some(verifier));
}

#[tokio::test]
async fn direct_login_round_trip() {
    let stub = StubProvider::default();
    let provider = spawn_provider(stub.clone()).await;
    login_succeeds(direct_config(provider), stub).await;
}

#[tokio::test]
async fn direct_login_with_tampered_verifier() {
    let stub = StubProvider::default();
    let provider = spawn_provider(stub.clone()).await;
    tampered_verifier_is_rejected(direct_config(provider), stub).await;
}

#[tokio::test]
async fn relay_login_round_trip() {
    let stub = StubProvider::default();
    let provider = spawn_provider(stub.clone()).await;
    login_succeeds(relay_config(provider).await, stub).await;
}

#[tokio::test]
async fn relay_login_with_tampered_verifier() {
    let stub = StubProvider::default();
    let provider = spawn_provider(stub.clone()).await;
    tampered_verifier_is_rejected(relay_config(provider).await, stub).await;
}
