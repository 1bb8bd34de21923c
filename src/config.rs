use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// How the authorization code is redeemed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeMode {
    /// PKCE-only request from the client to the provider's token endpoint
    Direct,
    /// Forward `{code, code_verifier}` to the relay, which adds the client secret
    Relay,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Public client identifier registered with the provider.
    pub client_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    // Endpoints; overridable so tests can point at a local stub
    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_lyrics_base")]
    pub lyrics_base: String,

    #[serde(default = "default_exchange_mode")]
    pub exchange_mode: ExchangeMode,
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default = "default_relay_bind")]
    pub relay_bind: String,

    /// Drop the stored verifier when an exchange fails, forcing a fresh login.
    #[serde(default)]
    pub clear_verifier_on_failure: bool,

    #[serde(default = "default_now_playing_poll")]
    pub now_playing_poll_ms: u64,
    #[serde(default = "default_playlist_refresh")]
    pub playlist_refresh_ms: u64,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Playback device to transfer to on connect; first available otherwise.
    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_redirect_uri() -> String { "http://127.0.0.1:5173/callback".into() }
fn default_auth_base() -> String { "https://accounts.spotify.com".into() }
fn default_api_base() -> String { "https://api.spotify.com/v1".into() }
fn default_lyrics_base() -> String { "https://api.lyrics.ovh/v1".into() }
fn default_exchange_mode() -> ExchangeMode { ExchangeMode::Direct }
fn default_relay_url() -> String { "http://127.0.0.1:5000/auth/spotify/callback".into() }
fn default_relay_bind() -> String { "127.0.0.1:5000".into() }
fn default_now_playing_poll() -> u64 { 1000 }
fn default_playlist_refresh() -> u64 { 30_000 }
fn default_page_limit() -> u32 { 10 }

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("onetune")
}

fn default_db_path() -> PathBuf { data_dir().join("onetune.db") }
fn default_log_dir() -> PathBuf { data_dir().join("logs") }

fn default_scopes() -> Vec<String> {
    vec![
        "user-read-email",
        "user-read-private",
        "playlist-read-private",
        "user-library-read",
        "streaming",
        "user-read-playback-state",
        "user-modify-playback-state",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Config = toml::from_str(s)?;
        if cfg.client_id.trim().is_empty() {
            return Err(anyhow!("client_id must not be empty"));
        }
        Ok(cfg)
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/authorize", self.auth_base.trim_end_matches('/'))
    }

    pub fn token_url(&self) -> String {
        format!("{}/api/token", self.auth_base.trim_end_matches('/'))
    }
}

/// Confidential client credentials held by the relay.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Relay settings: secrets from the environment, the rest from `Config`.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub credentials: ClientCredentials,
    pub bind: String,
    pub token_url: String,
    pub redirect_uri: String,
}

pub const CLIENT_ID_VAR: &str = "SPOTIFY_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "SPOTIFY_CLIENT_SECRET";

impl RelayConfig {
    /// Read the secrets from the process environment (and `.env`), failing
    /// when either is unset or empty.
    pub fn from_env(cfg: &Config) -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(cfg, |k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(cfg: &Config, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| -> Result<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("{} is not set", name))
        };
        Ok(Self {
            credentials: ClientCredentials {
                client_id: require(CLIENT_ID_VAR)?,
                client_secret: require(CLIENT_SECRET_VAR)?,
            },
            bind: cfg.relay_bind.clone(),
            token_url: cfg.token_url(),
            redirect_uri: cfg.redirect_uri.clone(),
        })
    }
}
