use crate::config::Config;
use crate::error::ApiError;
use crate::models::{Dashboard, Device, Paging, PlaybackState, Playlist, SavedTrack, Track, UserProfile};
use crate::session::CredentialStore;
use log::{debug, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

type Result<T> = std::result::Result<T, ApiError>;

/// Spotify Web API client for the library and playback views.
/// The bearer token is read from the credential store on every call; there is
/// no refresh: a 401 clears the stored token and surfaces `ApiError::Unauthorized`.
pub struct SpotifyClient {
    client: Client,
    api_base: String,
    page_limit: u32,
    store: CredentialStore,
}

#[derive(Deserialize)]
struct DeviceList {
    devices: Vec<Device>,
}

#[derive(Deserialize)]
struct SearchResult {
    tracks: Option<Paging<Track>>,
}

impl SpotifyClient {
    pub fn new(cfg: &Config, store: CredentialStore) -> Self {
        Self {
            client: Client::new(),
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            page_limit: cfg.page_limit,
            store,
        }
    }

    fn bearer(&self) -> Result<String> {
        let token = self.store.valid_token()?.ok_or(ApiError::NotAuthenticated)?;
        Ok(token.bearer())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn check(&self, resp: Response) -> Result<Response> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("Got 401 from {}; dropping stored token", resp.url().path());
            self.store.clear_token()?;
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let bearer = self.bearer()?;
        let resp = self
            .client
            .get(self.url(path))
            .header(AUTHORIZATION, &bearer)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let resp = self.check(resp).await?;
        Ok(resp.json().await?)
    }

    async fn put(&self, path: &str, body: Option<Value>) -> Result<()> {
        let bearer = self.bearer()?;
        let mut req = self.client.put(self.url(path)).header(AUTHORIZATION, &bearer);
        req = match body {
            Some(b) => req.json(&b),
            None => req.header(reqwest::header::CONTENT_LENGTH, "0"),
        };
        let resp = req.send().await?;
        self.check(resp).await?;
        Ok(())
    }

    pub async fn current_user(&self) -> Result<UserProfile> {
        self.get_json("/me").await
    }

    pub async fn playlists(&self) -> Result<Vec<Playlist>> {
        let page: Paging<Playlist> = self
            .get_json(&format!("/me/playlists?limit={}", self.page_limit))
            .await?;
        Ok(page.items)
    }

    pub async fn liked_tracks(&self) -> Result<Vec<Track>> {
        let page: Paging<SavedTrack> = self
            .get_json(&format!("/me/tracks?limit={}", self.page_limit))
            .await?;
        Ok(page.items.into_iter().map(|item| item.track).collect())
    }

    pub async fn search_tracks(&self, query: &str) -> Result<Vec<Track>> {
        let res: SearchResult = self
            .get_json(&format!(
                "/search?q={}&type=track&limit={}",
                urlencoding::encode(query),
                self.page_limit
            ))
            .await?;
        Ok(res.tracks.map(|p| p.items).unwrap_or_default())
    }

    /// Profile and playlists, requested concurrently.
    pub async fn dashboard(&self) -> Result<Dashboard> {
        let (profile, playlists) = tokio::try_join!(self.current_user(), self.playlists())?;
        Ok(Dashboard { profile, playlists })
    }

    pub async fn devices(&self) -> Result<Vec<Device>> {
        let list: DeviceList = self.get_json("/me/player/devices").await?;
        Ok(list.devices)
    }

    pub async fn transfer_playback(&self, device_id: &str, play: bool) -> Result<()> {
        debug!("transferring playback to {}", device_id);
        self.put(
            "/me/player",
            Some(json!({ "device_ids": [device_id], "play": play })),
        )
        .await
    }

    /// Play a track URI, or start a playlist/album context.
    pub async fn play_uri(&self, uri: &str) -> Result<()> {
        let body = if uri.starts_with("spotify:track:") {
            json!({ "uris": [uri] })
        } else {
            json!({ "context_uri": uri })
        };
        self.put("/me/player/play", Some(body)).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.put("/me/player/pause", None).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.put("/me/player/play", None).await
    }

    /// `None` when nothing is playing on any device (HTTP 204).
    pub async fn playback_state(&self) -> Result<Option<PlaybackState>> {
        let bearer = self.bearer()?;
        let resp = self
            .client
            .get(self.url("/me/player"))
            .header(AUTHORIZATION, &bearer)
            .send()
            .await?;
        let resp = self.check(resp).await?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text).map(Some).map_err(|e| ApiError::Status {
            status: StatusCode::OK,
            body: format!("unparseable playback state: {}", e),
        })
    }
}
