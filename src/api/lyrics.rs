use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// lyrics.ovh lookup by artist and title. No authentication.
pub struct LyricsClient {
    client: Client,
    base: String,
}

#[derive(Deserialize)]
struct LyricsBody {
    lyrics: Option<String>,
}

impl LyricsClient {
    pub fn new(base: &str) -> Self {
        Self {
            client: Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// `None` when the service has no lyrics for the song.
    pub async fn fetch(&self, artist: &str, title: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/{}/{}",
            self.base,
            urlencoding::encode(artist),
            urlencoding::encode(title)
        );
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!("no lyrics for {} - {}", artist, title);
            return Ok(None);
        }
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(anyhow!("lyrics lookup failed: {} => {}", status, txt));
        }
        let body: LyricsBody = resp.json().await?;
        Ok(body.lyrics.filter(|l| !l.trim().is_empty()))
    }
}
