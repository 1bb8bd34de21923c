//! Playback control surface in the shape of the Web Playback SDK:
//! `connect`, `toggle_play`, `pause`, `resume`, `get_current_state`, and
//! state-change notifications delivered through an explicit subscription.
use crate::api::spotify::SpotifyClient;
use crate::error::ApiError;
use crate::models::PlaybackState;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Playback was transferred to this device.
    Ready { device_id: String },
    /// No device could be connected.
    NotReady { reason: String },
    /// `player_state_changed`; `None` when playback stopped everywhere.
    StateChanged(Option<PlaybackState>),
}

/// Fan-out of player events to any number of subscribers.
#[derive(Clone)]
pub struct PlayerEvents {
    tx: broadcast::Sender<PlayerEvent>,
}

impl PlayerEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: PlayerEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for PlayerEvents {
    fn default() -> Self {
        Self::new(32)
    }
}

/// Handle of one listener. Dropping it (or calling `unsubscribe`) detaches
/// the listener.
pub struct Subscription {
    rx: broadcast::Receiver<PlayerEvent>,
}

impl Subscription {
    /// Next event; `None` once the player is gone.
    pub async fn recv(&mut self) -> Option<PlayerEvent> {
        loop {
            match self.rx.recv().await {
                Ok(ev) => return Some(ev),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("player subscription lagged, skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<PlayerEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(ev) => return Some(ev),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

#[async_trait]
pub trait PlaybackSdk: Send + Sync {
    /// Attach to a playback device. `Ok(false)` when none is available.
    async fn connect(&self) -> Result<bool, ApiError>;
    async fn toggle_play(&self) -> Result<(), ApiError>;
    async fn pause(&self) -> Result<(), ApiError>;
    async fn resume(&self) -> Result<(), ApiError>;
    async fn get_current_state(&self) -> Result<Option<PlaybackState>, ApiError>;
    fn subscribe(&self) -> Subscription;
}

/// `PlaybackSdk` over the Web API player endpoints.
pub struct WebPlayer {
    api: Arc<SpotifyClient>,
    preferred_device: Option<String>,
    events: PlayerEvents,
    device_id: Mutex<Option<String>>,
    last_state: Mutex<Option<PlaybackState>>,
}

/// Progress moves on every poll; only these fields count as a state change.
fn same_state(a: &Option<PlaybackState>, b: &Option<PlaybackState>) -> bool {
    let key = |s: &Option<PlaybackState>| {
        s.as_ref().map(|s| {
            (
                s.is_playing,
                s.item.as_ref().map(|t| t.uri.clone()),
                s.device.as_ref().and_then(|d| d.id.clone()),
            )
        })
    };
    key(a) == key(b)
}

impl WebPlayer {
    pub fn new(api: Arc<SpotifyClient>, preferred_device: Option<String>) -> Self {
        Self {
            api,
            preferred_device,
            events: PlayerEvents::default(),
            device_id: Mutex::new(None),
            last_state: Mutex::new(None),
        }
    }

    pub async fn device_id(&self) -> Option<String> {
        self.device_id.lock().await.clone()
    }

    /// Fetch the current state and notify subscribers if it changed.
    /// Returns whether an event was published.
    pub async fn refresh_state(&self) -> Result<bool, ApiError> {
        let current = self.api.playback_state().await?;
        let mut last = self.last_state.lock().await;
        if same_state(&last, &current) {
            return Ok(false);
        }
        debug!("player state changed");
        *last = current.clone();
        self.events.publish(PlayerEvent::StateChanged(current));
        Ok(true)
    }

    /// Start a track, playlist or album and publish the resulting state.
    pub async fn play(&self, uri: &str) -> Result<(), ApiError> {
        self.api.play_uri(uri).await?;
        self.refresh_state().await?;
        Ok(())
    }

    async fn pick_device(&self) -> Result<Option<String>, ApiError> {
        if let Some(id) = &self.preferred_device {
            return Ok(Some(id.clone()));
        }
        let devices = self.api.devices().await?;
        let active = devices.iter().find(|d| d.is_active && d.id.is_some());
        Ok(active
            .or_else(|| devices.iter().find(|d| d.id.is_some()))
            .and_then(|d| d.id.clone()))
    }
}

#[async_trait]
impl PlaybackSdk for WebPlayer {
    async fn connect(&self) -> Result<bool, ApiError> {
        let device_id = match self.pick_device().await? {
            Some(id) => id,
            None => {
                self.events.publish(PlayerEvent::NotReady {
                    reason: "no playback device available".into(),
                });
                return Ok(false);
            }
        };
        self.api.transfer_playback(&device_id, false).await?;
        info!("connected to device {}", device_id);
        *self.device_id.lock().await = Some(device_id.clone());
        self.events.publish(PlayerEvent::Ready { device_id });
        Ok(true)
    }

    async fn toggle_play(&self) -> Result<(), ApiError> {
        let playing = self
            .api
            .playback_state()
            .await?
            .map(|s| s.is_playing)
            .unwrap_or(false);
        if playing {
            self.pause().await
        } else {
            self.resume().await
        }
    }

    async fn pause(&self) -> Result<(), ApiError> {
        self.api.pause().await?;
        self.refresh_state().await?;
        Ok(())
    }

    async fn resume(&self) -> Result<(), ApiError> {
        self.api.resume().await?;
        self.refresh_state().await?;
        Ok(())
    }

    async fn get_current_state(&self) -> Result<Option<PlaybackState>, ApiError> {
        self.api.playback_state().await
    }

    fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }
}
