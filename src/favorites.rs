use crate::session::KeyValueStore;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const FAVORITES_KEY: &str = "favorites";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteKind {
    Songs,
    Playlists,
    Albums,
}

impl FromStr for FavoriteKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "song" | "songs" | "track" | "tracks" => Ok(FavoriteKind::Songs),
            "playlist" | "playlists" => Ok(FavoriteKind::Playlists),
            "album" | "albums" => Ok(FavoriteKind::Albums),
            other => Err(anyhow!("unknown favorite kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteItem {
    pub id: String,
    pub name: String,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Favorites {
    #[serde(default)]
    pub songs: Vec<FavoriteItem>,
    #[serde(default)]
    pub playlists: Vec<FavoriteItem>,
    #[serde(default)]
    pub albums: Vec<FavoriteItem>,
}

impl Favorites {
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        match store.get(FAVORITES_KEY)? {
            Some(s) => Ok(serde_json::from_str(&s)?),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        store.set(FAVORITES_KEY, &serde_json::to_string(self)?)
    }

    pub fn items(&self, kind: FavoriteKind) -> &[FavoriteItem] {
        match kind {
            FavoriteKind::Songs => &self.songs,
            FavoriteKind::Playlists => &self.playlists,
            FavoriteKind::Albums => &self.albums,
        }
    }

    fn items_mut(&mut self, kind: FavoriteKind) -> &mut Vec<FavoriteItem> {
        match kind {
            FavoriteKind::Songs => &mut self.songs,
            FavoriteKind::Playlists => &mut self.playlists,
            FavoriteKind::Albums => &mut self.albums,
        }
    }

    pub fn contains(&self, kind: FavoriteKind, id: &str) -> bool {
        self.items(kind).iter().any(|i| i.id == id)
    }

    /// Remove the item if an entry with the same id exists, add it otherwise.
    /// Returns true when the item is a favorite afterwards.
    pub fn toggle(&mut self, kind: FavoriteKind, item: FavoriteItem) -> bool {
        let items = self.items_mut(kind);
        let before = items.len();
        items.retain(|i| i.id != item.id);
        if items.len() != before {
            return false;
        }
        items.push(item);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> FavoriteItem {
        FavoriteItem {
            id: id.into(),
            name: format!("name {}", id),
            uri: None,
        }
    }

    #[test]
    fn toggle_adds_then_removes() {
        let mut favs = Favorites::default();
        assert!(favs.toggle(FavoriteKind::Songs, item("a")));
        assert!(favs.toggle(FavoriteKind::Songs, item("b")));
        assert!(favs.contains(FavoriteKind::Songs, "a"));
        assert!(!favs.toggle(FavoriteKind::Songs, item("a")));
        assert!(!favs.contains(FavoriteKind::Songs, "a"));
        assert_eq!(favs.items(FavoriteKind::Songs), &[item("b")]);
    }

    #[test]
    fn kinds_are_independent() {
        let mut favs = Favorites::default();
        favs.toggle(FavoriteKind::Albums, item("x"));
        assert!(!favs.contains(FavoriteKind::Playlists, "x"));
        assert!(favs.contains(FavoriteKind::Albums, "x"));
    }

    #[test]
    fn parses_singular_and_plural_kinds() {
        assert_eq!("song".parse::<FavoriteKind>().unwrap(), FavoriteKind::Songs);
        assert_eq!("playlists".parse::<FavoriteKind>().unwrap(), FavoriteKind::Playlists);
        assert!("podcast".parse::<FavoriteKind>().is_err());
    }
}
