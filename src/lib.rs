//! Core library for onetune: PKCE login, token relay and Spotify playback client
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod favorites;
pub mod models;
pub mod player;
pub mod poller;
pub mod relay;
pub mod session;
pub mod util;
