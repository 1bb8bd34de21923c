use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use onetune as lib;
use lib::api::lyrics::LyricsClient;
use lib::api::spotify::SpotifyClient;
use lib::api::spotify_auth::{AuthFlow, AuthState, LoginOutcome};
use lib::config::{Config, RelayConfig};
use lib::error::{ApiError, AuthError};
use lib::favorites::{FavoriteItem, FavoriteKind, Favorites};
use lib::models::PlaybackState;
use lib::player::{PlaybackSdk, PlayerEvent, WebPlayer};
use lib::poller::ViewScope;
use lib::session::CredentialStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

#[derive(Parser)]
#[command(name = "onetune", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Local(LocalCommand),
    #[command(flatten)]
    Api(ApiCommand),
    /// Run the token relay (needs SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET)
    Relay,
    /// Validate config file and exit
    ConfigValidate,
}

/// Commands served from local storage (and lyrics.ovh), no Spotify token needed.
#[derive(Subcommand)]
enum LocalCommand {
    /// Start a login: print the authorization URL, then read the redirect URL
    Login,
    /// Finish a login from the redirect URL the provider sent you to
    Callback {
        /// Full redirect URL, including `?code=...`
        url: String,
    },
    /// Forget the access token and any pending login
    Logout,
    /// Show the login state
    Status,
    /// Toggle a favorite (kind: song, playlist, album)
    Favorite {
        kind: String,
        id: String,
        name: String,
        #[arg(long)]
        uri: Option<String>,
    },
    /// List favorites
    Favorites,
    /// Fetch lyrics for a song
    Lyrics { artist: String, title: String },
}

/// Commands that call the Web API with the stored token.
#[derive(Subcommand)]
enum ApiCommand {
    /// Show the logged-in profile
    Me,
    /// List your playlists
    Playlists,
    /// List your liked songs
    Liked,
    /// Search tracks
    Search { query: String },
    /// List playback devices
    Devices,
    /// Transfer playback to a device (configured one, or the first available)
    Connect {
        #[arg(long)]
        device: Option<String>,
    },
    /// Play a track, playlist or album URI
    Play { uri: String },
    Pause,
    Resume,
    /// Toggle between play and pause
    Toggle,
    /// Show the current track
    NowPlaying {
        /// Keep polling and print changes until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
}

fn print_state(state: &Option<PlaybackState>) {
    match state.as_ref().and_then(|s| s.current_track().map(|t| (s, t))) {
        Some((s, t)) => println!(
            "{} {} - {}",
            if s.paused() { "⏸" } else { "▶" },
            t.name,
            t.artist_names()
        ),
        None => println!("Nothing playing."),
    }
}

/// API failures end in the unauthenticated entry point, never a crash.
fn report_api_error(e: ApiError) -> Result<()> {
    match e {
        ApiError::NotAuthenticated | ApiError::Unauthorized => {
            eprintln!("{}. Run `onetune login`.", e);
            std::process::exit(3);
        }
        other => Err(other.into()),
    }
}

fn report_auth_error(e: AuthError) -> ! {
    eprintln!("Login failed ({}): {}", e.indicator(), e);
    if e.is_recoverable() {
        eprintln!("Run `onetune login` to start again.");
    }
    std::process::exit(2);
}

async fn finish_login(flow: &mut AuthFlow, redirect: &str) -> Result<()> {
    let url = Url::parse(redirect.trim()).map_err(|e| anyhow!("invalid url pasted: {}", e))?;
    match flow.complete_login(&url).await {
        Ok(LoginOutcome::Authenticated { clean_url, .. }) => {
            println!("Logged in. Continue at {}", clean_url);
        }
        Ok(LoginOutcome::AlreadyAuthenticated { clean_url }) => {
            println!("Already logged in. Continue at {}", clean_url);
        }
        Err(e) => report_auth_error(e),
    }
    Ok(())
}

async fn run_api(cfg: &Config, store: CredentialStore, command: ApiCommand) -> Result<(), ApiError> {
    let api = Arc::new(SpotifyClient::new(cfg, store));
    match command {
        ApiCommand::Me => {
            let me = api.current_user().await?;
            println!("{} ({})", me.display_name.as_deref().unwrap_or(&me.id), me.id);
            if let Some(email) = me.email {
                println!("{}", email);
            }
        }
        ApiCommand::Playlists => {
            let dash = api.dashboard().await?;
            println!(
                "Playlists of {}:",
                dash.profile.display_name.as_deref().unwrap_or(&dash.profile.id)
            );
            for p in dash.playlists {
                println!("- {} [{}]", p.name, p.uri);
            }
        }
        ApiCommand::Liked => {
            for t in api.liked_tracks().await? {
                println!("- {} - {} [{}]", t.name, t.artist_names(), t.uri);
            }
        }
        ApiCommand::Search { query } => {
            for t in api.search_tracks(&query).await? {
                println!("- {} - {} [{}]", t.name, t.artist_names(), t.uri);
            }
        }
        ApiCommand::Devices => {
            for d in api.devices().await? {
                println!(
                    "- {}{} [{}]",
                    d.name,
                    if d.is_active { " (active)" } else { "" },
                    d.id.unwrap_or_default()
                );
            }
        }
        ApiCommand::Connect { device } => {
            let player = WebPlayer::new(api.clone(), device.or_else(|| cfg.device_id.clone()));
            let mut sub = player.subscribe();
            if !player.connect().await? {
                println!("No playback device available. Open Spotify on a device first.");
            }
            while let Some(ev) = sub.try_recv() {
                if let PlayerEvent::Ready { device_id } = ev {
                    println!("Ready with device {}", device_id);
                }
            }
        }
        ApiCommand::Play { uri } => {
            let player = WebPlayer::new(api.clone(), cfg.device_id.clone());
            player.play(&uri).await?;
            println!("Playing {}", uri);
        }
        ApiCommand::Pause => {
            let player = WebPlayer::new(api.clone(), cfg.device_id.clone());
            player.pause().await?;
        }
        ApiCommand::Resume => {
            let player = WebPlayer::new(api.clone(), cfg.device_id.clone());
            player.resume().await?;
        }
        ApiCommand::Toggle => {
            let player = WebPlayer::new(api.clone(), cfg.device_id.clone());
            player.toggle_play().await?;
            print_state(&player.get_current_state().await?);
        }
        ApiCommand::NowPlaying { watch } => {
            let player = Arc::new(WebPlayer::new(api.clone(), cfg.device_id.clone()));
            if !watch {
                print_state(&player.get_current_state().await?);
                return Ok(());
            }
            let mut view = ViewScope::new();
            view.listen("now-playing listener", player.subscribe(), |ev| {
                if let PlayerEvent::StateChanged(state) = ev {
                    print_state(&state);
                }
            });
            let poll_player = player.clone();
            view.poll(
                "now-playing poll",
                Duration::from_millis(cfg.now_playing_poll_ms),
                move || {
                    let player = poll_player.clone();
                    async move {
                        if let Err(e) = player.refresh_state().await {
                            tracing::warn!("now-playing poll failed: {}", e);
                        }
                    }
                },
            );
            let refresh_api = api.clone();
            view.poll(
                "playlist refresh",
                Duration::from_millis(cfg.playlist_refresh_ms),
                move || {
                    let api = refresh_api.clone();
                    async move {
                        match api.playlists().await {
                            Ok(p) => tracing::debug!("refreshed {} playlists", p.len()),
                            Err(e) => tracing::warn!("playlist refresh failed: {}", e),
                        }
                    }
                },
            );
            let _ = tokio::signal::ctrl_c().await;
            view.teardown();
        }
    }
    Ok(())
}

fn resolve_config_path(explicit: &Option<PathBuf>) -> PathBuf {
    // Explicit --config wins; then the per-user config dir; then the
    // repository example config for local/dev usage.
    match explicit {
        Some(p) => p.clone(),
        None => {
            let user_path = dirs::config_dir().map(|d| d.join("onetune").join("config.toml"));
            match user_path {
                Some(p) if p.exists() => p,
                _ => PathBuf::from("config/example-config.toml"),
            }
        }
    }
}

fn validate_config(path: &Path) {
    match Config::from_path(path) {
        Ok(_) => println!("OK"),
        Err(e) => {
            eprintln!("Config validation failed: {}", e);
            std::process::exit(2);
        }
    }
}

/// Bridge `log` into tracing and write to stdout plus a daily-rotated file in
/// `cfg.log_dir`. Keep the guard alive or buffered file lines are lost.
fn init_logging(cfg: &Config) -> Result<WorkerGuard> {
    let _ = LogTracer::init();
    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("creating log dir {}", cfg.log_dir.display()))?;
    let file_appender: RollingFileAppender = tracing_appender::rolling::daily(&cfg.log_dir, "onetune.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer().with_writer(non_blocking);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer);

    tracing_subscriber_global::set_global_default(subscriber)
        .context("setting global tracing subscriber")?;
    Ok(guard)
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_path(path).with_context(|| format!("loading config from {}", path.display()))
}

fn open_store(cfg: &Config) -> Result<CredentialStore> {
    CredentialStore::open(cfg.db_path.clone())
        .with_context(|| format!("opening {}", cfg.db_path.display()))
}

async fn run_local(cfg: &Config, store: CredentialStore, command: LocalCommand) -> Result<()> {
    match command {
        LocalCommand::Login => {
            let mut flow = AuthFlow::from_config(cfg, store).unwrap_or_else(|e| report_auth_error(e));
            if *flow.state() == AuthState::Authenticated {
                println!("Already logged in. Run `onetune logout` first to switch accounts.");
                return Ok(());
            }
            let url = flow.begin_login().unwrap_or_else(|e| report_auth_error(e));
            println!(
                "Open this URL in your browser and authorize the application:\n\n{}\n",
                url
            );
            println!("After authorizing, you'll be redirected to {}. Copy the full redirect URL and paste it here", cfg.redirect_uri);
            println!("(or leave blank and run `onetune callback <url>` later):");
            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;
            if input.trim().is_empty() {
                println!("Login pending.");
                return Ok(());
            }
            finish_login(&mut flow, &input).await?;
        }
        LocalCommand::Callback { url } => {
            let mut flow = AuthFlow::from_config(cfg, store).unwrap_or_else(|e| report_auth_error(e));
            finish_login(&mut flow, &url).await?;
        }
        LocalCommand::Logout => {
            let mut flow = AuthFlow::from_config(cfg, store).unwrap_or_else(|e| report_auth_error(e));
            flow.logout().unwrap_or_else(|e| report_auth_error(e));
            println!("Logged out.");
        }
        LocalCommand::Status => {
            let flow = AuthFlow::from_config(cfg, store).unwrap_or_else(|e| report_auth_error(e));
            match flow.state() {
                AuthState::Authenticated => println!("Logged in."),
                AuthState::AwaitingRedirect => println!("Login pending: waiting for the redirect URL."),
                _ => println!("Not logged in."),
            }
        }
        LocalCommand::Favorite { kind, id, name, uri } => {
            let kind: FavoriteKind = kind.parse()?;
            let mut favs = Favorites::load(store.durable())?;
            let now = favs.toggle(kind, FavoriteItem { id: id.clone(), name, uri });
            favs.save(store.durable())?;
            println!("{} {}", if now { "Added" } else { "Removed" }, id);
        }
        LocalCommand::Favorites => {
            let favs = Favorites::load(store.durable())?;
            for (label, kind) in [
                ("Songs", FavoriteKind::Songs),
                ("Playlists", FavoriteKind::Playlists),
                ("Albums", FavoriteKind::Albums),
            ] {
                println!("{}:", label);
                for item in favs.items(kind) {
                    println!("- {} ({})", item.name, item.id);
                }
            }
        }
        LocalCommand::Lyrics { artist, title } => {
            let lyrics = LyricsClient::new(&cfg.lyrics_base);
            match lyrics.fetch(&artist, &title).await {
                Ok(Some(text)) => println!("{}", text),
                Ok(None) => println!("Lyrics not found."),
                Err(e) => {
                    tracing::error!("lyrics lookup failed: {:#}", e);
                    println!("Error fetching lyrics.");
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(&cli.config);

    match cli.command {
        Commands::ConfigValidate => validate_config(&config_path),
        Commands::Relay => {
            let cfg = load_config(&config_path)?;
            let _guard = init_logging(&cfg)?;
            // Fail fast: without credentials every exchange would be rejected upstream.
            let relay_cfg = RelayConfig::from_env(&cfg).context("relay credentials")?;
            lib::relay::serve(relay_cfg).await?;
        }
        Commands::Local(command) => {
            let cfg = load_config(&config_path)?;
            let _guard = init_logging(&cfg)?;
            let store = open_store(&cfg)?;
            run_local(&cfg, store, command).await?;
        }
        Commands::Api(command) => {
            let cfg = load_config(&config_path)?;
            let _guard = init_logging(&cfg)?;
            let store = open_store(&cfg)?;
            if let Err(e) = run_api(&cfg, store, command).await {
                report_api_error(e)?;
            }
        }
    }

    Ok(())
}
