//! beatsync - Main entry point
//!
//! Metronome that follows the tempo of the track playing on Spotify.
//! Ticks on a dedicated clock thread, polls the music service on a tokio
//! task, and exposes an HTTP/SSE control API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use beatsync_ap::api::{self, AppContext};
use beatsync_ap::audio::{SoundPlayback, TickOutput};
use beatsync_ap::metronome::MetronomeController;
use beatsync_ap::sync::{PollScheduler, ProviderSlot, SpotifyClient, SpotifySettings, TrackWatcher};
use beatsync_ap::SharedState;
use beatsync_common::config::TomlConfig;
use beatsync_common::credentials::CredentialStore;
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for beatsync
#[derive(Parser, Debug)]
#[command(name = "beatsync")]
#[command(about = "Metronome that follows the tempo of the playing track")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "BEATSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Port for the HTTP control API
    #[arg(short, long)]
    port: Option<u16>,

    /// Tempo at startup (20-400)
    #[arg(long)]
    bpm: Option<u32>,

    /// Tick sound file (default: synthesized click)
    #[arg(long)]
    tick_sound: Option<PathBuf>,

    /// Do not poll the music service
    #[arg(long)]
    no_sync: bool,

    /// Spotify access token (overrides the credentials file)
    #[arg(long, env = "BEATSYNC_SPOTIFY_TOKEN", hide_env_values = true)]
    spotify_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config before tracing so the file's log level applies
    let mut config = TomlConfig::resolve(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bpm) = args.bpm {
        config.metronome.initial_bpm = bpm;
    }
    if let Some(tick_sound) = args.tick_sound {
        config.metronome.tick_sound = Some(tick_sound);
    }
    if args.no_sync {
        config.sync.enabled = false;
    }
    let config = config.validate().context("Invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting beatsync v{}", env!("CARGO_PKG_VERSION"));

    let state = Arc::new(SharedState::new());

    // Failing to open the output device is the one fatal startup error
    let output = {
        let device = config.metronome.audio_device.clone();
        let tick_sound = config.metronome.tick_sound.clone();
        let volume = config.metronome.volume;
        tokio::task::spawn_blocking(move || TickOutput::open(device, tick_sound, volume))
            .await
            .context("Audio output task failed")?
            .context("Failed to open audio output device")?
    };
    let output = Arc::new(output);

    let sound: Arc<dyn SoundPlayback> = output.clone();
    let controller = Arc::new(
        MetronomeController::new(sound, config.initial_tempo(), Arc::clone(&state))
            .context("Failed to start metronome")?,
    );
    info!("Metronome ready at {}", config.initial_tempo());

    // Music service session
    let spotify = SpotifySettings {
        api_base_url: config.sync.api_base_url.clone(),
        request_timeout: Duration::from_millis(config.sync.request_timeout_ms),
    };
    let provider = Arc::new(ProviderSlot::new());
    let credentials = config.credentials_path().map(|p| Arc::new(CredentialStore::new(p)));

    let token = match (args.spotify_token, credentials.as_deref()) {
        (Some(token), _) => Some(token),
        (None, Some(store)) => stored_token(store),
        (None, None) => None,
    };
    match token {
        Some(token) => {
            let client = SpotifyClient::new(&spotify, token).context("Failed to create Spotify client")?;
            provider.install(Arc::new(client)).await;
        }
        None if config.sync.enabled => {
            info!("No Spotify token yet; supply one with POST /sync/token")
        }
        None => {}
    }

    // Track watcher -> controller
    let cancel = CancellationToken::new();
    let (scheduler, pump, watcher_stats) = if config.sync.enabled {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let watcher = TrackWatcher::new(
            provider.clone(),
            provider.clone(),
            controller.subscribe(),
            events_tx,
            config.sync.failure_log_threshold,
        );
        let stats = watcher.stats();
        let pump = tokio::spawn(Arc::clone(&controller).run_event_pump(events_rx));
        let scheduler = PollScheduler::spawn(
            watcher,
            Duration::from_millis(config.sync.poll_interval_ms),
            cancel.clone(),
        );
        (Some(scheduler), Some(pump), Some(stats))
    } else {
        info!("Music service sync disabled");
        (None, None, None)
    };

    let ctx = AppContext {
        state,
        controller: Arc::clone(&controller),
        output: Some(Arc::clone(&output)),
        provider,
        watcher_stats,
        credentials,
        spotify,
    };

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind_address, config.port))?;

    let server_result = api::run(addr, ctx, shutdown_signal()).await;

    // Orderly teardown: poller, then clock, then device
    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }
    if let Some(pump) = pump {
        if let Err(e) = pump.await {
            error!("Watcher event pump failed: {}", e);
        }
    }
    tokio::task::spawn_blocking(move || controller.shutdown())
        .await
        .context("Controller shutdown failed")?;
    tokio::task::spawn_blocking(move || output.close())
        .await
        .context("Audio output shutdown failed")?;

    server_result.context("HTTP server failed")?;
    info!("Shutdown complete");
    Ok(())
}

/// Usable access token from the credentials file, if any
fn stored_token(store: &CredentialStore) -> Option<String> {
    let credentials = match store.load() {
        Ok(Some(credentials)) => credentials,
        Ok(None) => return None,
        Err(e) => {
            warn!("Ignoring unreadable credentials file {}: {}", store.path().display(), e);
            return None;
        }
    };
    if let Err(e) = credentials.validate() {
        debug!("Stored credentials have no client registration: {}", e);
    }

    let token = credentials.bearer_token(chrono::Utc::now()).map(str::to_string);
    if token.is_none() {
        info!("No usable token in {}", store.path().display());
    }
    token
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
