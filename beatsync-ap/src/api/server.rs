//! HTTP server setup and routing
//!
//! Sets up the Axum HTTP server with routes for metronome control, sync
//! session management and SSE.

use crate::audio::TickOutput;
use crate::error::{Error, Result};
use crate::metronome::MetronomeController;
use crate::state::SharedState;
use crate::sync::{ProviderSlot, SpotifySettings, WatcherStats};
use axum::{
    routing::{get, post},
    Router,
};
use beatsync_common::credentials::CredentialStore;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
///
/// **Note:** AppContext implements Clone, which gives us `FromRef<AppContext>` for free
/// via Axum's blanket implementation.
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub controller: Arc<MetronomeController>,
    /// None when running without an audio device
    pub output: Option<Arc<TickOutput>>,
    pub provider: Arc<ProviderSlot>,
    /// None when sync is disabled
    pub watcher_stats: Option<Arc<RwLock<WatcherStats>>>,
    /// None when no credentials location could be determined
    pub credentials: Option<Arc<CredentialStore>>,
    pub spotify: SpotifySettings,
}

/// Build the router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))

        // Metronome control
        .route("/metronome/status", get(super::handlers::get_status))
        .route("/metronome/start", post(super::handlers::start))
        .route("/metronome/stop", post(super::handlers::stop))
        .route("/metronome/tempo", post(super::handlers::set_tempo))

        // Audio device
        .route("/audio/devices", get(super::handlers::list_audio_devices))
        .route("/audio/status", get(super::handlers::get_audio_status))
        .route("/audio/volume", get(super::handlers::get_volume))
        .route("/audio/volume", post(super::handlers::set_volume))

        // Music service sync
        .route("/sync/status", get(super::handlers::get_sync_status))
        .route("/sync/token", post(super::handlers::set_token))
        .route("/sync/lookup", post(super::handlers::lookup_track))

        // SSE event stream
        .route("/events", get(super::sse::event_stream))

        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until `shutdown` resolves
pub async fn run(
    addr: SocketAddr,
    ctx: AppContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(ctx);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
