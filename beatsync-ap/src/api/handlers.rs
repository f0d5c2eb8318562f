//! HTTP request handlers
//!
//! Controller entry points block while the clock quiesces, so they run on
//! the blocking pool.

use crate::api::server::AppContext;
use crate::audio::TickOutput;
use crate::error::ProviderError;
use crate::metronome::{EngineSnapshot, MetronomeController};
use crate::sync::{derive_tempo_and_key, AudioFeaturesProvider, SpotifyClient, WatcherStats};
use axum::{extract::State, http::StatusCode, Json};
use beatsync_common::events::BeatsyncEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct MetronomeStatusResponse {
    #[serde(flatten)]
    engine: EngineSnapshot,
    beats: u64,
}

/// Tempo as typed by the user; a JSON number is accepted too
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum BpmInput {
    Text(String),
    Number(serde_json::Number),
}

#[derive(Debug, Deserialize)]
pub struct TempoRequest {
    bpm: BpmInput,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    volume: u8, // 0-100 user-facing scale
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    volume: u8,
}

#[derive(Debug, Serialize)]
pub struct AudioStatusResponse {
    device: String,
    sample_rate: u32,
    volume: u8,
    ticks_played: u64,
    stream_errors: u32,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    devices: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    authorized: bool,
    sessions_installed: u64,
    watcher: Option<WatcherStats>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    access_token: String,
    expires_in_secs: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    status: String,
    persisted: bool,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    track_id: String,
}

/// Longest token lifetime accepted from a client (one year)
const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

type ApiError = (StatusCode, Json<StatusResponse>);

fn api_error(code: StatusCode, message: impl Into<String>) -> ApiError {
    (
        code,
        Json(StatusResponse {
            status: format!("error: {}", message.into()),
        }),
    )
}

/// Run a controller entry point on the blocking pool
async fn with_controller<T, F>(ctx: &AppContext, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&MetronomeController) -> T + Send + 'static,
    T: Send + 'static,
{
    let controller = Arc::clone(&ctx.controller);
    tokio::task::spawn_blocking(move || f(&controller))
        .await
        .map_err(|e| {
            error!("Controller task failed: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}

fn metronome_status(ctx: &AppContext) -> MetronomeStatusResponse {
    MetronomeStatusResponse {
        engine: ctx.controller.snapshot(),
        beats: ctx.controller.beats(),
    }
}

fn output(ctx: &AppContext) -> Result<&Arc<TickOutput>, ApiError> {
    ctx.output
        .as_ref()
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "no audio output"))
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "beatsync".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Metronome Endpoints
// ============================================================================

/// GET /metronome/status
pub async fn get_status(State(ctx): State<AppContext>) -> Json<MetronomeStatusResponse> {
    Json(metronome_status(&ctx))
}

/// POST /metronome/start
pub async fn start(
    State(ctx): State<AppContext>,
) -> Result<Json<MetronomeStatusResponse>, ApiError> {
    with_controller(&ctx, |c| c.on_manual_start()).await?;
    Ok(Json(metronome_status(&ctx)))
}

/// POST /metronome/stop - stops and holds until the next track change
pub async fn stop(
    State(ctx): State<AppContext>,
) -> Result<Json<MetronomeStatusResponse>, ApiError> {
    with_controller(&ctx, |c| c.on_manual_stop()).await?;
    Ok(Json(metronome_status(&ctx)))
}

/// POST /metronome/tempo - 422 (tempo unchanged) when the input is rejected
pub async fn set_tempo(
    State(ctx): State<AppContext>,
    Json(req): Json<TempoRequest>,
) -> Result<Json<MetronomeStatusResponse>, ApiError> {
    let raw = match req.bpm {
        BpmInput::Text(text) => text,
        BpmInput::Number(number) => number.to_string(),
    };

    let applied = with_controller(&ctx, {
        let raw = raw.clone();
        move |c: &MetronomeController| c.on_manual_tempo_edit(&raw)
    })
    .await?;

    match applied {
        Some(_) => Ok(Json(metronome_status(&ctx))),
        None => Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("invalid tempo {:?}", raw),
        )),
    }
}

// ============================================================================
// Audio Endpoints
// ============================================================================

/// GET /audio/devices
pub async fn list_audio_devices() -> Result<Json<DeviceListResponse>, ApiError> {
    match tokio::task::spawn_blocking(TickOutput::list_devices).await {
        Ok(Ok(devices)) => Ok(Json(DeviceListResponse { devices })),
        Ok(Err(e)) => {
            error!("Failed to list audio devices: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// GET /audio/status
pub async fn get_audio_status(
    State(ctx): State<AppContext>,
) -> Result<Json<AudioStatusResponse>, ApiError> {
    let output = output(&ctx)?;
    Ok(Json(AudioStatusResponse {
        device: output.device_name().to_string(),
        sample_rate: output.sample_rate(),
        volume: (output.volume() * 100.0).round() as u8,
        ticks_played: output.ticks_played(),
        stream_errors: output.error_count(),
    }))
}

/// GET /audio/volume
pub async fn get_volume(State(ctx): State<AppContext>) -> Result<Json<VolumeResponse>, ApiError> {
    let volume = output(&ctx)?.volume();
    Ok(Json(VolumeResponse {
        volume: (volume * 100.0).round() as u8,
    }))
}

/// POST /audio/volume
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Json(req): Json<VolumeRequest>,
) -> Result<Json<VolumeResponse>, ApiError> {
    if req.volume > 100 {
        return Err(api_error(StatusCode::BAD_REQUEST, "volume must be 0-100"));
    }

    let output = output(&ctx)?;
    let old_volume = output.volume();
    output.set_volume(f32::from(req.volume) / 100.0);

    info!(
        "Volume changed: {:.0}% -> {}%",
        old_volume * 100.0,
        req.volume
    );
    Ok(Json(VolumeResponse { volume: req.volume }))
}

// ============================================================================
// Sync Endpoints
// ============================================================================

/// GET /sync/status
pub async fn get_sync_status(State(ctx): State<AppContext>) -> Json<SyncStatusResponse> {
    let watcher = match &ctx.watcher_stats {
        Some(stats) => Some(stats.read().await.clone()),
        None => None,
    };

    Json(SyncStatusResponse {
        authorized: ctx.provider.is_installed().await,
        sessions_installed: ctx.provider.installs(),
        watcher,
    })
}

/// POST /sync/token - install (and persist) a new access token
pub async fn set_token(
    State(ctx): State<AppContext>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = req.access_token.trim().to_string();
    if token.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "access_token is empty"));
    }
    let expires_at = match req.expires_in_secs {
        None => None,
        Some(secs) => Some(expiry_from_now(secs).ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("expires_in_secs must be 1-{}", MAX_TOKEN_LIFETIME_SECS),
            )
        })?),
    };

    let client = SpotifyClient::new(&ctx.spotify, token.clone())
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let persisted = match &ctx.credentials {
        Some(store) => {
            let store = Arc::clone(store);
            let result = tokio::task::spawn_blocking(move || {
                let mut credentials = store.load()?.unwrap_or_default();
                credentials.access_token = Some(token);
                credentials.expires_at = expires_at;
                store.save(&credentials)
            })
            .await;

            match result {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!("Token accepted but not saved: {}", e);
                    false
                }
                Err(e) => {
                    warn!("Token accepted but not saved: {}", e);
                    false
                }
            }
        }
        None => false,
    };

    ctx.provider.install(Arc::new(client)).await;
    ctx.state.broadcast_event(BeatsyncEvent::SyncAuthorized {
        timestamp: chrono::Utc::now(),
    });

    Ok(Json(TokenResponse {
        status: "authorized".to_string(),
        persisted,
        expires_at,
    }))
}

/// POST /sync/lookup - fetch tempo and key for a track and apply them
/// without starting the metronome
pub async fn lookup_track(
    State(ctx): State<AppContext>,
    Json(req): Json<LookupRequest>,
) -> Result<Json<MetronomeStatusResponse>, ApiError> {
    let track_id = req.track_id.trim().to_string();
    if track_id.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "track_id is empty"));
    }

    let features = match ctx.provider.features_for(&track_id).await {
        Ok(Some(features)) => features,
        Ok(None) => {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                format!("no audio features for {}", track_id),
            ))
        }
        Err(e) => return Err(provider_error(e)),
    };

    let (tempo, key) = derive_tempo_and_key(&features).map_err(provider_error)?;
    with_controller(&ctx, move |c| c.apply_lookup(tempo, key)).await?;
    Ok(Json(metronome_status(&ctx)))
}

fn expiry_from_now(secs: i64) -> Option<chrono::DateTime<chrono::Utc>> {
    if !(1..=MAX_TOKEN_LIFETIME_SECS).contains(&secs) {
        return None;
    }
    chrono::Utc::now().checked_add_signed(chrono::Duration::try_seconds(secs)?)
}

fn provider_error(e: ProviderError) -> ApiError {
    let code = match e {
        ProviderError::Unauthorized | ProviderError::NotAuthorized => StatusCode::UNAUTHORIZED,
        ProviderError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::BAD_GATEWAY,
    };
    warn!("Lookup failed: {}", e);
    api_error(code, e.to_string())
}
