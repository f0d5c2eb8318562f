//! Spotify Web API client
//!
//! Read-only use of two endpoints:
//! - `GET /me/player/currently-playing`
//! - `GET /audio-features/{id}`
//!
//! The access token is obtained elsewhere (credentials file, CLI, or
//! `POST /sync/token`); this client only sends it as a bearer token.

use crate::error::ProviderError;
use crate::sync::provider::{AudioFeatures, AudioFeaturesProvider, NowPlaying, NowPlayingProvider};
use async_trait::async_trait;
use beatsync_common::TrackIdentity;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = concat!("beatsync/", env!("CARGO_PKG_VERSION"));

/// Spotify's "no key detected" marker
const NO_KEY: i32 = -1;

/// `currently-playing` response (fields we use)
#[derive(Debug, Deserialize)]
struct CurrentlyPlayingResponse {
    #[serde(default)]
    is_playing: bool,
    item: Option<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    /// Null for local files
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistItem>,
}

#[derive(Debug, Deserialize)]
struct ArtistItem {
    name: String,
}

/// `audio-features` response (fields we use)
#[derive(Debug, Deserialize)]
struct AudioFeaturesResponse {
    tempo: f64,
    key: i32,
}

/// Settings needed to open a session
#[derive(Debug, Clone)]
pub struct SpotifySettings {
    pub api_base_url: String,
    pub request_timeout: Duration,
}

pub struct SpotifyClient {
    http_client: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl SpotifyClient {
    pub fn new(settings: &SpotifySettings, access_token: impl Into<String>) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let base_url = Url::parse(settings.api_base_url.trim_end_matches('/'))
            .map_err(|e| ProviderError::Network(format!("bad API base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::Network(format!(
                "bad API base URL: {}",
                settings.api_base_url
            )));
        }

        Ok(Self {
            http_client,
            base_url,
            access_token: access_token.into(),
        })
    }

    /// Base URL plus path segments, each percent-encoded as a single segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Network(format!("bad API base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, ProviderError> {
        tracing::debug!(url = %url, "Querying Spotify API");

        self.http_client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))
    }
}

/// Map a non-success status to a provider error
async fn status_error(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED => ProviderError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            retry_after: response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        _ => ProviderError::Api {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        },
    }
}

fn parse_currently_playing(body: &str) -> Result<Option<NowPlaying>, ProviderError> {
    let response: CurrentlyPlayingResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    if !response.is_playing {
        return Ok(None);
    }
    let Some(item) = response.item else {
        return Ok(None);
    };
    let Some(id) = item.id else {
        // Local file: nothing to look features up with
        tracing::debug!(name = %item.name, "Playing item has no track id");
        return Ok(None);
    };

    let artist = item
        .artists
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    Ok(Some(NowPlaying {
        track: TrackIdentity::new(id, item.name, artist),
        is_playing: true,
    }))
}

fn parse_audio_features(body: &str) -> Result<AudioFeatures, ProviderError> {
    let response: AudioFeaturesResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    Ok(AudioFeatures {
        tempo_bpm: response.tempo,
        pitch_class: (response.key != NO_KEY).then_some(response.key),
    })
}

#[async_trait]
impl NowPlayingProvider for SpotifyClient {
    async fn currently_playing(&self) -> Result<Option<NowPlaying>, ProviderError> {
        let url = self.endpoint(&["me", "player", "currently-playing"])?;
        let response = self.get(url).await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        parse_currently_playing(&body)
    }
}

#[async_trait]
impl AudioFeaturesProvider for SpotifyClient {
    async fn features_for(&self, track_id: &str) -> Result<Option<AudioFeatures>, ProviderError> {
        // Dot segments would be dropped from the path
        if matches!(track_id, "" | "." | "..") {
            tracing::info!(track_id = %track_id, "Track id is not a valid path segment");
            return Ok(None);
        }
        let url = self.endpoint(&["audio-features", track_id])?;
        let response = self.get(url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!(track_id = %track_id, "No audio features for track");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let features = parse_audio_features(&body)?;

        tracing::debug!(
            track_id = %track_id,
            tempo = features.tempo_bpm,
            key = ?features.pitch_class,
            "Audio features received"
        );
        Ok(Some(features))
    }
}
