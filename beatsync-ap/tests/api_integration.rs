//! Integration tests for the beatsync HTTP API
//!
//! Drives the router with `oneshot` requests; no socket, no audio device.

mod helpers;

use axum::body::Body;
use axum::http::StatusCode;
use beatsync_ap::api::{create_router, AppContext};
use beatsync_ap::audio::NullPlayback;
use beatsync_ap::metronome::MetronomeController;
use beatsync_ap::sync::{ProviderSlot, SpotifySettings};
use beatsync_ap::SharedState;
use beatsync_common::credentials::CredentialStore;
use beatsync_common::Tempo;
use helpers::{ScriptedProvider, Step};
use http::{Method, Request};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: axum::Router,
    ctx: AppContext,
    _dir: TempDir,
}

fn setup_test_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let state = Arc::new(SharedState::new());
    let controller = Arc::new(
        MetronomeController::new(Arc::new(NullPlayback), Tempo::DEFAULT, Arc::clone(&state))
            .unwrap(),
    );

    let ctx = AppContext {
        state,
        controller,
        output: None,
        provider: Arc::new(ProviderSlot::new()),
        watcher_stats: None,
        credentials: Some(Arc::new(CredentialStore::new(
            dir.path().join("credentials.json"),
        ))),
        spotify: SpotifySettings {
            // Nothing listens here; token tests never make a request
            api_base_url: "http://127.0.0.1:9".to_string(),
            request_timeout: Duration::from_millis(200),
        },
    };

    TestApp {
        router: create_router(ctx.clone()),
        ctx,
        _dir: dir,
    }
}

async fn make_request(
    app: &TestApp,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(path);
    let request = match body {
        Some(json_body) => {
            request = request.header("content-type", "application/json");
            request.body(Body::from(json_body.to_string())).unwrap()
        }
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json_body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json_body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_test_app();
    let (status, body) = make_request(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "beatsync");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_start_stop_cycle() {
    let app = setup_test_app();

    let (status, body) = make_request(&app, Method::GET, "/metronome/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert_eq!(body["tempo"], 60);

    let (status, body) = make_request(&app, Method::POST, "/metronome/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], true);

    let (status, body) = make_request(&app, Method::POST, "/metronome/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert_eq!(body["held"], true);

    app.ctx.controller.shutdown();
}

#[tokio::test]
async fn test_set_tempo() {
    let app = setup_test_app();

    let (status, body) =
        make_request(&app, Method::POST, "/metronome/tempo", Some(json!({"bpm": "75"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tempo"], 75);

    let (status, body) =
        make_request(&app, Method::POST, "/metronome/tempo", Some(json!({"bpm": 132}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tempo"], 132);

    let (status, _) =
        make_request(&app, Method::POST, "/metronome/tempo", Some(json!({"bpm": "abc"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, body) = make_request(&app, Method::GET, "/metronome/status", None).await;
    assert_eq!(body["tempo"], 132);
}

#[tokio::test]
async fn test_volume_without_output_is_unavailable() {
    let app = setup_test_app();

    let (status, _) = make_request(&app, Method::GET, "/audio/volume", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = make_request(&app, Method::GET, "/audio/status", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) =
        make_request(&app, Method::POST, "/audio/volume", Some(json!({"volume": 150}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sync_status_before_authorization() {
    let app = setup_test_app();
    let (status, body) = make_request(&app, Method::GET, "/sync/status", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authorized"], false);
    assert_eq!(body["sessions_installed"], 0);
    assert!(body["watcher"].is_null());
}

#[tokio::test]
async fn test_token_is_installed_and_persisted() {
    let app = setup_test_app();
    let mut events = app.ctx.state.subscribe_events();

    let (status, _) =
        make_request(&app, Method::POST, "/sync/token", Some(json!({"access_token": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/sync/token",
        Some(json!({"access_token": "tok-123", "expires_in_secs": 3600})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "authorized");
    assert_eq!(body["persisted"], true);

    assert!(app.ctx.provider.is_installed().await);
    assert_eq!(events.try_recv().unwrap().event_type(), "SyncAuthorized");

    let stored = app.ctx.credentials.as_ref().unwrap().load().unwrap().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("tok-123"));
    assert!(stored.expires_at.is_some());
}

#[tokio::test]
async fn test_token_lifetime_out_of_range_is_rejected() {
    let app = setup_test_app();

    for secs in [i64::MAX, i64::MIN, 0, -60, 400 * 24 * 60 * 60] {
        let (status, _) = make_request(
            &app,
            Method::POST,
            "/sync/token",
            Some(json!({"access_token": "tok", "expires_in_secs": secs})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "expires_in_secs = {}", secs);
    }

    assert!(!app.ctx.provider.is_installed().await);
    assert!(app.ctx.credentials.as_ref().unwrap().load().unwrap().is_none());
}

#[tokio::test]
async fn test_lookup_applies_without_starting() {
    let app = setup_test_app();

    let (status, _) =
        make_request(&app, Method::POST, "/sync/lookup", Some(json!({"track_id": "A"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let provider = ScriptedProvider::new(vec![Step::Nothing]).with_features("A", 97.7, Some(4));
    app.ctx.provider.install(Arc::new(provider)).await;

    let (status, body) =
        make_request(&app, Method::POST, "/sync/lookup", Some(json!({"track_id": "A"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tempo"], 98);
    assert_eq!(body["key_name"], "E");
    assert_eq!(body["running"], false);

    let (status, _) =
        make_request(&app, Method::POST, "/sync/lookup", Some(json!({"track_id": "missing"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
