use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use coordination_cell::router::coordination_routes;
use coordination_cell::services::CoordinatorRegistry;
use shared_config::VideoProvider;
use shared_utils::test_utils::TestConfig;

/// Registry over the mesh provider in local mode, so no network mock is
/// needed. Backend URL is left empty, which selects the null store.
fn local_registry() -> Arc<CoordinatorRegistry> {
    let mut config = TestConfig::for_provider(VideoProvider::WebRtc)
        .unauthenticated()
        .to_app_config();
    config.backend_url = String::new();
    config.backend_api_key = String::new();
    Arc::new(CoordinatorRegistry::new(Arc::new(config)).unwrap())
}

fn app() -> Router {
    coordination_routes(local_registry())
}

async fn request(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_session(app: &Router) -> String {
    let (status, body) = request(
        app.clone(),
        Method::POST,
        "/sessions",
        Some(json!({ "name": "Morning Flow", "max_participants": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["session"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_provider_and_capabilities() {
    let (status, body) = request(app(), Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["provider"], "webrtc");
    assert_eq!(body["capabilities"]["supports_coach_controls"], false);
}

#[tokio::test]
async fn create_then_get_round_trips_the_session_view() {
    let app = app();
    let id = create_session(&app).await;

    let (status, body) = request(app, Method::GET, &format!("/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["name"], "Morning Flow");
    assert_eq!(body["session"]["status"], "waiting");
    assert_eq!(body["session"]["participant_count"], 0);
    assert_eq!(body["connection_issue"], Value::Null);
}

#[tokio::test]
async fn unknown_session_is_a_404() {
    let (status, body) = request(app(), Method::GET, "/sessions/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn malformed_session_id_is_a_400() {
    let (status, _) = request(app(), Method::GET, "/sessions/bad%20id!", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn join_adds_a_participant_and_activates_the_session() {
    let app = app();
    let id = create_session(&app).await;

    let (status, body) = request(
        app.clone(),
        Method::POST,
        &format!("/sessions/{}/join", id),
        Some(json!({
            "participant_name": "Sarah",
            "role": "coach",
            "video_enabled": true
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["participant_id"].as_str().is_some());
    assert_eq!(body["session"]["status"], "active");
    assert_eq!(body["session"]["participant_count"], 1);
}

#[tokio::test]
async fn coach_controls_on_the_mesh_provider_are_unprocessable() {
    let app = app();
    let id = create_session(&app).await;

    let (status, _) = request(
        app,
        Method::POST,
        &format!("/sessions/{}/participants/someone/mute", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn vendor_events_for_the_wrong_provider_are_rejected() {
    let (status, body) = request(
        app(),
        Method::POST,
        "/events/zoom",
        Some(json!({ "event": "session.user_joined" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("webrtc"));
}

#[tokio::test]
async fn vendor_events_for_the_configured_provider_are_accepted() {
    let app = app();
    let id = create_session(&app).await;

    let (status, body) = request(
        app.clone(),
        Method::POST,
        "/events/webrtc",
        Some(json!({
            "type": "peer_joined",
            "peer_id": "peer-1",
            "name": "Alex",
            "role": "student"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);

    // The pushed join folds into the snapshot.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let (_, body) = request(app, Method::GET, &format!("/sessions/{}", id), None).await;
    assert_eq!(body["session"]["participant_count"], 1);
}

#[tokio::test]
async fn end_session_tears_the_coordinator_down() {
    let app = app();
    let id = create_session(&app).await;

    let (status, _) = request(
        app.clone(),
        Method::DELETE,
        &format!("/sessions/{}", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request(app, Method::GET, &format!("/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
