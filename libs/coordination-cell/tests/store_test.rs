use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use coordination_cell::services::{RestSessionStore, SessionStore};
use session_cell::{Participant, ParticipantId, ParticipantRole, SessionId, VideoSession};
use shared_config::VideoProvider;
use shared_database::{BackendClient, RealtimeHub};
use shared_utils::test_utils::TestConfig;

fn store_against(server: &MockServer) -> (RestSessionStore, Arc<RealtimeHub>) {
    let config = TestConfig::for_provider(VideoProvider::WebRtc)
        .with_server(&server.uri())
        .to_app_config();
    let realtime = Arc::new(RealtimeHub::new());
    (
        RestSessionStore::new(BackendClient::new(&config), Arc::clone(&realtime)),
        realtime,
    )
}

fn active_session() -> VideoSession {
    let session = VideoSession::new(SessionId::new("class-1").unwrap(), "Morning Flow", 10, true);
    session
        .add_participant(Participant::new(
            ParticipantId::new("a").unwrap(),
            "Sarah",
            ParticipantRole::Coach,
        ))
        .unwrap()
}

#[tokio::test]
async fn upsert_writes_the_session_row_and_broadcasts_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/video_sessions"))
        .and(body_partial_json(json!({
            "id": "class-1",
            "status": "active",
            "participant_count": 1,
            "coach_id": "a"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let (store, realtime) = store_against(&server);
    let mut rx = realtime.subscribe("class-1").await;

    store.upsert_session(&active_session()).await.unwrap();

    let payload: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(payload["type"], "status_changed");
    assert_eq!(payload["status"], "active");
}

#[tokio::test]
async fn record_join_upserts_the_participant_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/session_participants"))
        .and(body_partial_json(json!({
            "session_id": "class-1",
            "participant_id": "b",
            "role": "student"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let (store, realtime) = store_against(&server);
    let mut rx = realtime.subscribe("class-1").await;

    let student = Participant::new(
        ParticipantId::new("b").unwrap(),
        "Alex",
        ParticipantRole::Student,
    );
    store
        .record_join(&SessionId::new("class-1").unwrap(), &student)
        .await
        .unwrap();

    let payload: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(payload["type"], "participant_joined");
    assert_eq!(payload["participant_id"], "b");
}

#[tokio::test]
async fn record_leave_patches_the_row_with_a_timestamp() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path_regex(r"^/rest/v1/session_participants"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let (store, realtime) = store_against(&server);
    let mut rx = realtime.subscribe("class-1").await;

    store
        .record_leave(&SessionId::new("class-1").unwrap(), "b")
        .await
        .unwrap();

    let payload: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(payload["type"], "participant_left");
}

#[tokio::test]
async fn backend_errors_surface_to_the_caller() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/video_sessions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let (store, _realtime) = store_against(&server);
    let result = store.upsert_session(&active_session()).await;
    assert!(result.is_err());
}
