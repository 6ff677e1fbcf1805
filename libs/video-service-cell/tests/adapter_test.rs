use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use session_cell::{ParticipantId, ParticipantRole, SessionId};
use shared_config::VideoProvider;
use shared_utils::test_utils::TestConfig;
use video_service_cell::{
    ConnectionEvent, ConnectionState, JoinSessionRequest, ParticipantEvent, VideoServiceError,
    VideoServiceFactory,
};

async fn zoom_service_against(server: &MockServer) -> std::sync::Arc<dyn video_service_cell::VideoService> {
    let config = TestConfig::for_provider(VideoProvider::Zoom)
        .with_server(&server.uri())
        .to_app_config();
    VideoServiceFactory::new(&config).unwrap().create().unwrap()
}

async fn agora_service_against(server: &MockServer) -> std::sync::Arc<dyn video_service_cell::VideoService> {
    let config = TestConfig::for_provider(VideoProvider::Agora)
        .with_server(&server.uri())
        .to_app_config();
    VideoServiceFactory::new(&config).unwrap().create().unwrap()
}

fn join_request(session: &str, name: &str, role: ParticipantRole) -> JoinSessionRequest {
    JoinSessionRequest::new(SessionId::new(session).unwrap(), name, role)
}

#[tokio::test]
async fn zoom_join_returns_participant_and_session_info() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/videosdk/apps/test-app-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "active" })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/videosdk/sessions"))
        .and(body_partial_json(json!({ "session_name": "yoga-101" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "vnd-session-1",
            "user_id": "u-77"
        })))
        .mount(&server)
        .await;

    let service = zoom_service_against(&server).await;

    // Subscribe before initialize: broadcast receivers only see events
    // emitted after the subscription.
    let mut participants = service.events().subscribe_participant();
    let mut connections = service.events().subscribe_connection();

    service.initialize().await.unwrap();

    let result = service
        .join_session(join_request("yoga-101", "Sarah", ParticipantRole::Coach))
        .await
        .unwrap();

    assert_eq!(result.participant.name(), "Sarah");
    assert_eq!(result.participant.id().as_str(), "u-77");
    assert_eq!(result.session_info.vendor_session_ref, "vnd-session-1");

    let joined = participants.recv().await.unwrap();
    assert_matches!(joined.event, ParticipantEvent::Joined(p) if p.id().as_str() == "u-77");

    // Initialize emits Connecting, join emits Connected.
    let first = connections.recv().await.unwrap();
    assert_matches!(
        first.event,
        ConnectionEvent::StateChanged { state: ConnectionState::Connecting }
    );
    let second = connections.recv().await.unwrap();
    assert_matches!(
        second.event,
        ConnectionEvent::StateChanged { state: ConnectionState::Connected }
    );
}

#[tokio::test]
async fn zoom_join_includes_a_signed_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/videosdk/apps/test-app-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    // The signer is configured with a secret, so the join body must
    // carry a token. Matching on the key alone keeps the assertion
    // independent of the exact claims.
    Mock::given(method("POST"))
        .and(path("/videosdk/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "vnd-1", "user_id": "u-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = zoom_service_against(&server).await;
    service.initialize().await.unwrap();
    service
        .join_session(join_request("hiit-5", "Alex", ParticipantRole::Student))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let join = requests
        .iter()
        .find(|r| r.url.path() == "/videosdk/sessions")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&join.body).unwrap();
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn zoom_vendor_errors_are_normalized() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/videosdk/apps/test-app-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/videosdk/sessions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("too many sessions"))
        .mount(&server)
        .await;

    let service = zoom_service_against(&server).await;
    service.initialize().await.unwrap();

    let result = service
        .join_session(join_request("spin-2", "Kim", ParticipantRole::Student))
        .await;
    assert_matches!(result, Err(VideoServiceError::Vendor(message)) if message.contains("429"));
}

#[tokio::test]
async fn zoom_initialize_fails_against_a_dead_endpoint() {
    let config = TestConfig::for_provider(VideoProvider::Zoom)
        .with_server("http://127.0.0.1:1")
        .to_app_config();
    let service = VideoServiceFactory::new(&config).unwrap().create().unwrap();

    let result = service.initialize().await;
    assert_matches!(result, Err(VideoServiceError::Initialization(_)));
}

#[tokio::test]
async fn coach_controls_hit_the_vendor_control_endpoints() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/videosdk/apps/test-app-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/videosdk/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "vnd-9", "user_id": "coach-1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/videosdk/sessions/vnd-9/users/student-4/mute"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/videosdk/sessions/vnd-9/spotlight"))
        .and(body_partial_json(json!({ "user_id": "student-4" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let service = zoom_service_against(&server).await;
    service.initialize().await.unwrap();
    service
        .join_session(join_request("box-1", "Sarah", ParticipantRole::Coach))
        .await
        .unwrap();

    let student = ParticipantId::new("student-4").unwrap();
    service.mute_participant(&student).await.unwrap();
    service.spotlight_participant(&student).await.unwrap();
}

#[tokio::test]
async fn agora_join_normalizes_numeric_uids() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/apps/test-app-id/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/apps/test-app-id/channels/pilates-3/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uid": 424242,
            "channel": "pilates-3"
        })))
        .mount(&server)
        .await;

    let service = agora_service_against(&server).await;
    service.initialize().await.unwrap();

    let result = service
        .join_session(join_request("pilates-3", "Maya", ParticipantRole::Student))
        .await
        .unwrap();

    assert_eq!(result.participant.id().as_str(), "424242");
    assert_eq!(result.session_info.vendor_session_ref, "pilates-3");
}

#[tokio::test]
async fn agora_join_without_uid_is_a_vendor_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/apps/test-app-id/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/apps/test-app-id/channels/barre-7/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "channel": "barre-7" })))
        .mount(&server)
        .await;

    let service = agora_service_against(&server).await;
    service.initialize().await.unwrap();

    let result = service
        .join_session(join_request("barre-7", "Noah", ParticipantRole::Student))
        .await;
    assert_matches!(result, Err(VideoServiceError::Vendor(message)) if message.contains("uid"));
}

#[tokio::test]
async fn operations_before_join_report_not_joined() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/videosdk/apps/test-app-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let service = zoom_service_against(&server).await;
    service.initialize().await.unwrap();

    assert_matches!(
        service.enable_video().await,
        Err(VideoServiceError::NotJoined)
    );
    assert_matches!(
        service.connection_statistics().await,
        Err(VideoServiceError::NotJoined)
    );
}

#[tokio::test]
async fn destroy_closes_every_event_stream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/videosdk/apps/test-app-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let service = zoom_service_against(&server).await;

    let events = service.events();
    let mut participant = events.subscribe_participant();
    let mut video = events.subscribe_video();
    let mut audio = events.subscribe_audio();
    let mut connection = events.subscribe_connection();
    let mut scaling = events.subscribe_scaling();

    service.initialize().await.unwrap();
    // Drain the Connecting emission from initialize.
    connection.recv().await.unwrap();

    service.destroy().await.unwrap();

    assert!(participant.recv().await.is_err());
    assert!(video.recv().await.is_err());
    assert!(audio.recv().await.is_err());
    assert!(connection.recv().await.is_err());
    assert!(scaling.recv().await.is_err());

    // Subscribing after the fact yields an already-terminated stream.
    let mut late = events.subscribe_participant();
    assert!(late.recv().await.is_err());
}
