//! End-to-end session tests over the in-process transport.
//!
//! Each test plays the broker side of the STOMP conversation through a
//! `PeerConnection`, so no network or real broker is needed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use uni_earn_notifications::config::StompConfig;
use uni_earn_notifications::stomp::{ChannelConnector, Command, Frame, PeerConnection};
use uni_earn_notifications::subscription::Role;
use uni_earn_notifications::{
    AppError, ConnectionState, Notification, NotificationClient, NotificationService,
    NotificationType,
};

const TIMEOUT: Duration = Duration::from_secs(2);

type Received = Arc<Mutex<Vec<(Notification, NotificationType)>>>;

fn token(claims: serde_json::Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"backend-secret"),
    )
    .unwrap()
}

fn test_config() -> StompConfig {
    StompConfig {
        url: "ws://broker.test:8080/ws".to_string(),
        reconnect_delay_ms: 20,
        heartbeat_incoming_ms: 0,
        heartbeat_outgoing_ms: 0,
        ..Default::default()
    }
}

fn create_service(config: StompConfig) -> (NotificationService, UnboundedReceiver<PeerConnection>) {
    let (connector, accepted) = ChannelConnector::new();
    (
        NotificationService::with_connector(config, Arc::new(connector)),
        accepted,
    )
}

fn recorder() -> (
    impl Fn(Notification, NotificationType) + Send + Sync + 'static,
    Received,
) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let handler = move |notification: Notification, kind: NotificationType| {
        sink.lock().unwrap().push((notification, kind));
    };
    (handler, received)
}

async fn accept(accepted: &mut UnboundedReceiver<PeerConnection>) -> PeerConnection {
    timeout(TIMEOUT, accepted.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("connector dropped")
}

async fn next_frame(peer: &mut PeerConnection) -> Frame {
    timeout(TIMEOUT, peer.recv_frame())
        .await
        .expect("timed out waiting for a frame")
        .expect("client closed the connection")
}

/// Answer the CONNECT frame and collect the SUBSCRIBE frames that follow
async fn handshake(peer: &mut PeerConnection, heartbeat: &str, subscriptions: usize) -> (Frame, Vec<Frame>) {
    let connect = next_frame(peer).await;
    assert_eq!(connect.command, Command::Connect);

    peer.send_frame(
        &Frame::new(Command::Connected)
            .header("version", "1.2")
            .header("heart-beat", heartbeat),
    )
    .unwrap();

    let mut subscribes = Vec::new();
    for _ in 0..subscriptions {
        let frame = next_frame(peer).await;
        assert_eq!(frame.command, Command::Subscribe);
        subscribes.push(frame);
    }
    (connect, subscribes)
}

fn destinations(subscribes: &[Frame]) -> Vec<&str> {
    subscribes
        .iter()
        .map(|f| f.get_header("destination").unwrap())
        .collect()
}

fn subscription_id<'a>(subscribes: &'a [Frame], destination: &str) -> &'a str {
    subscribes
        .iter()
        .find(|f| f.get_header("destination") == Some(destination))
        .and_then(|f| f.get_header("id"))
        .expect("destination was not subscribed")
}

fn send_message(peer: &PeerConnection, subscribes: &[Frame], destination: &str, body: &str) {
    let frame = Frame::new(Command::Message)
        .header("subscription", subscription_id(subscribes, destination))
        .header("destination", destination)
        .header("message-id", "m-1")
        .body(body);
    peer.send_frame(&frame).unwrap();
}

async fn wait_for_count(received: &Received, count: usize) {
    timeout(TIMEOUT, async {
        loop {
            if received.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for notifications");
}

// =============================================================================
// Connect & Subscriptions
// =============================================================================

#[tokio::test]
async fn test_student_subscribes_to_five_channels() {
    let (service, mut accepted) = create_service(test_config());
    let (handler, _received) = recorder();
    let bearer = token(json!({"role": "STUDENT", "user_id": 42}));

    let session = service.connect("42", handler, &bearer).unwrap();
    assert_eq!(session.role(), Some(Role::Student));
    assert_eq!(session.channels().len(), 5);

    let mut peer = accept(&mut accepted).await;
    assert_eq!(peer.url, "ws://broker.test:8080/ws");

    let (connect, subscribes) = handshake(&mut peer, "0,0", 5).await;
    let expected_auth = format!("Bearer {}", bearer);
    assert_eq!(connect.get_header("Authorization"), Some(expected_auth.as_str()));
    assert_eq!(connect.get_header("host"), Some("broker.test"));
    assert_eq!(connect.get_header("accept-version"), Some("1.2,1.1,1.0"));

    assert_eq!(
        destinations(&subscribes),
        vec![
            "/user/42/topic/job-notifications",
            "/user/42/topic/update-notifications",
            "/user/42/topic/admin-notifications",
            "/topic/admin-notifications",
            "/user/student/topic/admin-notifications",
        ]
    );
}

#[tokio::test]
async fn test_token_without_role_subscribes_to_four_channels() {
    let (service, mut accepted) = create_service(test_config());
    let (handler, _received) = recorder();

    let session = service.connect("42", handler, &token(json!({}))).unwrap();
    assert_eq!(session.role(), None);

    let mut peer = accept(&mut accepted).await;
    let (_, subscribes) = handshake(&mut peer, "0,0", 4).await;

    assert_eq!(
        destinations(&subscribes),
        vec![
            "/user/42/topic/job-notifications",
            "/user/42/topic/update-notifications",
            "/user/42/topic/admin-notifications",
            "/topic/admin-notifications",
        ]
    );

    // Nothing else follows the four subscriptions
    let extra = timeout(Duration::from_millis(50), peer.recv_frame()).await;
    assert!(extra.is_err());
}

#[tokio::test]
async fn test_role_specific_channel_per_role() {
    let cases = [
        ("EMPLOYER", "/user/employer/topic/admin-notifications"),
        ("admin", "/user/admin/topic/report-notifications"),
        ("Student", "/user/student/topic/admin-notifications"),
    ];

    for (role, destination) in cases {
        let (service, mut accepted) = create_service(test_config());
        let (handler, _received) = recorder();

        let _session = service
            .connect("someone", handler, &token(json!({"role": role})))
            .unwrap();
        let mut peer = accept(&mut accepted).await;
        let (_, subscribes) = handshake(&mut peer, "0,0", 5).await;

        assert_eq!(destinations(&subscribes)[4], destination, "role {}", role);
    }
}

#[tokio::test]
async fn test_unknown_role_gets_common_channels_only() {
    let (service, _accepted) = create_service(test_config());
    let (handler, _received) = recorder();

    let session = service
        .connect("mod", handler, &token(json!({"role": "MODERATOR"})))
        .unwrap();

    assert_eq!(session.role(), None);
    assert_eq!(session.channels().len(), 4);
}

// =============================================================================
// Token & Argument Errors
// =============================================================================

#[tokio::test]
async fn test_malformed_token_aborts_before_connecting() {
    let (service, mut accepted) = create_service(test_config());
    let (handler, _received) = recorder();

    let result = service.connect("42", handler, "not-a-jwt");

    assert!(matches!(result, Err(AppError::TokenDecode(_))));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(accepted.try_recv().is_err());
}

#[tokio::test]
async fn test_empty_arguments_are_rejected() {
    let (service, _accepted) = create_service(test_config());

    let (handler, _received) = recorder();
    let result = service.connect("", handler, &token(json!({})));
    assert!(matches!(result, Err(AppError::Validation(_))));

    let (handler, _received) = recorder();
    let result = service.connect("42", handler, "");
    assert!(matches!(result, Err(AppError::Validation(_))));
}

// =============================================================================
// Message Normalization & Dispatch
// =============================================================================

#[tokio::test]
async fn test_admin_report_channel_forces_system_type() {
    let (service, mut accepted) = create_service(test_config());
    let (handler, received) = recorder();

    let _session = service
        .connect("root", handler, &token(json!({"role": "ADMIN"})))
        .unwrap();
    let mut peer = accept(&mut accepted).await;
    let (_, subscribes) = handshake(&mut peer, "0,0", 5).await;

    send_message(
        &peer,
        &subscribes,
        "/user/admin/topic/report-notifications",
        r#"{"type":"job","message":"x"}"#,
    );
    wait_for_count(&received, 1).await;

    let received = received.lock().unwrap();
    let (notification, kind) = &received[0];
    assert_eq!(*kind, NotificationType::System);
    assert_eq!(notification.kind(), NotificationType::System);
    assert_eq!(notification.message(), Some("x"));
}

#[tokio::test]
async fn test_channel_defaults_and_payload_types() {
    let (service, mut accepted) = create_service(test_config());
    let (handler, received) = recorder();

    let session = service
        .connect("42", handler, &token(json!({"role": "STUDENT"})))
        .unwrap();
    let mut peer = accept(&mut accepted).await;
    let (_, subscribes) = handshake(&mut peer, "0,0", 5).await;

    send_message(&peer, &subscribes, "/user/42/topic/job-notifications", r#"{"jobId":7}"#);
    send_message(&peer, &subscribes, "/user/42/topic/update-notifications", r#"{"type":"job","jobId":8}"#);
    send_message(&peer, &subscribes, "/user/42/topic/update-notifications", "Application accepted");
    send_message(&peer, &subscribes, "/topic/admin-notifications", r#"{"title":"Maintenance"}"#);
    wait_for_count(&received, 4).await;

    let received = received.lock().unwrap();
    assert_eq!(
        received[0].0.clone().into_value(),
        json!({"jobId": 7, "type": "job"})
    );
    assert_eq!(received[1].1, NotificationType::Job);
    assert_eq!(
        received[2].0.clone().into_value(),
        json!({"message": "Application accepted", "type": "update"})
    );
    assert_eq!(received[2].1, NotificationType::Update);
    assert_eq!(received[3].1, NotificationType::System);

    let stats = session.stats();
    assert_eq!(stats.total_dispatched, 4);
    assert_eq!(stats.fallbacks, 1);
}

#[tokio::test]
async fn test_messages_on_one_channel_keep_order() {
    let (service, mut accepted) = create_service(test_config());
    let (handler, received) = recorder();

    let _session = service.connect("42", handler, &token(json!({}))).unwrap();
    let mut peer = accept(&mut accepted).await;
    let (_, subscribes) = handshake(&mut peer, "0,0", 4).await;

    for i in 0..10 {
        send_message(
            &peer,
            &subscribes,
            "/user/42/topic/job-notifications",
            &json!({"seq": i}).to_string(),
        );
    }
    wait_for_count(&received, 10).await;

    let seqs: Vec<i64> = received
        .lock()
        .unwrap()
        .iter()
        .map(|(n, _)| n.get("seq").and_then(|v| v.as_i64()).unwrap())
        .collect();
    assert_eq!(seqs, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_message_for_unknown_subscription_is_ignored() {
    let (service, mut accepted) = create_service(test_config());
    let (handler, received) = recorder();

    let _session = service.connect("42", handler, &token(json!({}))).unwrap();
    let mut peer = accept(&mut accepted).await;
    let (_, subscribes) = handshake(&mut peer, "0,0", 4).await;

    peer.send_frame(
        &Frame::new(Command::Message)
            .header("subscription", "sub-99")
            .body("stray"),
    )
    .unwrap();
    send_message(&peer, &subscribes, "/user/42/topic/job-notifications", "after");
    wait_for_count(&received, 1).await;

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0.message(), Some("after"));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_state_reaches_connected() {
    let (service, mut accepted) = create_service(test_config());
    let (handler, _received) = recorder();

    let session = service.connect("42", handler, &token(json!({}))).unwrap();
    let mut state_rx = session.watch_state();

    let mut peer = accept(&mut accepted).await;
    handshake(&mut peer, "0,0", 4).await;

    timeout(
        TIMEOUT,
        state_rx.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("never connected")
    .unwrap();
}

#[tokio::test]
async fn test_disconnect_sends_disconnect_frame_and_stops() {
    let (service, mut accepted) = create_service(test_config());
    let (handler, _received) = recorder();

    let session = service.connect("42", handler, &token(json!({}))).unwrap();
    let mut peer = accept(&mut accepted).await;
    handshake(&mut peer, "0,0", 4).await;

    session.disconnect();
    session.disconnect();

    let frame = next_frame(&mut peer).await;
    assert_eq!(frame.command, Command::Disconnect);
    assert!(frame.get_header("receipt").is_some());

    let closed = timeout(TIMEOUT, peer.recv_frame()).await.unwrap();
    assert!(closed.is_none());

    let mut state_rx = session.watch_state();
    timeout(
        TIMEOUT,
        state_rx.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(!session.is_active());

    // No reconnect after an explicit disconnect
    let reconnect = timeout(Duration::from_millis(100), accepted.recv()).await;
    assert!(reconnect.is_err());
}

#[tokio::test]
async fn test_reconnects_and_resubscribes_after_transport_closes() {
    let (service, mut accepted) = create_service(test_config());
    let (handler, received) = recorder();

    let _session = service
        .connect("42", handler, &token(json!({"role": "EMPLOYER"})))
        .unwrap();

    let mut first = accept(&mut accepted).await;
    let (_, first_subs) = handshake(&mut first, "0,0", 5).await;
    drop(first);

    let mut second = accept(&mut accepted).await;
    let (connect, second_subs) = handshake(&mut second, "0,0", 5).await;
    assert!(connect.get_header("Authorization").is_some());
    assert_eq!(destinations(&first_subs), destinations(&second_subs));

    send_message(
        &second,
        &second_subs,
        "/user/employer/topic/admin-notifications",
        "Your posting was approved",
    );
    wait_for_count(&received, 1).await;
    assert_eq!(received.lock().unwrap()[0].1, NotificationType::System);
}

#[tokio::test]
async fn test_error_frame_marks_session_errored() {
    let config = StompConfig {
        reconnect_delay_ms: 60_000,
        ..test_config()
    };
    let (service, mut accepted) = create_service(config);
    let (handler, _received) = recorder();

    let session = service.connect("42", handler, &token(json!({}))).unwrap();
    let mut peer = accept(&mut accepted).await;
    next_frame(&mut peer).await;

    peer.send_frame(
        &Frame::new(Command::Error)
            .header("message", "Access denied")
            .body("invalid token"),
    )
    .unwrap();

    let mut state_rx = session.watch_state();
    timeout(TIMEOUT, state_rx.wait_for(|s| *s == ConnectionState::Errored))
        .await
        .expect("session never errored")
        .unwrap();

    let closed = timeout(TIMEOUT, peer.recv_frame()).await.unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_reconnect_disabled_stops_after_close() {
    let config = StompConfig {
        reconnect_delay_ms: 0,
        ..test_config()
    };
    let (service, mut accepted) = create_service(config);
    let (handler, _received) = recorder();

    let session = service.connect("42", handler, &token(json!({}))).unwrap();
    let mut peer = accept(&mut accepted).await;
    handshake(&mut peer, "0,0", 4).await;
    drop(peer);

    let reconnect = timeout(Duration::from_millis(100), accepted.recv()).await;
    assert!(reconnect.is_err());
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

// =============================================================================
// Heartbeats
// =============================================================================

#[tokio::test]
async fn test_client_sends_heartbeats() {
    let config = StompConfig {
        heartbeat_outgoing_ms: 20,
        ..test_config()
    };
    let (service, mut accepted) = create_service(config);
    let (handler, _received) = recorder();

    let _session = service.connect("42", handler, &token(json!({}))).unwrap();
    let mut peer = accept(&mut accepted).await;

    let connect = next_frame(&mut peer).await;
    assert_eq!(connect.get_header("heart-beat"), Some("20,0"));
    peer.send_frame(&Frame::new(Command::Connected).header("heart-beat", "0,20"))
        .unwrap();

    let heartbeat = timeout(TIMEOUT, async {
        loop {
            match peer.recv_text().await {
                Some(text) if text == "\n" => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    })
    .await
    .expect("no heartbeat received");
    assert!(heartbeat);
}

#[tokio::test]
async fn test_missing_broker_heartbeats_trigger_reconnect() {
    let config = StompConfig {
        heartbeat_incoming_ms: 20,
        ..test_config()
    };
    let (service, mut accepted) = create_service(config);
    let (handler, _received) = recorder();

    let _session = service.connect("42", handler, &token(json!({}))).unwrap();
    let mut silent = accept(&mut accepted).await;
    handshake(&mut silent, "20,0", 4).await;

    // The broker promised heartbeats every 20ms and sends none
    let mut second = accept(&mut accepted).await;
    let connect = next_frame(&mut second).await;
    assert_eq!(connect.command, Command::Connect);
}

#[tokio::test]
async fn test_service_sessions_are_independent() {
    let (service, mut accepted) = create_service(test_config());

    let (first_handler, first_received) = recorder();
    let first = service
        .connect("alice", first_handler, &token(json!({"role": "STUDENT"})))
        .unwrap();
    let mut first_peer = accept(&mut accepted).await;
    let (_, first_subs) = handshake(&mut first_peer, "0,0", 5).await;

    let (second_handler, second_received) = recorder();
    let second = service
        .connect("bob", second_handler, &token(json!({"role": "EMPLOYER"})))
        .unwrap();
    let mut second_peer = accept(&mut accepted).await;
    let (_, second_subs) = handshake(&mut second_peer, "0,0", 5).await;

    assert_ne!(first.id(), second.id());

    send_message(&first_peer, &first_subs, "/user/alice/topic/job-notifications", "for alice");
    send_message(&second_peer, &second_subs, "/user/bob/topic/update-notifications", "for bob");
    wait_for_count(&first_received, 1).await;
    wait_for_count(&second_received, 1).await;

    // Let any misrouted delivery land before checking counts
    tokio::time::sleep(Duration::from_millis(20)).await;
    {
        let first_received = first_received.lock().unwrap();
        let second_received = second_received.lock().unwrap();
        assert_eq!(first_received.len(), 1);
        assert_eq!(first_received[0].0.message(), Some("for alice"));
        assert_eq!(second_received.len(), 1);
        assert_eq!(second_received[0].0.message(), Some("for bob"));
    }

    first.disconnect();
    let frame = next_frame(&mut first_peer).await;
    assert_eq!(frame.command, Command::Disconnect);
    let mut first_state = first.watch_state();
    timeout(
        TIMEOUT,
        first_state.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(second.state(), ConnectionState::Connected);
    assert!(second.is_active());

    send_message(&second_peer, &second_subs, "/user/bob/topic/job-notifications", "still here");
    wait_for_count(&second_received, 2).await;
}

// =============================================================================
// Caller-owned Client
// =============================================================================

#[tokio::test]
async fn test_client_disconnect_without_session_is_noop() {
    let (service, _accepted) = create_service(test_config());
    let mut client = NotificationClient::new(service);

    client.disconnect();
    client.disconnect();
    assert!(!client.has_session());
}

#[tokio::test]
async fn test_client_connect_twice_replaces_previous_session() {
    let (service, mut accepted) = create_service(test_config());
    let mut client = NotificationClient::new(service);
    let bearer = token(json!({"role": "STUDENT"}));

    let (handler, _received) = recorder();
    client.connect("42", handler, &bearer).unwrap();
    let first_id = client.session().unwrap().id();
    let mut first = accept(&mut accepted).await;
    handshake(&mut first, "0,0", 5).await;

    let (handler, _received) = recorder();
    client.connect("42", handler, &bearer).unwrap();
    let second_id = client.session().unwrap().id();
    assert_ne!(first_id, second_id);

    // The first connection is closed rather than leaked
    let frame = next_frame(&mut first).await;
    assert_eq!(frame.command, Command::Disconnect);

    let mut second = accept(&mut accepted).await;
    handshake(&mut second, "0,0", 5).await;
    assert!(client.session().unwrap().is_active());
}

#[tokio::test]
async fn test_client_keeps_session_when_new_token_is_bad() {
    let (service, mut accepted) = create_service(test_config());
    let mut client = NotificationClient::new(service);

    let (handler, _received) = recorder();
    client.connect("42", handler, &token(json!({}))).unwrap();
    let id = client.session().unwrap().id();
    let _peer = accept(&mut accepted).await;

    let (handler, _received) = recorder();
    assert!(client.connect("42", handler, "garbage").is_err());
    assert_eq!(client.session().unwrap().id(), id);
}
