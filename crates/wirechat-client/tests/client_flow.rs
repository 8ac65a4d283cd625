//! End-to-end client flows over the fake transport
//!
//! Scripts the server side of the wire protocol and verifies the client's
//! observable behavior: outbound frames, notifications, and the state
//! reachable through queries. Event processing is asynchronous, so tests
//! synchronize on notifications (published after state changes under the
//! same lock) or poll the fake's sent-frame records under a timeout.

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use wirechat_core::{
    ChatMessage, ChatSession, ChatUser, ClientEvent, ErrorKind, LifecycleError, MessageId,
    MessageSender, ServerEvent, SessionId, SessionState, UserId, UserProfile, WirechatConfig,
    WirechatError,
};

use wirechat_client::{ChatClient, ConnectionState, FakeTransport, Notification};

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

fn profile() -> UserProfile {
    UserProfile::new("u1", "ada", "tok")
}

fn msg(id: &str, session: &str, content: &str, at_secs: i64) -> ChatMessage {
    ChatMessage {
        id: MessageId::new(id),
        sender: Some(MessageSender {
            id: Some(UserId::new("u2")),
            username: "grace".into(),
        }),
        content: content.into(),
        session: SessionId::new(session),
        created_at: chrono::DateTime::from_timestamp(at_secs, 0).expect("valid timestamp"),
        server_message: false,
    }
}

fn session(id: &str, messages: Vec<ChatMessage>) -> ChatSession {
    ChatSession {
        id: SessionId::new(id),
        owner: ChatUser::new("u1", "ada"),
        messages,
    }
}

async fn next_notification(rx: &mut mpsc::Receiver<Notification>) -> Notification {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for a notification")
        .expect("notification channel closed")
}

/// Receive notifications until one matches, discarding the rest.
async fn await_notification<F>(rx: &mut mpsc::Receiver<Notification>, matches: F) -> Notification
where
    F: Fn(&Notification) -> bool,
{
    loop {
        let notification = next_notification(rx).await;
        if matches(&notification) {
            return notification;
        }
    }
}

/// Poll until the condition holds; processing runs on the dispatcher task.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not met within timeout");
}

/// A connected client with the startup snapshot request already consumed,
/// so sent-frame assertions start clean.
async fn connected_client() -> (ChatClient<FakeTransport>, mpsc::Receiver<Notification>) {
    let (transport, events) = FakeTransport::new(32);
    let client = ChatClient::new(transport, events, profile(), WirechatConfig::testing())
        .expect("failed to build client");
    let (_id, mut notifications) = client.subscribe().await;

    client.connect().await.expect("connect failed");
    await_notification(&mut notifications, |n| {
        matches!(
            n,
            Notification::ConnectionChanged {
                state: ConnectionState::Connected
            }
        )
    })
    .await;
    wait_until(|| {
        client
            .transport()
            .sent_client_events()
            .iter()
            .any(|e| matches!(e, ClientEvent::GetSessions { .. }))
    })
    .await;
    client.transport().clear_sent();

    (client, notifications)
}

/// Push a snapshot and wait for it to be applied.
async fn install_snapshot(
    client: &ChatClient<FakeTransport>,
    notifications: &mut mpsc::Receiver<Notification>,
    sessions: Vec<ChatSession>,
) {
    client
        .transport()
        .push_server_event(&ServerEvent::SessionsList(sessions))
        .await
        .expect("failed to push snapshot");
    await_notification(notifications, |n| {
        matches!(n, Notification::SessionsUpdated { .. })
    })
    .await;
}

/// Join a session and wait for the confirmation to be applied.
async fn join_session(
    client: &ChatClient<FakeTransport>,
    notifications: &mut mpsc::Receiver<Notification>,
    id: &str,
    messages: Vec<ChatMessage>,
) {
    client
        .create_or_join(Some(SessionId::new(id)))
        .await
        .expect("join intent rejected");
    client
        .transport()
        .push_server_event(&ServerEvent::SessionJoined {
            session_id: SessionId::new(id),
            messages,
        })
        .await
        .expect("failed to push confirmation");
    await_notification(notifications, |n| {
        matches!(n, Notification::SessionJoined { .. })
    })
    .await;
}

// ----------------------------------------------------------------------------
// Connection and snapshot
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_connect_requests_session_snapshot() {
    let (transport, events) = FakeTransport::new(32);
    let client = ChatClient::new(transport, events, profile(), WirechatConfig::testing())
        .expect("failed to build client");
    let (_id, mut notifications) = client.subscribe().await;

    client.connect().await.expect("connect failed");

    await_notification(&mut notifications, |n| {
        matches!(
            n,
            Notification::ConnectionChanged {
                state: ConnectionState::Connected
            }
        )
    })
    .await;
    wait_until(|| !client.transport().sent_client_events().is_empty()).await;

    assert_eq!(
        client.transport().sent_client_events(),
        vec![ClientEvent::GetSessions {
            user_id: UserId::new("u1"),
        }]
    );
}

#[tokio::test]
async fn test_snapshot_populates_sessions_and_logs() {
    let (client, mut notifications) = connected_client().await;

    install_snapshot(
        &client,
        &mut notifications,
        vec![
            session("s1", vec![msg("m1", "s1", "hello", 10)]),
            session("s2", vec![]),
        ],
    )
    .await;

    let sessions = client.sessions().await;
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].id, SessionId::new("s1"));

    // s1 has history, s2 is known-empty, s3 was never delivered.
    assert_eq!(
        client.messages(&SessionId::new("s1")).await.unwrap().len(),
        1
    );
    assert_eq!(client.messages(&SessionId::new("s2")).await, Some(vec![]));
    assert_eq!(client.messages(&SessionId::new("s3")).await, None);
}

#[tokio::test]
async fn test_snapshot_replaces_previous_session_set() {
    let (client, mut notifications) = connected_client().await;

    install_snapshot(&client, &mut notifications, vec![session("s1", vec![])]).await;
    install_snapshot(&client, &mut notifications, vec![session("s2", vec![])]).await;

    let sessions = client.sessions().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, SessionId::new("s2"));
    // The delisted session's log is retained until replaced.
    assert_eq!(client.messages(&SessionId::new("s1")).await, Some(vec![]));
}

#[tokio::test]
async fn test_snapshot_with_duplicate_ids_is_rejected_wholesale() {
    let (client, mut notifications) = connected_client().await;
    install_snapshot(&client, &mut notifications, vec![session("s1", vec![])]).await;

    client
        .transport()
        .push_server_event(&ServerEvent::SessionsList(vec![
            session("dup", vec![]),
            session("dup", vec![]),
        ]))
        .await
        .expect("failed to push snapshot");

    let reported = await_notification(&mut notifications, |n| {
        matches!(n, Notification::ErrorReported { .. })
    })
    .await;
    let Notification::ErrorReported { report } = reported else {
        unreachable!()
    };
    assert_eq!(report.kind, ErrorKind::Protocol);

    // Previous snapshot stays in place.
    let sessions = client.sessions().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, SessionId::new("s1"));
}

// ----------------------------------------------------------------------------
// Join lifecycle
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_join_confirmation_activates_session_and_installs_history() {
    let (client, mut notifications) = connected_client().await;

    join_session(
        &client,
        &mut notifications,
        "s1",
        vec![msg("m1", "s1", "hi", 5), msg("m2", "s1", "there", 6)],
    )
    .await;

    assert_eq!(
        client.session_state().await,
        SessionState::Active(SessionId::new("s1"))
    );
    let history = client.messages(&SessionId::new("s1")).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, MessageId::new("m1"));
}

#[tokio::test]
async fn test_switching_sessions_sends_leave_before_join() {
    let (client, mut notifications) = connected_client().await;
    join_session(&client, &mut notifications, "s1", vec![]).await;
    client.transport().clear_sent();

    client
        .create_or_join(Some(SessionId::new("s2")))
        .await
        .expect("switch rejected");

    // Both frames are handed over before the intent call returns, leave
    // strictly first.
    assert_eq!(
        client.transport().sent_client_events(),
        vec![
            ClientEvent::LeaveSession {
                user_id: UserId::new("u1"),
                session_id: SessionId::new("s1"),
            },
            ClientEvent::JoinSession {
                user_id: UserId::new("u1"),
                session_id: Some(SessionId::new("s2")),
            },
        ]
    );
    assert!(client.session_state().await.is_joining());
}

#[tokio::test]
async fn test_create_from_idle_sends_null_target_and_no_leave() {
    let (client, _notifications) = connected_client().await;

    client.create_or_join(None).await.expect("create rejected");

    assert_eq!(
        client.transport().sent_client_events(),
        vec![ClientEvent::JoinSession {
            user_id: UserId::new("u1"),
            session_id: None,
        }]
    );
    // The null target must be explicit on the wire, not omitted.
    let frame: serde_json::Value =
        serde_json::from_str(&client.transport().sent_frames()[0]).expect("valid json");
    assert!(frame["data"]
        .as_object()
        .expect("data object")
        .contains_key("sessionId"));
    assert!(frame["data"]["sessionId"].is_null());
}

#[tokio::test]
async fn test_second_join_rejected_while_first_is_outstanding() {
    let (client, _notifications) = connected_client().await;

    client
        .create_or_join(Some(SessionId::new("s1")))
        .await
        .expect("first join rejected");
    let err = client
        .create_or_join(Some(SessionId::new("s2")))
        .await
        .expect_err("second join should be rejected");

    assert!(matches!(
        err,
        WirechatError::Lifecycle(LifecycleError::JoinPending)
    ));
    // Only the first join reached the wire.
    assert_eq!(client.transport().sent_client_events().len(), 1);
}

#[tokio::test]
async fn test_created_session_confirmation_arrives_with_fresh_history() {
    let (client, mut notifications) = connected_client().await;

    client.create_or_join(None).await.expect("create rejected");
    client
        .transport()
        .push_server_event(&ServerEvent::SessionJoined {
            session_id: SessionId::new("fresh"),
            messages: vec![],
        })
        .await
        .expect("failed to push confirmation");

    await_notification(&mut notifications, |n| {
        matches!(n, Notification::SessionJoined { .. })
    })
    .await;
    assert_eq!(
        client.session_state().await,
        SessionState::Active(SessionId::new("fresh"))
    );
    assert_eq!(
        client.messages(&SessionId::new("fresh")).await,
        Some(vec![])
    );
}

#[tokio::test]
async fn test_leave_returns_to_idle_and_sends_leave() {
    let (client, mut notifications) = connected_client().await;
    join_session(&client, &mut notifications, "s1", vec![]).await;
    client.transport().clear_sent();

    client.leave().await.expect("leave rejected");

    assert_eq!(client.session_state().await, SessionState::Idle);
    assert_eq!(
        client.transport().sent_client_events(),
        vec![ClientEvent::LeaveSession {
            user_id: UserId::new("u1"),
            session_id: SessionId::new("s1"),
        }]
    );

    let err = client.leave().await.expect_err("second leave should fail");
    assert!(matches!(
        err,
        WirechatError::Lifecycle(LifecycleError::NoActiveSession)
    ));
}

// ----------------------------------------------------------------------------
// Live messages
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_live_message_appends_and_notifies() {
    let (client, mut notifications) = connected_client().await;
    join_session(&client, &mut notifications, "s1", vec![msg("m1", "s1", "old", 5)]).await;

    client
        .transport()
        .push_server_event(&ServerEvent::NewMessage(msg("m2", "s1", "new", 9)))
        .await
        .expect("failed to push message");

    let appended = await_notification(&mut notifications, |n| {
        matches!(n, Notification::MessageAppended { .. })
    })
    .await;
    let Notification::MessageAppended { message } = appended else {
        unreachable!()
    };
    assert_eq!(message.id, MessageId::new("m2"));

    let history = client.messages(&SessionId::new("s1")).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, "new");
}

#[tokio::test]
async fn test_live_message_routes_by_embedded_session() {
    let (client, mut notifications) = connected_client().await;
    join_session(&client, &mut notifications, "s1", vec![]).await;

    // A message for another session is stored under that session, not the
    // active one.
    client
        .transport()
        .push_server_event(&ServerEvent::NewMessage(msg("m1", "s2", "elsewhere", 9)))
        .await
        .expect("failed to push message");
    await_notification(&mut notifications, |n| {
        matches!(n, Notification::MessageAppended { .. })
    })
    .await;

    assert_eq!(client.messages(&SessionId::new("s1")).await, Some(vec![]));
    assert_eq!(
        client.messages(&SessionId::new("s2")).await.unwrap()[0].content,
        "elsewhere"
    );
}

#[tokio::test]
async fn test_duplicate_live_message_is_dropped_loudly() {
    let (client, mut notifications) = connected_client().await;
    join_session(&client, &mut notifications, "s1", vec![]).await;

    let duplicate = msg("m1", "s1", "hi", 9);
    for _ in 0..2 {
        client
            .transport()
            .push_server_event(&ServerEvent::NewMessage(duplicate.clone()))
            .await
            .expect("failed to push message");
    }

    let reported = await_notification(&mut notifications, |n| {
        matches!(n, Notification::ErrorReported { .. })
    })
    .await;
    let Notification::ErrorReported { report } = reported else {
        unreachable!()
    };
    assert_eq!(report.kind, ErrorKind::Protocol);
    assert_eq!(client.messages(&SessionId::new("s1")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_send_message_reaches_wire_with_active_session() {
    let (client, mut notifications) = connected_client().await;
    join_session(&client, &mut notifications, "s1", vec![]).await;
    client.transport().clear_sent();

    client.send_message("  hello there  ").await.expect("send failed");

    // Content goes out exactly as typed; trimming is only for validation.
    assert_eq!(
        client.transport().sent_client_events(),
        vec![ClientEvent::SendMessage {
            user_id: UserId::new("u1"),
            session_id: SessionId::new("s1"),
            message: "  hello there  ".into(),
        }]
    );
    assert_eq!(client.stats().await.messages_sent, 1);
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_server_error_aborts_pending_join_and_is_retained() {
    let (client, mut notifications) = connected_client().await;
    client
        .create_or_join(Some(SessionId::new("s1")))
        .await
        .expect("join rejected");

    client
        .transport()
        .push_server_event(&ServerEvent::Error {
            message: "Session is full".into(),
        })
        .await
        .expect("failed to push error");

    let reported = await_notification(&mut notifications, |n| {
        matches!(n, Notification::ErrorReported { .. })
    })
    .await;
    let Notification::ErrorReported { report } = reported else {
        unreachable!()
    };
    assert_eq!(report.kind, ErrorKind::ServerReported);
    assert_eq!(report.detail, "Session is full");

    // The failed join no longer blocks a retry.
    assert_eq!(client.session_state().await, SessionState::Idle);
    assert!(client.create_or_join(None).await.is_ok());

    assert!(client.current_error().await.is_some());
    client.clear_error().await;
    assert!(client.current_error().await.is_none());
}

#[tokio::test]
async fn test_malformed_frame_is_dropped_without_disturbing_state() {
    let (client, mut notifications) = connected_client().await;
    join_session(&client, &mut notifications, "s1", vec![]).await;

    client.transport().push_frame("definitely not json").await;

    let reported = await_notification(&mut notifications, |n| {
        matches!(n, Notification::ErrorReported { .. })
    })
    .await;
    let Notification::ErrorReported { report } = reported else {
        unreachable!()
    };
    assert_eq!(report.kind, ErrorKind::Protocol);
    assert_eq!(
        client.session_state().await,
        SessionState::Active(SessionId::new("s1"))
    );

    // The dispatcher keeps processing after the bad frame.
    client
        .transport()
        .push_server_event(&ServerEvent::NewMessage(msg("m1", "s1", "still here", 9)))
        .await
        .expect("failed to push message");
    await_notification(&mut notifications, |n| {
        matches!(n, Notification::MessageAppended { .. })
    })
    .await;
}

#[tokio::test]
async fn test_invalid_join_history_leaves_join_outstanding() {
    let (client, mut notifications) = connected_client().await;
    client
        .create_or_join(Some(SessionId::new("s1")))
        .await
        .expect("join rejected");

    client
        .transport()
        .push_server_event(&ServerEvent::SessionJoined {
            session_id: SessionId::new("s1"),
            messages: vec![msg("m1", "s1", "a", 5), msg("m1", "s1", "b", 6)],
        })
        .await
        .expect("failed to push confirmation");

    await_notification(&mut notifications, |n| {
        matches!(n, Notification::ErrorReported { .. })
    })
    .await;
    assert!(client.session_state().await.is_joining());
    assert_eq!(client.messages(&SessionId::new("s1")).await, None);
}

// ----------------------------------------------------------------------------
// Reconnection and teardown
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_reconnect_refetches_the_session_list() {
    let (client, mut notifications) = connected_client().await;
    install_snapshot(&client, &mut notifications, vec![session("s1", vec![])]).await;

    client
        .transport()
        .set_state(ConnectionState::Disconnected)
        .await;
    await_notification(&mut notifications, |n| {
        matches!(
            n,
            Notification::ConnectionChanged {
                state: ConnectionState::Disconnected
            }
        )
    })
    .await;
    // Knowledge from the old connection is kept until replaced.
    assert_eq!(client.sessions().await.len(), 1);

    client.transport().set_state(ConnectionState::Connected).await;
    wait_until(|| {
        client
            .transport()
            .sent_client_events()
            .iter()
            .any(|e| matches!(e, ClientEvent::GetSessions { .. }))
    })
    .await;
}

#[tokio::test]
async fn test_sends_while_disconnected_drop_silently() {
    let (client, mut notifications) = connected_client().await;
    join_session(&client, &mut notifications, "s1", vec![]).await;
    client.transport().clear_sent();

    client
        .transport()
        .set_state(ConnectionState::Disconnected)
        .await;
    await_notification(&mut notifications, |n| {
        matches!(
            n,
            Notification::ConnectionChanged {
                state: ConnectionState::Disconnected
            }
        )
    })
    .await;

    // Succeeds locally; the frame is dropped by the transport.
    client.send_message("into the void").await.expect("send failed");
    assert!(client.transport().sent_client_events().is_empty());
    assert_eq!(client.transport().dropped_frames(), 1);
}

#[tokio::test]
async fn test_close_discards_session_position_without_leave() {
    let (client, mut notifications) = connected_client().await;
    join_session(&client, &mut notifications, "s1", vec![]).await;
    client.transport().clear_sent();

    client.close().await;

    assert_eq!(client.session_state().await, SessionState::Idle);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    // Closing is not leaving: no frame goes out.
    assert!(client.transport().sent_client_events().is_empty());
}

// ----------------------------------------------------------------------------
// Observers and wire shape
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_unsubscribed_observer_stops_receiving() {
    let (client, mut first) = connected_client().await;
    let (second_id, mut second) = client.subscribe().await;

    install_snapshot(&client, &mut first, vec![session("s1", vec![])]).await;
    await_notification(&mut second, |n| {
        matches!(n, Notification::SessionsUpdated { .. })
    })
    .await;

    assert!(client.unsubscribe(second_id).await);
    install_snapshot(&client, &mut first, vec![session("s2", vec![])]).await;

    // The registry half of the channel is gone.
    assert!(second.recv().await.is_none());
}

#[tokio::test]
async fn test_raw_wire_frames_drive_the_client() {
    let (client, mut notifications) = connected_client().await;
    client
        .create_or_join(Some(SessionId::new("s9")))
        .await
        .expect("join rejected");

    // Hand-built frame with the exact wire field names.
    let frame = json!({
        "event": "session_joined",
        "data": {
            "sessionId": "s9",
            "messages": [{
                "id": "m1",
                "content": "welcome",
                "session": "s9",
                "createdAt": "2026-01-05T10:00:00Z",
                "isServerMessage": true
            }]
        }
    });
    client.transport().push_frame(frame.to_string()).await;

    await_notification(&mut notifications, |n| {
        matches!(n, Notification::SessionJoined { .. })
    })
    .await;
    let history = client.messages(&SessionId::new("s9")).await.unwrap();
    assert_eq!(history.len(), 1);
    // No sender key means a server-originated notice.
    assert!(history[0].sender.is_none());
    assert!(history[0].server_message);
    assert_eq!(history[0].sender_label(), "Server");
}
