// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end session scenarios against a mock socket and a wiremock REST
//! backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parlor_core::{
    ChatState, CustomField, Environment, MessageDirection, ParlorError, SessionConfig, ThreadId,
    ThreadState,
};
use parlor_session::{ChatSession, OutboundMessage, SessionEvent};
use parlor_test_utils::{MockSocketFactory, MockTransport};

const SEND_TIMEOUT: Duration = Duration::from_secs(2);

fn channel_config(multi: bool, proactive: bool) -> Value {
    json!({
        "settings": {
            "hasMultipleThreadsPerEndUser": multi,
            "isProactiveChatEnabled": proactive
        },
        "isAuthorizationEnabled": false,
        "contactCustomFields": [{"ident": "email", "isRequired": false}],
        "customerCustomFields": [{"ident": "tier", "isRequired": false}]
    })
}

async fn start_server(config_body: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1.0/brand/1386/channel/chan-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&config_body))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/web-analytics/1\.0/tenants/1386/visitors/.+$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

fn authorized_frame(first_name: &str) -> String {
    json!({
        "eventType": "ConsumerAuthorized",
        "data": {
            "consumerIdentity": {"idOnExternalPlatform": "cust-1", "firstName": first_name},
            "accessToken": {"token": "tok-1", "expiresIn": 3600}
        }
    })
    .to_string()
}

fn msg_json(id: &str, thread: &str, text: &str, at: &str) -> Value {
    json!({
        "idOnExternalPlatform": id,
        "threadIdOnExternalPlatform": thread,
        "messageContent": {"type": "TEXT", "payload": {"text": text}},
        "direction": "outbound",
        "createdAt": at
    })
}

fn recovered_frame(
    thread: &str,
    messages: Vec<Value>,
    can_load_more: bool,
    token: Option<&str>,
) -> String {
    let mut data = json!({
        "thread": {"idOnExternalPlatform": thread},
        "messages": messages,
        "canLoadMoreMessages": can_load_more
    });
    if let Some(token) = token {
        data["messagesScrollToken"] = json!(token);
    }
    json!({"eventType": "ThreadRecovered", "data": data}).to_string()
}

async fn live_transport(factory: &MockSocketFactory) -> Arc<MockTransport> {
    for _ in 0..400 {
        if let Some(transport) = factory.try_transport().await {
            return transport;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("connection never opened");
}

async fn connect_session(config_body: Value) -> (ChatSession, Arc<MockSocketFactory>, MockServer) {
    let server = start_server(config_body).await;
    let environment = Environment::custom(server.uri(), "wss://unused", server.uri());
    let factory = Arc::new(MockSocketFactory::new());
    let session = ChatSession::with_socket_factory(
        SessionConfig::new(environment, 1386, "chan-1"),
        factory.clone(),
    )
    .unwrap();

    session.prepare().await.unwrap();
    assert_eq!(session.state().await, ChatState::Prepared);

    let task = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    let transport = live_transport(&factory).await;
    transport.wait_for_sent(1, SEND_TIMEOUT).await;
    factory.inject(authorized_frame("Ada")).await;
    task.await.unwrap().unwrap();
    assert_eq!(session.state().await, ChatState::Connected);

    (session, factory, server)
}

async fn wait_for_event(
    rx: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(SEND_TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn frame_json(frame: &str) -> Value {
    serde_json::from_str(frame).unwrap()
}

#[tokio::test]
async fn connect_authorizes_anonymous_customer() {
    let (_session, factory, _server) = connect_session(channel_config(true, false)).await;

    let frames = factory.transport().await.sent().await;
    let first = frame_json(&frames[0]);
    assert_eq!(first["action"], "register");
    assert_eq!(first["payload"]["eventType"], "authorizeCustomer");
    assert_eq!(first["payload"]["brand"]["id"], 1386);
    assert!(first["payload"]["consumerIdentity"]["idOnExternalPlatform"].is_string());
}

#[tokio::test]
async fn connect_is_illegal_before_prepare() {
    let server = start_server(channel_config(true, false)).await;
    let environment = Environment::custom(server.uri(), "wss://unused", server.uri());
    let session = ChatSession::with_socket_factory(
        SessionConfig::new(environment, 1386, "chan-1"),
        Arc::new(MockSocketFactory::new()),
    )
    .unwrap();

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, ParlorError::IllegalChatState { .. }));
}

#[tokio::test]
async fn prepare_reverts_to_initial_on_fetch_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1.0/brand/1386/channel/chan-1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let environment = Environment::custom(server.uri(), "wss://unused", server.uri());
    let session = ChatSession::with_socket_factory(
        SessionConfig::new(environment, 1386, "chan-1"),
        Arc::new(MockSocketFactory::new()),
    )
    .unwrap();

    assert!(session.prepare().await.is_err());
    assert_eq!(session.state().await, ChatState::Initial);
}

#[tokio::test]
async fn load_all_threads_is_one_list_fetch_plus_metadata_each() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let transport = factory.transport().await;
    let mut rx = session.subscribe();

    let task = {
        let session = session.clone();
        tokio::spawn(async move { session.load_thread(None).await })
    };

    let frames = transport.wait_for_sent(2, SEND_TIMEOUT).await;
    assert_eq!(frame_json(&frames[1])["payload"]["eventType"], "fetchThreadList");
    factory
        .inject(
            json!({
                "eventType": "ThreadListFetched",
                "data": {"threads": [{"idOnExternalPlatform": "t-1", "threadName": "Support"}]}
            })
            .to_string(),
        )
        .await;

    let frames = transport.wait_for_sent(3, SEND_TIMEOUT).await;
    let metadata = frame_json(&frames[2]);
    assert_eq!(metadata["payload"]["eventType"], "loadThreadMetadata");
    assert_eq!(
        metadata["payload"]["data"]["thread"]["idOnExternalPlatform"],
        "t-1"
    );
    factory
        .inject(
            json!({
                "eventType": "ThreadMetadataLoaded",
                "data": {"lastMessage": msg_json("m-1", "t-1", "hi", "2026-01-05T10:00:00Z")}
            })
            .to_string(),
        )
        .await;

    task.await.unwrap().unwrap();

    // Exactly one list fetch, one metadata load, plus the initial authorize.
    assert_eq!(transport.sent().await.len(), 3);

    wait_for_event(&mut rx, |e| matches!(e, SessionEvent::ThreadsUpdated)).await;
    let mut extra_updates = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, SessionEvent::ThreadsUpdated) {
            extra_updates += 1;
        }
    }
    assert_eq!(extra_updates, 0, "ThreadsUpdated must fire exactly once");

    let thread = session.thread(&ThreadId("t-1".into())).await.unwrap();
    assert_eq!(thread.state, ThreadState::Ready);
    assert_eq!(thread.name.as_deref(), Some("Support"));
    assert_eq!(thread.messages.len(), 1);
}

#[tokio::test]
async fn metadata_without_a_thread_reference_fails_the_load() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let transport = factory.transport().await;

    let task = {
        let session = session.clone();
        tokio::spawn(async move { session.load_thread(None).await })
    };

    transport.wait_for_sent(2, SEND_TIMEOUT).await;
    factory
        .inject(
            json!({
                "eventType": "ThreadListFetched",
                "data": {"threads": [
                    {"idOnExternalPlatform": "t-1", "threadName": "Support"},
                    {"idOnExternalPlatform": "t-2", "threadName": "Billing"}
                ]}
            })
            .to_string(),
        )
        .await;

    // Both metadata requests are in flight when a response arrives that
    // names no thread; it cannot be attributed, so the load must fail
    // rather than wait forever.
    transport.wait_for_sent(4, SEND_TIMEOUT).await;
    factory
        .inject(json!({"eventType": "ThreadMetadataLoaded", "data": {}}).to_string())
        .await;

    let err = tokio::time::timeout(SEND_TIMEOUT, task)
        .await
        .expect("load_thread must resolve")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ParlorError::InvalidData(_)));
}

#[tokio::test]
async fn archiving_a_pending_thread_needs_no_server_round_trip() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let transport = factory.transport().await;
    let sends_before = transport.sent().await.len();

    let id = session.create_thread(vec![]).await.unwrap();
    session.archive_thread(&id).await.unwrap();

    assert_eq!(
        session.thread(&id).await.unwrap().state,
        ThreadState::Closed
    );
    assert_eq!(transport.sent().await.len(), sends_before);
}

#[tokio::test]
async fn archiving_waits_for_the_server_ack() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let transport = factory.transport().await;

    factory
        .inject(recovered_frame("t-1", vec![], false, None))
        .await;
    let mut rx = session.subscribe();
    // A recover snapshot with no waiter still lands in the store.
    tokio::time::timeout(SEND_TIMEOUT, async {
        loop {
            if session.thread(&ThreadId("t-1".into())).await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let task = {
        let session = session.clone();
        tokio::spawn(async move { session.archive_thread(&ThreadId("t-1".into())).await })
    };
    let frames = transport.wait_for_sent(2, SEND_TIMEOUT).await;
    assert_eq!(frame_json(&frames[1])["payload"]["eventType"], "archiveThread");

    // Still open until the ack lands.
    assert_eq!(
        session.thread(&ThreadId("t-1".into())).await.unwrap().state,
        ThreadState::Ready
    );

    factory
        .inject(json!({"eventType": "ThreadArchived", "data": {}}).to_string())
        .await;
    task.await.unwrap().unwrap();
    assert_eq!(
        session.thread(&ThreadId("t-1".into())).await.unwrap().state,
        ThreadState::Closed
    );
    wait_for_event(&mut rx, |e| matches!(e, SessionEvent::ThreadsUpdated)).await;
}

#[tokio::test]
async fn archiving_is_unsupported_on_single_thread_channels() {
    let (session, _factory, _server) = connect_session(channel_config(false, false)).await;
    let id = session.create_thread(vec![]).await.unwrap();

    let err = session.archive_thread(&id).await.unwrap_err();
    assert!(matches!(err, ParlorError::UnsupportedChannelConfig(_)));
}

#[tokio::test]
async fn single_thread_channel_rejects_a_second_open_thread() {
    let (session, _factory, _server) = connect_session(channel_config(false, false)).await;
    session.create_thread(vec![]).await.unwrap();

    let err = session.create_thread(vec![]).await.unwrap_err();
    assert!(matches!(err, ParlorError::UnsupportedChannelConfig(_)));
}

#[tokio::test]
async fn create_thread_enforces_required_pre_chat_fields() {
    let mut config = channel_config(true, false);
    config["preChatSurvey"] = json!({
        "name": "Before we start",
        "fields": [{"ident": "email", "isRequired": true}]
    });
    let (session, _factory, _server) = connect_session(config).await;

    match session.create_thread(vec![]).await {
        Err(ParlorError::MissingPreChatCustomFields { idents }) => {
            assert_eq!(idents, vec!["email"]);
        }
        other => panic!("expected missing pre-chat fields, got {other:?}"),
    }

    session
        .create_thread(vec![CustomField::new("email", "a@b.c")])
        .await
        .unwrap();
}

#[tokio::test]
async fn load_more_preconditions() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;

    // Local pending thread: the server never reported more pages.
    let id = session.create_thread(vec![]).await.unwrap();
    assert!(matches!(
        session.load_more_messages(&id).await,
        Err(ParlorError::NoMoreMessages)
    ));

    // A recovered thread with more pages but no local messages has no
    // oldest date to paginate from.
    factory
        .inject(recovered_frame("t-empty", vec![], true, Some("cursor")))
        .await;
    tokio::time::timeout(SEND_TIMEOUT, async {
        loop {
            if session.thread(&ThreadId("t-empty".into())).await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(matches!(
        session.load_more_messages(&ThreadId("t-empty".into())).await,
        Err(ParlorError::InvalidOldestDate)
    ));
}

#[tokio::test]
async fn load_more_merges_older_messages_in_front() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let transport = factory.transport().await;
    let tid = ThreadId("t-1".into());

    factory
        .inject(recovered_frame(
            "t-1",
            vec![msg_json("m-3", "t-1", "newest", "2026-01-05T12:00:00Z")],
            true,
            Some("cursor-1"),
        ))
        .await;
    tokio::time::timeout(SEND_TIMEOUT, async {
        loop {
            if session.thread(&tid).await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let task = {
        let session = session.clone();
        let tid = tid.clone();
        tokio::spawn(async move { session.load_more_messages(&tid).await })
    };
    let frames = transport.wait_for_sent(2, SEND_TIMEOUT).await;
    let sent = frame_json(&frames[1]);
    assert_eq!(sent["payload"]["eventType"], "loadMoreMessages");
    assert_eq!(sent["payload"]["data"]["scrollToken"], "cursor-1");
    assert_eq!(
        sent["payload"]["data"]["oldestMessageDatetime"],
        "2026-01-05T12:00:00Z"
    );

    factory
        .inject(
            json!({
                "eventType": "MoreMessagesLoaded",
                "data": {
                    "messages": [
                        msg_json("m-1", "t-1", "oldest", "2026-01-05T10:00:00Z"),
                        msg_json("m-2", "t-1", "older", "2026-01-05T11:00:00Z")
                    ]
                }
            })
            .to_string(),
        )
        .await;

    assert_eq!(task.await.unwrap().unwrap(), 2);
    let thread = session.thread(&tid).await.unwrap();
    let ids: Vec<&str> = thread.messages.iter().map(|m| m.id.0.as_str()).collect();
    assert_eq!(ids, vec!["m-1", "m-2", "m-3"]);
    // No scroll token came back, so pagination is exhausted.
    assert!(!thread.has_more_messages);
    assert!(matches!(
        session.load_more_messages(&tid).await,
        Err(ParlorError::NoMoreMessages)
    ));
}

#[tokio::test]
async fn recovery_merge_is_idempotent_and_keeps_local_messages() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let tid = session.create_thread(vec![]).await.unwrap();

    // A local message the server snapshot will not contain.
    session
        .send_message(&tid, OutboundMessage::text("local draft"))
        .await
        .unwrap();

    let snapshot = recovered_frame(
        &tid.0,
        vec![
            msg_json("m-1", &tid.0, "a", "2026-01-05T10:00:00Z"),
            msg_json("m-2", &tid.0, "b", "2026-01-05T11:00:00Z"),
        ],
        false,
        None,
    );
    factory.inject(snapshot.clone()).await;
    factory.inject(snapshot).await;

    tokio::time::timeout(SEND_TIMEOUT, async {
        loop {
            let thread = session.thread(&tid).await.unwrap();
            if thread.messages.len() >= 3 {
                return thread;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map(|thread| {
        assert_eq!(thread.messages.len(), 3, "duplicate snapshot must not duplicate");
        assert!(thread
            .messages
            .iter()
            .any(|m| m.message_content.fallback_text() == "local draft"));
        assert_eq!(thread.state, ThreadState::Ready);
    })
    .unwrap();
}

#[tokio::test]
async fn custom_field_merge_is_filtered_and_recency_based() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let tid = "t-1";

    let with_fields = |fields: Value| {
        json!({
            "eventType": "ThreadRecovered",
            "data": {
                "thread": {"idOnExternalPlatform": tid},
                "contactCustomFields": fields
            }
        })
        .to_string()
    };

    factory
        .inject(with_fields(json!([
            {"ident": "email", "value": "new@x", "updatedAt": "2026-01-05T12:00:00Z"},
            {"ident": "undefined", "value": "dropped", "updatedAt": "2026-01-05T12:00:00Z"}
        ])))
        .await;
    factory
        .inject(with_fields(json!([
            {"ident": "email", "value": "stale@x", "updatedAt": "2026-01-01T00:00:00Z"}
        ])))
        .await;

    tokio::time::timeout(SEND_TIMEOUT, async {
        loop {
            if let Some(thread) = session.thread(&ThreadId(tid.into())).await {
                if thread.fields.value("email").is_some() {
                    return thread;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map(|thread| {
        assert_eq!(thread.fields.value("email"), Some("new@x"));
        assert!(thread.fields.value("undefined").is_none());
    })
    .unwrap();
}

#[tokio::test]
async fn send_message_echoes_locally_and_deduplicates_server_echo() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let transport = factory.transport().await;
    let tid = session.create_thread(vec![]).await.unwrap();

    let message_id = session
        .send_message(&tid, OutboundMessage::text("hello"))
        .await
        .unwrap();

    let frames = transport.wait_for_sent(2, SEND_TIMEOUT).await;
    let sent = frame_json(&frames[1]);
    assert_eq!(sent["payload"]["eventType"], "sendMessage");
    assert_eq!(
        sent["payload"]["data"]["idOnExternalPlatform"],
        message_id.0
    );

    let thread = session.thread(&tid).await.unwrap();
    assert_eq!(thread.messages.len(), 1);
    assert_eq!(thread.messages[0].direction, MessageDirection::ToAgent);

    // Server echo with the same id promotes the thread without duplicating.
    factory
        .inject(
            json!({
                "eventType": "MessageCreated",
                "data": {
                    "thread": {"idOnExternalPlatform": tid.0},
                    "contact": {"id": "contact-7"},
                    "message": {
                        "idOnExternalPlatform": message_id.0,
                        "threadIdOnExternalPlatform": tid.0,
                        "messageContent": {"type": "TEXT", "payload": {"text": "hello"}},
                        "direction": "inbound",
                        "createdAt": "2026-01-05T10:00:00Z"
                    }
                }
            })
            .to_string(),
        )
        .await;

    tokio::time::timeout(SEND_TIMEOUT, async {
        loop {
            let thread = session.thread(&tid).await.unwrap();
            if thread.state == ThreadState::Ready {
                return thread;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map(|thread| {
        assert_eq!(thread.messages.len(), 1);
        assert_eq!(thread.contact_id.as_deref(), Some("contact-7"));
    })
    .unwrap();
}

#[tokio::test]
async fn sending_into_a_closed_thread_is_illegal() {
    let (session, _factory, _server) = connect_session(channel_config(true, false)).await;
    let tid = session.create_thread(vec![]).await.unwrap();
    session.archive_thread(&tid).await.unwrap();

    let err = session
        .send_message(&tid, OutboundMessage::text("too late"))
        .await
        .unwrap_err();
    assert!(matches!(err, ParlorError::IllegalThreadState { .. }));
}

#[tokio::test]
async fn welcome_template_known_before_thread_creation() {
    let (session, factory, _server) = connect_session(channel_config(true, true)).await;
    let mut rx = session.subscribe();

    factory
        .inject(
            json!({
                "postback": {
                    "eventType": "FireProactiveAction",
                    "data": {
                        "actionId": "a-1",
                        "actionType": "welcomeMessage",
                        "data": {"content": {"bodyText": "Hello {{customer.firstName|there}}!"}}
                    }
                }
            })
            .to_string(),
        )
        .await;
    // An ordered follow-up frame proves the template was processed.
    factory
        .inject(
            json!({
                "eventType": "SenderTypingStarted",
                "data": {"thread": {"idOnExternalPlatform": "sync"}}
            })
            .to_string(),
        )
        .await;
    wait_for_event(&mut rx, |e| matches!(e, SessionEvent::AgentTyping { .. })).await;

    let tid = session.create_thread(vec![]).await.unwrap();
    let thread = session.thread(&tid).await.unwrap();
    assert_eq!(thread.messages.len(), 1);
    assert_eq!(thread.messages[0].message_content.fallback_text(), "Hello Ada!");
    assert_eq!(thread.messages[0].direction, MessageDirection::ToClient);

    // The resolved welcome goes out as the thread's first message.
    let frames = factory
        .transport()
        .await
        .wait_for_sent(2, SEND_TIMEOUT)
        .await;
    let welcome = frame_json(&frames[1]);
    assert_eq!(welcome["payload"]["eventType"], "sendMessage");
    assert_eq!(
        welcome["payload"]["data"]["thread"]["idOnExternalPlatform"],
        tid.0.as_str()
    );
    assert_eq!(
        welcome["payload"]["data"]["messageContent"]["payload"]["text"],
        "Hello Ada!"
    );
}

#[tokio::test]
async fn welcome_template_arriving_late_lands_in_the_waiting_thread() {
    let (session, factory, _server) = connect_session(channel_config(true, true)).await;
    let tid = session.create_thread(vec![]).await.unwrap();
    assert!(session.thread(&tid).await.unwrap().messages.is_empty());

    let mut rx = session.subscribe();
    factory
        .inject(
            json!({
                "postback": {
                    "eventType": "FireProactiveAction",
                    "data": {
                        "actionId": "a-1",
                        "actionType": "welcomeMessage",
                        "data": {"content": {"bodyText": "Welcome, {{customer.firstName|friend}}."}}
                    }
                }
            })
            .to_string(),
        )
        .await;

    let event = wait_for_event(&mut rx, |e| matches!(e, SessionEvent::MessageCreated { .. })).await;
    match event {
        SessionEvent::MessageCreated { thread_id, message } => {
            assert_eq!(thread_id, tid);
            assert_eq!(message.message_content.fallback_text(), "Welcome, Ada.");
        }
        _ => unreachable!(),
    }
    assert!(!session.thread(&tid).await.unwrap().awaiting_welcome);

    let frames = factory
        .transport()
        .await
        .wait_for_sent(2, SEND_TIMEOUT)
        .await;
    let welcome = frame_json(&frames[1]);
    assert_eq!(welcome["payload"]["eventType"], "sendMessage");
    assert_eq!(
        welcome["payload"]["data"]["messageContent"]["payload"]["text"],
        "Welcome, Ada."
    );
}

#[tokio::test]
async fn custom_popup_actions_are_surfaced_to_the_host() {
    let (session, factory, _server) = connect_session(channel_config(true, true)).await;
    let mut rx = session.subscribe();

    factory
        .inject(
            json!({
                "postback": {
                    "eventType": "FireProactiveAction",
                    "data": {
                        "actionId": "a-2",
                        "actionType": "customPopupBox",
                        "data": {"content": {"bodyText": "20% off", "headlineText": "Sale"}}
                    }
                }
            })
            .to_string(),
        )
        .await;

    let event = wait_for_event(&mut rx, |e| matches!(e, SessionEvent::ProactiveAction { .. })).await;
    match event {
        SessionEvent::ProactiveAction {
            action_id,
            headline,
            body,
        } => {
            assert_eq!(action_id, "a-2");
            assert_eq!(headline.as_deref(), Some("Sale"));
            assert_eq!(body.as_deref(), Some("20% off"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn server_error_with_transaction_id_fails_the_pending_operation() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let transport = factory.transport().await;

    factory
        .inject(recovered_frame("t-1", vec![], false, None))
        .await;
    tokio::time::timeout(SEND_TIMEOUT, async {
        loop {
            if session.thread(&ThreadId("t-1".into())).await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let task = {
        let session = session.clone();
        tokio::spawn(async move { session.archive_thread(&ThreadId("t-1".into())).await })
    };
    let frames = transport.wait_for_sent(2, SEND_TIMEOUT).await;
    let event_id = frame_json(&frames[1])["eventId"].as_str().unwrap().to_string();

    factory
        .inject(
            json!({
                "error": {
                    "errorCode": "ArchivingThreadFailed",
                    "transactionId": event_id
                }
            })
            .to_string(),
        )
        .await;

    match task.await.unwrap() {
        Err(ParlorError::Server { code, .. }) => assert_eq!(code, "ArchivingThreadFailed"),
        other => panic!("expected server error, got {other:?}"),
    }
    // The thread stays open; only the ack closes it.
    assert_eq!(
        session.thread(&ThreadId("t-1".into())).await.unwrap().state,
        ThreadState::Ready
    );
}

#[tokio::test]
async fn unexpected_disconnect_moves_the_session_offline() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let mut rx = session.subscribe();

    let old_transport = factory.transport().await;
    factory.simulate_disconnect().await;
    wait_for_event(&mut rx, |e| matches!(e, SessionEvent::UnexpectedDisconnect)).await;
    assert_eq!(session.state().await, ChatState::Offline);

    // Reconnect reuses the cached token.
    let task = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    let transport = tokio::time::timeout(SEND_TIMEOUT, async {
        loop {
            if let Some(transport) = factory.try_transport().await {
                if !Arc::ptr_eq(&transport, &old_transport) {
                    return transport;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    transport.wait_for_sent(1, SEND_TIMEOUT).await;
    let frames = transport.sent().await;
    assert_eq!(
        frame_json(&frames[0])["payload"]["eventType"],
        "reconnectCustomer"
    );
    factory.inject(authorized_frame("Ada")).await;
    task.await.unwrap().unwrap();
    assert_eq!(session.state().await, ChatState::Connected);
}

#[tokio::test]
async fn authorization_channel_requires_a_token_to_reconnect() {
    let mut config = channel_config(true, false);
    config["isAuthorizationEnabled"] = json!(true);
    let server = start_server(config).await;
    let environment = Environment::custom(server.uri(), "wss://unused", server.uri());
    let factory = Arc::new(MockSocketFactory::new());
    let mut session_config = SessionConfig::new(environment, 1386, "chan-1");
    session_config.authorization_code = Some("oauth-code".into());
    let session = ChatSession::with_socket_factory(session_config, factory.clone()).unwrap();

    session.prepare().await.unwrap();
    let mut rx = session.subscribe();
    let task = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };

    // A fresh identity runs the authorization flow with the stored code.
    let transport = live_transport(&factory).await;
    let frames = transport.wait_for_sent(1, SEND_TIMEOUT).await;
    let first = frame_json(&frames[0]);
    assert_eq!(first["payload"]["eventType"], "authorizeCustomer");
    assert_eq!(first["payload"]["data"]["authorizationCode"], "oauth-code");

    // The server confirms the identity but grants no token.
    factory
        .inject(
            json!({
                "eventType": "ConsumerAuthorized",
                "data": {
                    "consumerIdentity": {"idOnExternalPlatform": "cust-1", "firstName": "Ada"}
                }
            })
            .to_string(),
        )
        .await;
    task.await.unwrap().unwrap();
    assert_eq!(session.state().await, ChatState::Connected);

    factory.simulate_disconnect().await;
    wait_for_event(&mut rx, |e| matches!(e, SessionEvent::UnexpectedDisconnect)).await;

    // With an identity but no token, reconnecting must not fall back to the
    // authorization code again.
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, ParlorError::MissingAccessToken));
    assert_eq!(session.state().await, ChatState::Offline);
}

#[tokio::test]
async fn disconnect_closes_the_session_and_socket() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let transport = factory.transport().await;

    session.disconnect().await.unwrap();
    assert_eq!(session.state().await, ChatState::Closed);
    assert!(transport.is_closed());

    // Further sends require a live session.
    assert!(matches!(
        session.create_thread(vec![]).await,
        Err(ParlorError::NotConnected)
    ));
}

#[tokio::test]
async fn sign_out_erases_identity_and_threads() {
    let (session, _factory, _server) = connect_session(channel_config(true, false)).await;
    session.create_thread(vec![]).await.unwrap();

    session.sign_out().await.unwrap();
    assert_eq!(session.state().await, ChatState::Initial);
    assert!(session.threads().await.is_empty());
}

#[tokio::test]
async fn typing_and_read_receipts_use_the_thread_channel() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let transport = factory.transport().await;
    let tid = session.create_thread(vec![]).await.unwrap();

    session.report_typing(&tid, true).await.unwrap();
    session.report_typing(&tid, false).await.unwrap();
    // Read receipts for a thread the server does not know yet are a no-op.
    session.mark_thread_read(&tid).await.unwrap();

    let frames = transport.wait_for_sent(3, SEND_TIMEOUT).await;
    assert_eq!(frames.len(), 3);
    assert_eq!(
        frame_json(&frames[1])["payload"]["eventType"],
        "senderTypingStarted"
    );
    assert_eq!(
        frame_json(&frames[2])["payload"]["eventType"],
        "senderTypingEnded"
    );
}

#[tokio::test]
async fn execute_trigger_carries_trigger_and_destination() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let transport = factory.transport().await;

    session.execute_trigger("trig-1").await.unwrap();

    let frames = transport.wait_for_sent(2, SEND_TIMEOUT).await;
    let sent = frame_json(&frames[1]);
    assert_eq!(sent["payload"]["eventType"], "executeTrigger");
    assert_eq!(sent["payload"]["data"]["trigger"]["id"], "trig-1");
    assert!(sent["payload"]["data"]["destination"]["id"].is_string());
}

#[tokio::test]
async fn refresh_token_round_trip_updates_the_cached_token() {
    let (session, factory, _server) = connect_session(channel_config(true, false)).await;
    let transport = factory.transport().await;
    let mut rx = session.subscribe();

    session.refresh_token().await.unwrap();
    let frames = transport.wait_for_sent(2, SEND_TIMEOUT).await;
    let sent = frame_json(&frames[1]);
    assert_eq!(sent["action"], "register");
    assert_eq!(sent["payload"]["eventType"], "refreshToken");
    assert_eq!(sent["payload"]["data"]["accessToken"]["token"], "tok-1");

    factory
        .inject(
            json!({
                "eventType": "TokenRefreshed",
                "data": {"accessToken": {"token": "tok-2", "expiresIn": 7200}}
            })
            .to_string(),
        )
        .await;
    wait_for_event(&mut rx, |e| matches!(e, SessionEvent::ChatUpdated)).await;
}
