use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wonderai_core::{
    CancellationToken, ChatClient, ChatRole, ChatSession, RetryPolicy, SessionState, StreamEvent,
    WonderError,
};

fn sse(lines: &[serde_json::Value]) -> String {
    lines
        .iter()
        .map(|v| format!("data: {v}\n\n"))
        .collect()
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        factor: 2.0,
        jitter: false,
    }
}

async fn mount_stream(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/api/chat/conversations/conv-1/stream"))
        .and(query_param("user_id", "user_abc"))
        .and(header("accept", "text/event-stream"))
        .and(body_json(serde_json::json!({"content": "Hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/plain"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn hello_streams_into_a_finalized_reply() {
    let server = MockServer::start().await;
    mount_stream(
        &server,
        sse(&[
            serde_json::json!({"type": "content", "content": "Hi", "finished": false}),
            serde_json::json!({"type": "content", "content": " there", "finished": false}),
            serde_json::json!({"type": "complete", "finished": true}),
        ]),
    )
    .await;

    let client = ChatClient::new(&server.uri());
    let mut session = ChatSession::new();
    session.begin_send("Hello", 1_000).unwrap();
    assert!(session.store().merged_view()[0].is_optimistic);

    let mut stream = client
        .stream_message("conv-1", "Hello", "user_abc", CancellationToken::new())
        .await
        .unwrap();
    let mut updates = Vec::new();
    while let Some(item) = stream.next().await {
        if let Ok(StreamEvent::Update { full_content, .. }) = &item {
            updates.push(full_content.clone());
        }
        session.handle(item);
    }

    assert_eq!(updates, vec!["Hi", "Hi there"]);
    assert_eq!(session.state(), &SessionState::Completed);
    assert!(session.store().streaming().is_none());

    let view = session.store().merged_view();
    assert_eq!(view.len(), 2);
    assert!(view.iter().all(|m| !m.is_optimistic));
    assert_eq!(view[1].role, ChatRole::Assistant);
    assert_eq!(view[1].text, "Hi there");
}

#[tokio::test]
async fn error_envelope_surfaces_message_without_finalizing() {
    let server = MockServer::start().await;
    mount_stream(
        &server,
        sse(&[
            serde_json::json!({"type": "content", "content": "Par", "finished": false}),
            serde_json::json!({"type": "error", "error": "rate limited", "finished": true}),
        ]),
    )
    .await;

    let client = ChatClient::new(&server.uri());
    let mut session = ChatSession::new();
    session.begin_send("Hello", 1).unwrap();

    let mut stream = client
        .stream_message("conv-1", "Hello", "user_abc", CancellationToken::new())
        .await
        .unwrap();
    let mut partial = None;
    while let Some(item) = stream.next().await {
        if let Err(e) = &item {
            partial = e.partial_content().map(str::to_string);
        }
        session.handle(item);
    }

    assert_eq!(partial.as_deref(), Some("Par"));
    assert_eq!(session.store().error(), Some("rate limited"));
    assert!(session.store().streaming().is_none());
    assert!(session
        .store()
        .merged_view()
        .iter()
        .all(|m| m.role != ChatRole::Assistant));
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    let server = MockServer::start().await;
    let body = format!(
        "data: {{oops\n\n: comment\n\n{}",
        sse(&[
            serde_json::json!({"type": "content", "content": "ok"}),
            serde_json::json!({"type": "mystery"}),
            serde_json::json!({"type": "complete", "finished": true}),
        ])
    );
    mount_stream(&server, body).await;

    let items: Vec<_> = ChatClient::new(&server.uri())
        .stream_message("conv-1", "Hello", "user_abc", CancellationToken::new())
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].as_ref().unwrap().full_content(), "ok");
}

#[tokio::test]
async fn retryable_status_is_retried_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/conversations/conv-1/stream"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_stream(
        &server,
        sse(&[serde_json::json!({"type": "complete", "finished": true})]),
    )
    .await;

    let client = ChatClient::new(&server.uri()).with_retry(fast_retry(3));
    let items: Vec<_> = client
        .stream_message("conv-1", "Hello", "user_abc", CancellationToken::new())
        .await
        .unwrap()
        .collect()
        .await;
    assert!(items[0].as_ref().unwrap().is_finished());
}

#[tokio::test]
async fn retries_stop_at_the_attempt_cap() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri()).with_retry(fast_retry(3));
    let err = client
        .stream_message("conv-1", "Hello", "user_abc", CancellationToken::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, WonderError::RetryLimit { attempts: 3, .. }));
}

#[tokio::test]
async fn retry_after_is_capped_by_the_policy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).insert_header("retry-after", "3600"))
        .expect(3)
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri()).with_retry(fast_retry(3));
    let send = client.stream_message("conv-1", "Hello", "user_abc", CancellationToken::new());
    let err = tokio::time::timeout(Duration::from_secs(5), send)
        .await
        .expect("Retry-After should not stall the send")
        .err()
        .unwrap();
    assert!(matches!(err, WonderError::RetryLimit { attempts: 3, .. }));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({"detail": "Conversation conv-1 not found"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri()).with_retry(fast_retry(5));
    let err = client
        .stream_message("conv-1", "Hello", "user_abc", CancellationToken::new())
        .await
        .err()
        .unwrap();
    match err {
        WonderError::Status { status, body } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(body, "Conversation conv-1 not found");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn cancelling_before_the_response_aborts_the_send() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = ChatClient::new(&server.uri())
        .stream_message("conv-1", "Hello", "user_abc", cancel)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, WonderError::Cancelled));
}

#[tokio::test]
async fn reconnect_waits_for_health_to_return() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "healthy", "timestamp": "2024-10-01T17:00:00Z"})),
        )
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri());
    let health = client.reconnect(&fast_retry(4)).await.unwrap();
    assert!(health.is_healthy());
}

#[tokio::test]
async fn single_health_probe_does_not_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = ChatClient::new(&server.uri()).health().await.err().unwrap();
    assert!(err.is_retryable());
}
