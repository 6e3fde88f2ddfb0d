//! MCP over HTTP with Server-Sent Events.
//!
//! A client opens `GET /sse` and receives an `endpoint` event naming the URL
//! it must `POST` its JSON-RPC messages to. Every server message is then
//! pushed down the same stream as a `message` event. Each stream owns one
//! MCP session; closing the stream ends the session.

extern crate alloc;

use alloc::sync::Arc;
use core::net::SocketAddr;
use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures::channel::mpsc::{self, Sender};
use futures::{SinkExt, Stream, StreamExt, stream};
use rmcp::ServiceExt;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::{BearerAuth, require_bearer};
use crate::server::FinanceMcpServer;

/// Path of the event stream.
pub(crate) const SSE_PATH: &str = "/sse";
/// Path clients post messages to.
pub(crate) const MESSAGE_PATH: &str = "/messages/";
/// Buffered messages per direction and session.
const CHANNEL_CAPACITY: usize = 64;
/// Interval of SSE keep-alive comments.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Open sessions keyed by id, holding the inbound half of each transport.
type SessionMap = Arc<Mutex<HashMap<Uuid, Sender<ClientJsonRpcMessage>>>>;

/// Shared state of the HTTP routes.
#[derive(Clone)]
struct SseState {
    /// Handler cloned into every session.
    server: FinanceMcpServer,
    /// Open sessions.
    sessions: SessionMap,
    /// Cancelled on shutdown; every session runs under a child token.
    shutdown: CancellationToken,
}

/// Locks the session map, recovering from a poisoned lock.
fn lock(sessions: &SessionMap) -> MutexGuard<'_, HashMap<Uuid, Sender<ClientJsonRpcMessage>>> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unregisters a session and stops its service when the event stream drops.
struct SessionGuard {
    /// Session id.
    id: Uuid,
    /// Map the session is registered in.
    sessions: SessionMap,
    /// Token of the session's service.
    ct: CancellationToken,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let removed = lock(&self.sessions).remove(&self.id).is_some();
        self.ct.cancel();
        if removed {
            tracing::info!(session_id = %self.id.simple(), "SSE session closed");
        }
    }
}

/// Serialises one server message as a `message` event.
fn message_event(message: &ServerJsonRpcMessage) -> Result<Event, axum::Error> {
    Event::default().event("message").json_data(message)
}

/// `GET /sse`: opens a session and streams its server messages.
async fn open_stream(
    State(state): State<SseState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let id = Uuid::new_v4();
    let (client_tx, client_rx) = mpsc::channel::<ClientJsonRpcMessage>(CHANNEL_CAPACITY);
    let (server_tx, server_rx) = mpsc::channel::<ServerJsonRpcMessage>(CHANNEL_CAPACITY);
    let ct = state.shutdown.child_token();

    let _previous = lock(&state.sessions).insert(id, client_tx);
    tracing::info!(session_id = %id.simple(), "SSE session opened");

    let server = state.server.clone();
    let session_ct = ct.clone();
    let _task = tokio::spawn(async move {
        match server.serve_with_ct((server_tx, client_rx), session_ct).await {
            Ok(running) => {
                if let Err(err) = running.waiting().await {
                    tracing::warn!(session_id = %id.simple(), %err, "MCP session task failed");
                }
            }
            Err(err) => {
                tracing::warn!(session_id = %id.simple(), %err, "MCP session did not initialize");
            }
        }
    });

    let guard = SessionGuard {
        id,
        sessions: Arc::clone(&state.sessions),
        ct,
    };
    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{MESSAGE_PATH}?session_id={}", id.simple()));
    let messages = server_rx.map(move |message| {
        let _session = &guard;
        message_event(&message)
    });

    Sse::new(stream::once(async move { Ok(endpoint) }).chain(messages))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

/// Query string of a posted message.
#[derive(Debug, Deserialize)]
struct MessageQuery {
    /// Session the message belongs to.
    session_id: Option<String>,
}

/// `POST /messages/?session_id=...`: hands a client message to its session.
async fn post_message(
    State(state): State<SseState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let Some(raw_id) = query.session_id else {
        return (StatusCode::BAD_REQUEST, "session_id is required").into_response();
    };
    let Ok(id) = Uuid::parse_str(&raw_id) else {
        return (StatusCode::BAD_REQUEST, "Invalid session ID").into_response();
    };
    let Some(mut sender) = lock(&state.sessions).get(&id).cloned() else {
        return (StatusCode::NOT_FOUND, "Could not find session").into_response();
    };
    let message: ClientJsonRpcMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(err) => {
            tracing::debug!(session_id = %id.simple(), %err, "unparseable client message");
            return (StatusCode::BAD_REQUEST, "Could not parse message").into_response();
        }
    };
    if sender.send(message).await.is_err() {
        return (StatusCode::NOT_FOUND, "Could not find session").into_response();
    }
    (StatusCode::ACCEPTED, "Accepted").into_response()
}

/// Builds the HTTP routes, all behind the bearer gate.
pub(crate) fn router(
    server: FinanceMcpServer,
    auth: BearerAuth,
    shutdown: CancellationToken,
) -> Router {
    let state = SseState {
        server,
        sessions: SessionMap::default(),
        shutdown,
    };
    Router::new()
        .route(SSE_PATH, get(open_stream))
        .route(MESSAGE_PATH, post(post_message))
        .route("/messages", post(post_message))
        .with_state(state)
        .layer(middleware::from_fn_with_state(auth, require_bearer))
}

/// Serves MCP over SSE on `addr` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub(crate) async fn serve(
    addr: SocketAddr,
    server: FinanceMcpServer,
    auth: BearerAuth,
) -> std::io::Result<()> {
    let shutdown = CancellationToken::new();
    let auth_enabled = auth.is_enabled();
    let app = router(server, auth, shutdown.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        auth_enabled,
        "listening for MCP clients on http://{addr}{SSE_PATH}"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(%err, "failed to listen for Ctrl-C");
            }
            tracing::info!("shutting down");
            shutdown.cancel();
        })
        .await
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use core::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::router;
    use crate::auth::BearerAuth;
    use crate::config::{Banks, Secret};
    use crate::retry::RetryPolicy;
    use crate::server::FinanceMcpServer;

    const INITIALIZE: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test-client","version":"0.1.0"}}}"#;

    fn app(auth: BearerAuth) -> Router {
        let server = FinanceMcpServer::new(Banks::default(), RetryPolicy::default());
        router(server, auth, CancellationToken::new())
    }

    async fn post(app: &Router, uri: &str, body: &str) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .expect("request");
        app.clone().oneshot(request).await.expect("response").status()
    }

    async fn next_text(stream: &mut axum::body::BodyDataStream) -> String {
        let chunk = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("event before timeout")
            .expect("stream still open")
            .expect("chunk");
        String::from_utf8(chunk.to_vec()).expect("utf-8 event")
    }

    /// Opens `/sse` and returns the event stream with the announced endpoint.
    async fn open_session(app: &Router) -> (axum::body::BodyDataStream, String) {
        let request = Request::builder()
            .uri("/sse")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let mut events = response.into_body().into_data_stream();
        let first = next_text(&mut events).await;
        assert!(first.contains("event: endpoint"), "{first}");
        let endpoint = first
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .expect("endpoint data")
            .trim()
            .to_owned();
        (events, endpoint)
    }

    /// Reads events until a `message` event arrives.
    async fn next_message(events: &mut axum::body::BodyDataStream) -> String {
        let mut text = next_text(events).await;
        while !text.contains("event: message") {
            text = next_text(events).await;
        }
        text
    }

    #[tokio::test]
    async fn dropping_stream_closes_session() {
        let app = app(BearerAuth::default());
        let (mut events, endpoint) = open_session(&app).await;
        assert_eq!(post(&app, &endpoint, INITIALIZE).await, StatusCode::ACCEPTED);
        let reply = next_message(&mut events).await;
        assert!(reply.contains("\"id\":1"), "{reply}");

        drop(events);
        assert_eq!(post(&app, &endpoint, INITIALIZE).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn shutdown_ends_open_streams() {
        let shutdown = CancellationToken::new();
        let server = FinanceMcpServer::new(Banks::default(), RetryPolicy::default());
        let app = router(server, BearerAuth::default(), shutdown.clone());
        let (mut events, endpoint) = open_session(&app).await;
        assert_eq!(post(&app, &endpoint, INITIALIZE).await, StatusCode::ACCEPTED);
        let _reply = next_message(&mut events).await;

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(chunk) = events.next().await {
                let _bytes = chunk.expect("chunk");
            }
        })
        .await
        .expect("stream ends after shutdown");
    }

    #[tokio::test]
    async fn post_requires_session_id() {
        let app = app(BearerAuth::default());
        assert_eq!(post(&app, "/messages/", INITIALIZE).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_rejects_malformed_session_id() {
        let app = app(BearerAuth::default());
        assert_eq!(
            post(&app, "/messages/?session_id=not-a-uuid", INITIALIZE).await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn post_to_unknown_session_is_not_found() {
        let app = app(BearerAuth::default());
        assert_eq!(
            post(
                &app,
                "/messages/?session_id=0123456789abcdef0123456789abcdef",
                INITIALIZE
            )
            .await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn stream_announces_endpoint_and_relays_replies() {
        let app = app(BearerAuth::default());
        let (mut events, endpoint) = open_session(&app).await;
        assert!(endpoint.starts_with("/messages/?session_id="), "{endpoint}");
        let session_id = endpoint.trim_start_matches("/messages/?session_id=");
        assert_eq!(session_id.len(), 32);

        assert_eq!(post(&app, &endpoint, "not json").await, StatusCode::BAD_REQUEST);
        assert_eq!(post(&app, &endpoint, INITIALIZE).await, StatusCode::ACCEPTED);

        let reply = next_message(&mut events).await;
        assert!(reply.contains("\"id\":1"), "{reply}");
        assert!(reply.contains("serverInfo"), "{reply}");
    }

    #[tokio::test]
    async fn message_path_without_trailing_slash_is_routed() {
        let app = app(BearerAuth::default());
        assert_eq!(post(&app, "/messages", INITIALIZE).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn routes_sit_behind_bearer_gate() {
        let app = app(BearerAuth::new(Some(Secret::new("secret123".to_owned()))));
        let anonymous = Request::builder()
            .uri("/sse")
            .body(Body::empty())
            .expect("request");
        let status = app.clone().oneshot(anonymous).await.expect("response").status();
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let anonymous_post = post(
            &app,
            "/messages/?session_id=0123456789abcdef0123456789abcdef",
            INITIALIZE,
        )
        .await;
        assert_eq!(anonymous_post, StatusCode::UNAUTHORIZED);

        let authorized = Request::builder()
            .uri("/sse")
            .header(AUTHORIZATION, "Bearer secret123")
            .body(Body::empty())
            .expect("request");
        let status = app.oneshot(authorized).await.expect("response").status();
        assert_eq!(status, StatusCode::OK);
    }
}
