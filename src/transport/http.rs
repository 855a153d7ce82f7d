/// Streamable HTTP transport: session-oriented JSON-RPC over POST with
/// SSE fan-out.
///
/// `initialize` is the only method allowed without a session; its response
/// carries a fresh `Mcp-Session-Id` header. Every later POST must echo
/// that id. Responses are delivered over the session's SSE stream when one
/// is attached, otherwise they are buffered (bounded, drop-oldest).
/// Sessions die on explicit DELETE or after an idle TTL.
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::{BridgeError, BridgeResult};
use crate::mcp::{JsonRpcRequest, McpDispatcher};

/// Session header, set by the server on initialize and echoed by clients.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Responses buffered per session while no SSE stream is attached.
/// Oldest are dropped on overflow.
const MAX_BUFFERED_RESPONSES: usize = 256;

/// Outbound SSE channel capacity. Must exceed the buffer bound so a fresh
/// stream can swallow the whole backlog without dropping.
const SSE_CHANNEL_CAPACITY: usize = MAX_BUFFERED_RESPONSES + 16;

/// How often idle sessions are collected.
const GC_INTERVAL_SECS: u64 = 60;

/// Idle cutoff before a session is garbage-collected: 15 minutes.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 15 * 60;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Request path the MCP endpoints hang off, usually `/mcp`.
    pub path: String,
    /// Extra origin hosts accepted besides the bind host and localhost.
    pub allowed_origins: Vec<String>,
    pub session_ttl: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            path: "/mcp".to_string(),
            allowed_origins: Vec::new(),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }
}

/// Outbound side of one session: the live SSE sender, or a bounded
/// backlog while no stream is attached.
struct SessionSink {
    stream: Option<mpsc::Sender<Event>>,
    buffer: VecDeque<String>,
}

struct Session {
    id: String,
    #[allow(dead_code)] // surfaced in logs; part of the session record
    created_at: DateTime<Utc>,
    last_activity: Mutex<Instant>,
    sink: Mutex<SessionSink>,
}

impl Session {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            // v4 = 122 bits of CSPRNG output; unguessable by construction
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            last_activity: Mutex::new(Instant::now()),
            sink: Mutex::new(SessionSink {
                stream: None,
                buffer: VecDeque::new(),
            }),
        })
    }

    fn touch(&self) {
        let mut last = self
            .last_activity
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *last = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .elapsed()
    }

    /// Deliver one serialised response: straight to the SSE stream when
    /// attached and alive, otherwise into the bounded backlog.
    fn deliver(&self, payload: String) {
        let mut sink = self
            .sink
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(tx) = &sink.stream {
            match tx.try_send(Event::default().event("message").data(payload.clone())) {
                Ok(()) => return,
                // Backpressure: keep the stream, spill to the buffer
                Err(mpsc::error::TrySendError::Full(_)) => {}
                // Client disconnected; detach and fall back to buffering
                Err(mpsc::error::TrySendError::Closed(_)) => sink.stream = None,
            }
        }
        if sink.buffer.len() >= MAX_BUFFERED_RESPONSES {
            sink.buffer.pop_front();
        }
        sink.buffer.push_back(payload);
    }
}

#[derive(Clone)]
pub struct HttpState {
    dispatcher: Arc<McpDispatcher>,
    sessions: Arc<Mutex<HashMap<String, Arc<Session>>>>,
    config: Arc<HttpConfig>,
}

impl HttpState {
    pub fn new(config: HttpConfig, dispatcher: Arc<McpDispatcher>) -> Self {
        Self {
            dispatcher,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    fn session(&self, headers: &HeaderMap) -> Option<Arc<Session>> {
        let id = headers.get(SESSION_HEADER)?.to_str().ok()?;
        let sessions = self
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        sessions.get(id).cloned()
    }
}

/// Build the transport router: `POST/GET/DELETE {path}` plus `/health`.
pub fn build_router(state: HttpState) -> Router {
    let path = state.config.path.clone();
    Router::new()
        .route(
            &path,
            axum::routing::post(mcp_post).get(mcp_get).delete(mcp_delete),
        )
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "server": crate::SERVER_NAME,
        "version": crate::VERSION,
    }))
}

/// Origin gate, DNS-rebinding defence. A browser-supplied `Origin` must
/// name a host we expect; requests without one (curl, SDK clients) pass.
fn check_origin(state: &HttpState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) else {
        return Ok(());
    };
    let host = url::Url::parse(origin)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .unwrap_or_default();

    let allowed = host == state.config.host
        || host == "localhost"
        || host == "127.0.0.1"
        || state.config.allowed_origins.iter().any(|o| *o == host);
    if allowed {
        Ok(())
    } else {
        warn!("rejected origin '{}'", origin);
        Err((
            StatusCode::FORBIDDEN,
            Json(json!({"error": "origin not allowed"})),
        )
            .into_response())
    }
}

async fn mcp_post(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = check_origin(&state, &headers) {
        return resp;
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type
        .to_ascii_lowercase()
        .starts_with("application/json")
    {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Json(json!({"error": "Content-Type must be application/json"})),
        )
            .into_response();
    }

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": {"code": -32700, "message": format!("Parse error: {}", e)},
                })),
            )
                .into_response();
        }
    };

    // initialize is the one method that may arrive session-less: it mints
    // the session and hands the id back as a response header
    if request.method == "initialize" {
        let session = Session::new();
        let session_id = session.id.clone();
        {
            let mut sessions = state
                .sessions
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            sessions.insert(session_id.clone(), session);
        }
        info!("session {} initialised", session_id);

        let reply = state.dispatcher.handle(request).await;
        let mut response = match reply {
            Some(reply) => Json(reply).into_response(),
            None => Json(json!({"status": "accepted"})).into_response(),
        };
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
        return response;
    }

    let Some(session) = state.session(&headers) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing or unknown Mcp-Session-Id"})),
        )
            .into_response();
    };
    session.touch();

    if let Some(reply) = state.dispatcher.handle(request).await {
        match serde_json::to_string(&reply) {
            Ok(payload) => session.deliver(payload),
            Err(e) => error!("serialise response: {}", e),
        }
    }
    (StatusCode::OK, Json(json!({"status": "accepted"}))).into_response()
}

async fn mcp_get(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_origin(&state, &headers) {
        return resp;
    }

    let accepts_sse = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|a| a.contains("text/event-stream") || a.contains("*/*"));
    if !accepts_sse {
        return (
            StatusCode::NOT_ACCEPTABLE,
            Json(json!({"error": "Accept must include text/event-stream"})),
        )
            .into_response();
    }

    let Some(session) = state.session(&headers) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing or unknown Mcp-Session-Id"})),
        )
            .into_response();
    };
    session.touch();

    let (tx, rx) = mpsc::channel::<Event>(SSE_CHANNEL_CAPACITY);
    {
        let mut sink = session
            .sink
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if sink.stream.is_some() {
            return (
                StatusCode::CONFLICT,
                Json(json!({"error": "session already has an active stream"})),
            )
                .into_response();
        }
        // Flush the backlog into the fresh stream, oldest first
        while let Some(payload) = sink.buffer.pop_front() {
            let _ = tx.try_send(Event::default().event("message").data(payload));
        }
        sink.stream = Some(tx);
    }
    debug!("session {}: SSE stream attached", session.id);

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
    });
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

async fn mcp_delete(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_origin(&state, &headers) {
        return resp;
    }

    let removed = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|id| {
            let mut sessions = state
                .sessions
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            sessions.remove(id)
        });

    match removed {
        Some(session) => {
            close_session(&session);
            info!("session {} terminated by client", session.id);
            (StatusCode::OK, Json(json!({"status": "terminated"}))).into_response()
        }
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing or unknown Mcp-Session-Id"})),
        )
            .into_response(),
    }
}

/// Send the final `close` event and drop the sender so the stream ends.
fn close_session(session: &Session) {
    let mut sink = session
        .sink
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(tx) = sink.stream.take() {
        let _ = tx.try_send(Event::default().event("close").data(""));
    }
    sink.buffer.clear();
}

fn collect_idle_sessions(state: &HttpState) {
    let ttl = state.config.session_ttl;
    let expired: Vec<Arc<Session>> = {
        let mut sessions = state
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let dead: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.idle_for() >= ttl)
            .map(|(id, _)| id.clone())
            .collect();
        dead.iter().filter_map(|id| sessions.remove(id)).collect()
    };
    for session in &expired {
        close_session(session);
        debug!("session {} expired after idle TTL", session.id);
    }
}

/// A running HTTP transport. Dropping the handle does not stop the
/// server; call [`HttpTransport::close`].
pub struct HttpTransport {
    state: HttpState,
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
    pub local_addr: std::net::SocketAddr,
}

impl HttpTransport {
    /// Bind the listener and start serving. The tool registry must be
    /// fully built before this is called — nothing here loads lazily.
    pub async fn start(
        config: HttpConfig,
        dispatcher: Arc<McpDispatcher>,
    ) -> BridgeResult<Self> {
        let state = HttpState::new(config, dispatcher);
        let app = build_router(state.clone());

        let addr = format!("{}:{}", state.config.host, state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| BridgeError::Transport(format!("bind {}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        info!(
            "MCP HTTP transport listening on {} (path {})",
            local_addr, state.config.path
        );

        let (shutdown, mut server_rx) = watch::channel(false);

        let gc_state = state.clone();
        let mut gc_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(GC_INTERVAL_SECS));
            loop {
                tokio::select! {
                    _ = ticker.tick() => collect_idle_sessions(&gc_state),
                    _ = gc_rx.changed() => break,
                }
            }
        });

        let handle = tokio::spawn(async move {
            let wait = async move {
                let _ = server_rx.changed().await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(wait).await {
                error!("HTTP transport error: {}", e);
            }
        });

        Ok(Self {
            state,
            shutdown,
            handle,
            local_addr,
        })
    }

    /// Graceful shutdown: notify every attached stream, then stop the
    /// listener and wait for it to wind down.
    pub async fn close(self) {
        let sessions: Vec<Arc<Session>> = {
            let mut map = self
                .state
                .sessions
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            map.drain().map(|(_, s)| s).collect()
        };
        for session in &sessions {
            close_session(session);
        }
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
        info!("HTTP transport stopped");
    }
}
