//! Streamable HTTP transport.
//!
//! - `POST /mcp`: client sends JSON-RPC requests, server answers with JSON
//! - `GET /mcp`: client opens an SSE stream for server-initiated messages
//! - `DELETE /mcp`: client terminates its session
//!
//! Every non-preflight request carries `Authorization: Bearer <token>`. A
//! session is created by the first `initialize` request and keyed by the
//! `Mcp-Session-Id` header afterwards. The optional `Execution-Id` header
//! scopes the whole call to one workspace root.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::unfold;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{broadcast, RwLock};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use super::server::McpServer;
use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::config::HttpConfig;
use crate::context::{self, ExecutionContext};
use crate::shell::registry::ProcessRegistry;

/// Session state for a connected client.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
}

/// Shared state for the HTTP transport.
pub struct HttpTransportState {
    pub server: Arc<McpServer>,
    pub registry: ProcessRegistry,
    pub token: String,
    /// Active sessions keyed by `Mcp-Session-Id`.
    pub sessions: RwLock<HashMap<String, Session>>,
    /// Broadcast channel for server-initiated messages, per session.
    pub broadcasters: RwLock<HashMap<String, broadcast::Sender<Value>>>,
    /// Broadcast channel for shutdown notification.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl HttpTransportState {
    pub fn new(server: Arc<McpServer>, registry: ProcessRegistry, token: String) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            server,
            registry,
            token,
            sessions: RwLock::new(HashMap::new()),
            broadcasters: RwLock::new(HashMap::new()),
            shutdown_tx,
        }
    }

    /// Notify all listeners that the server is shutting down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Create a new session and return its id.
    pub async fn create_session(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now();

        self.sessions.write().await.insert(
            session_id.clone(),
            Session {
                id: session_id.clone(),
                created_at: now,
                last_activity: now,
            },
        );

        let (tx, _) = broadcast::channel(100);
        self.broadcasters
            .write()
            .await
            .insert(session_id.clone(), tx);

        session_id
    }

    /// Validate and refresh a session.
    pub async fn validate_session(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.last_activity = chrono::Utc::now();
            true
        } else {
            false
        }
    }

    /// Terminate a session.
    pub async fn terminate_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        self.broadcasters.write().await.remove(session_id);
        removed
    }

    pub async fn get_broadcaster(&self, session_id: &str) -> Option<broadcast::Sender<Value>> {
        self.broadcasters.read().await.get(session_id).cloned()
    }
}

/// Build the transport router with auth and permissive CORS.
pub fn build_router(state: Arc<HttpTransportState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route(
            "/mcp",
            axum::routing::post(handle_post)
                .get(handle_get)
                .delete(handle_delete),
        )
        .route("/health", get(handle_health))
        // Panics become plain 500s with no stack trace in the response.
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(cors)
        .with_state(state)
}

/// Run the server until SIGINT, then drain all running shells.
pub async fn run_http_transport(
    server: Arc<McpServer>,
    registry: ProcessRegistry,
    config: HttpConfig,
) -> crate::GatewayResult<()> {
    let state = Arc::new(HttpTransportState::new(
        server,
        registry.clone(),
        config.token.clone(),
    ));
    let app = build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| crate::GatewayError::Internal(format!("invalid bind address: {}", e)))?;

    eprintln!("[toolgate] MCP server listening on http://{}/mcp", addr);
    eprintln!("[toolgate]   POST /mcp   - send JSON-RPC requests");
    eprintln!("[toolgate]   GET /mcp    - open SSE stream");
    eprintln!("[toolgate]   DELETE /mcp - terminate session");

    let listener = TcpListener::bind(addr).await?;
    let transport_state = state.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            transport_state.shutdown();
            transport_state.registry.drain().await;
        })
        .await?;

    eprintln!("[toolgate] MCP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        eprintln!("[toolgate] failed to install Ctrl+C handler: {}", e);
        return;
    }
    eprintln!("[toolgate] Ctrl+C received, shutting down...");
}

/// Constant-token bearer auth. Preflight requests pass through so the CORS
/// layer can answer them.
async fn auth_middleware(
    State(state): State<Arc<HttpTransportState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", state.token))
        .unwrap_or(false);

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized: invalid or missing bearer token" })),
        )
            .into_response();
    }

    next.run(request).await
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "server": "toolgate" }))
}

fn protocol_error(error: JsonRpcError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::to_value(JsonRpcResponse::error(None, error)).unwrap_or_default()),
    )
        .into_response()
}

/// POST /mcp - handle one JSON-RPC request (or a batch).
async fn handle_post(
    State(state): State<Arc<HttpTransportState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            return protocol_error(JsonRpcError::parse_error(format!("Parse error: {}", e)));
        }
    };

    let requests: Vec<JsonRpcRequest> = if parsed.is_array() {
        match serde_json::from_value(parsed) {
            Ok(requests) => requests,
            Err(e) => {
                return protocol_error(JsonRpcError::parse_error(format!("Parse error: {}", e)));
            }
        }
    } else {
        match serde_json::from_value::<JsonRpcRequest>(parsed) {
            Ok(request) => vec![request],
            Err(e) => {
                return protocol_error(JsonRpcError::parse_error(format!("Parse error: {}", e)));
            }
        }
    };

    let session_id = headers
        .get("Mcp-Session-Id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let execution_id = headers
        .get("Execution-Id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    // The first request of a session must be an initialization; everything
    // after must carry the session id it was handed.
    let is_init = requests.iter().any(|r| r.method == "initialize");
    if !is_init {
        match &session_id {
            None => {
                return protocol_error(JsonRpcError::invalid_request(
                    "Missing Mcp-Session-Id header; initialize a session first",
                ));
            }
            Some(sid) => {
                if !state.validate_session(sid).await {
                    return protocol_error(JsonRpcError::invalid_request(
                        "Unknown or expired session",
                    ));
                }
            }
        }
    }

    let ctx = match execution_id {
        Some(id) => ExecutionContext::with_execution_id(id),
        None => ExecutionContext::default(),
    };

    let mut responses: Vec<JsonRpcResponse> = Vec::new();
    let mut new_session_id: Option<String> = None;

    context::scope(ctx, async {
        for request in requests {
            let is_initialize = request.method == "initialize";
            let had_id = request.id.is_some();

            let response = state.server.handle_request(request).await;

            if is_initialize && response.error.is_none() {
                new_session_id = Some(state.create_session().await);
            }
            // Notifications get no response entry.
            if had_id {
                responses.push(response);
            }
        }
    })
    .await;

    if responses.is_empty() {
        // All notifications.
        return StatusCode::ACCEPTED.into_response();
    }

    let body = if responses.len() == 1 {
        serde_json::to_string(&responses[0]).unwrap_or_default()
    } else {
        serde_json::to_string(&responses).unwrap_or_default()
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(sid) = new_session_id {
        builder = builder.header("Mcp-Session-Id", sid);
    }
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// GET /mcp - open an SSE stream for server-initiated messages.
async fn handle_get(State(state): State<Arc<HttpTransportState>>, headers: HeaderMap) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !accept.contains("text/event-stream") {
        return (
            StatusCode::NOT_ACCEPTABLE,
            Json(json!({ "error": "Accept header must include text/event-stream" })),
        )
            .into_response();
    }

    let session_id = match headers.get("Mcp-Session-Id").and_then(|v| v.to_str().ok()) {
        Some(sid) => sid.to_string(),
        None => {
            return protocol_error(JsonRpcError::invalid_request("Missing Mcp-Session-Id header"));
        }
    };

    if !state.validate_session(&session_id).await {
        return protocol_error(JsonRpcError::invalid_request("Unknown or expired session"));
    }

    let broadcaster = match state.get_broadcaster(&session_id).await {
        Some(b) => b,
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Session broadcaster not found" })),
            )
                .into_response();
        }
    };

    let rx = broadcaster.subscribe();
    let shutdown_rx = state.shutdown_tx.subscribe();

    let stream = unfold(
        (rx, shutdown_rx, session_id),
        |(mut rx, mut shutdown_rx, sid)| async move {
            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Ok(msg) => {
                                let data = serde_json::to_string(&msg).unwrap_or_default();
                                let event = Event::default().event("message").data(data);
                                return Some((Ok::<_, Infallible>(event), (rx, shutdown_rx, sid)));
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => {
                                // Slow client; skip the missed messages.
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                return None;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        log::info!("closing SSE stream for session {}", sid);
                        return None;
                    }
                }
            }
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// DELETE /mcp - terminate the session.
async fn handle_delete(
    State(state): State<Arc<HttpTransportState>>,
    headers: HeaderMap,
) -> Response {
    let session_id = match headers.get("Mcp-Session-Id").and_then(|v| v.to_str().ok()) {
        Some(sid) => sid,
        None => {
            return protocol_error(JsonRpcError::invalid_request("Missing Mcp-Session-Id header"));
        }
    };

    if state.terminate_session(session_id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Session not found" })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;
    use tower::util::ServiceExt;

    async fn test_state() -> Arc<HttpTransportState> {
        let server = Arc::new(McpServer::new("toolgate-test", "0.0.0"));
        server
            .register_tool(
                "noop",
                "Do nothing",
                json!({"type": "object"}),
                Box::new(|_| Box::pin(async { Ok(Value::String("ok".to_string())) })),
            )
            .await;
        Arc::new(HttpTransportState::new(
            server,
            ProcessRegistry::new(),
            "secret-token".to_string(),
        ))
    }

    fn post_request(token: Option<&str>, session: Option<&str>, body: &str) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        if let Some(session) = session {
            builder = builder.header("Mcp-Session-Id", session);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    const INIT_BODY: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
    const LIST_BODY: &str = r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#;

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let app = build_router(test_state().await);
        let response = app.oneshot(post_request(None, None, INIT_BODY)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_token_is_401() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(post_request(Some("wrong"), None, INIT_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_preflight_needs_no_token() {
        let app = build_router(test_state().await);
        let request = HttpRequest::builder()
            .method("OPTIONS")
            .uri("/mcp")
            .header("origin", "https://example.com")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_initialize_creates_session() {
        let state = test_state().await;
        let app = build_router(state.clone());
        let response = app
            .oneshot(post_request(Some("secret-token"), None, INIT_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let sid = response
            .headers()
            .get("Mcp-Session-Id")
            .expect("session header")
            .to_str()
            .unwrap()
            .to_string();
        assert!(state.validate_session(&sid).await);
    }

    #[tokio::test]
    async fn test_non_init_without_session_is_400() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(post_request(Some("secret-token"), None, LIST_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_session_is_400() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(post_request(Some("secret-token"), Some("nope"), LIST_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_session_flow_and_termination() {
        let state = test_state().await;
        let sid = state.create_session().await;

        let app = build_router(state.clone());
        let response = app
            .clone()
            .oneshot(post_request(Some("secret-token"), Some(&sid), LIST_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Terminate, then the same session is rejected.
        let delete = HttpRequest::builder()
            .method("DELETE")
            .uri("/mcp")
            .header("authorization", "Bearer secret-token")
            .header("Mcp-Session-Id", sid.clone())
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(post_request(Some("secret-token"), Some(&sid), LIST_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unparseable_body_is_400() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(post_request(Some("secret-token"), None, "{ not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_notification_only_is_202() {
        let state = test_state().await;
        let sid = state.create_session().await;
        let app = build_router(state);
        let body = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let response = app
            .oneshot(post_request(Some("secret-token"), Some(&sid), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
