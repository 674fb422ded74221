//! HTTP transport: JSON-RPC over POST with `Mcp-Session-Id` sessions.
//!
//! Every session owns its own [`McpServer`] (and therefore its own
//! initialize state); all sessions share one [`ToolHandler`]. Sessions are
//! opened by `initialize` only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::handlers::ToolHandler;
use crate::protocol::{IncomingMessage, JsonRpcError, JsonRpcResponse, RequestId, SERVER_NAME};
use crate::server::McpServer;

/// Session header, lowercase as carried by `http`.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Outcome of one POSTed message.
#[derive(Debug)]
pub struct HttpReply {
    pub status: StatusCode,
    pub session_id: Option<String>,
    pub body: Option<Value>,
}

impl IntoResponse for HttpReply {
    fn into_response(self) -> Response {
        let mut response = match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        };
        if let Some(id) = self.session_id {
            if let Ok(value) = HeaderValue::from_str(&id) {
                response.headers_mut().insert(SESSION_HEADER, value);
            }
        }
        response
    }
}

/// Session registry plus the axum routes in front of it.
pub struct HttpTransport {
    handler: Arc<ToolHandler>,
    sessions: Mutex<HashMap<String, Arc<McpServer>>>,
}

impl HttpTransport {
    pub fn new(handler: Arc<ToolHandler>) -> Self {
        Self {
            handler,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Existing session for `requested`. Only an `initialize` request opens a
    /// new stored session; anything else without a live session is answered
    /// by an unregistered server and gets no session id.
    fn session(
        &self,
        requested: Option<&str>,
        message: &IncomingMessage,
    ) -> (Option<String>, Arc<McpServer>) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(id) = requested {
            if let Some(server) = sessions.get(id) {
                return (Some(id.to_string()), server.clone());
            }
            tracing::warn!(session = id, "Unknown session id");
        }

        let server = Arc::new(McpServer::new(self.handler.clone()));
        if !is_initialize(message) {
            return (None, server);
        }

        let id = Uuid::new_v4().to_string();
        sessions.insert(id.clone(), server.clone());
        tracing::debug!(session = %id, "Session created");
        (Some(id), server)
    }

    /// Drop a session. Returns whether it existed.
    pub fn close_session(&self, id: &str) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Handle one POSTed body.
    pub async fn handle_body(&self, session_header: Option<&str>, body: &[u8]) -> HttpReply {
        let parsed = std::str::from_utf8(body)
            .map_err(|e| JsonRpcError::parse_error(&e.to_string()))
            .and_then(IncomingMessage::parse);

        let message = match parsed {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e.message, "Rejected HTTP message");
                let response = JsonRpcResponse::error(RequestId::Null, e);
                return HttpReply {
                    status: StatusCode::BAD_REQUEST,
                    session_id: None,
                    body: serde_json::to_value(response).ok(),
                };
            }
        };

        let (session_id, server) = self.session(session_header, &message);

        match server.handle_message(message).await {
            Some(response) => HttpReply {
                status: StatusCode::OK,
                session_id,
                body: serde_json::to_value(response).ok(),
            },
            None => HttpReply {
                status: StatusCode::ACCEPTED,
                session_id,
                body: None,
            },
        }
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/", get(health))
            .route("/mcp", post(post_message).delete(delete_session))
            .route("/messages", post(post_message))
            .with_state(self)
    }

    /// Serve until the listener fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("MCP server listening on http://{}", addr);
        }
        axum::serve(listener, self.router()).await
    }
}

fn is_initialize(message: &IncomingMessage) -> bool {
    matches!(message, IncomingMessage::Request(req) if req.method == "initialize")
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok", "service": SERVER_NAME }))
}

async fn post_message(
    State(transport): State<Arc<HttpTransport>>,
    headers: HeaderMap,
    body: Bytes,
) -> HttpReply {
    transport.handle_body(session_header(&headers), &body).await
}

async fn delete_session(
    State(transport): State<Arc<HttpTransport>>,
    headers: HeaderMap,
) -> StatusCode {
    match session_header(&headers) {
        Some(id) if transport.close_session(id) => StatusCode::NO_CONTENT,
        _ => StatusCode::NOT_FOUND,
    }
}
