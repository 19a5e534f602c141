//! HTTP Transport
//!
//! JSON-RPC on `POST /mcp` (and `/message`), plus REST endpoints for
//! discovery and tool calls. Tool calls that produce a stream are answered
//! with a chunked body fed by the streaming transport from a spawned task.

use super::Transport;
use crate::error::McpError;
use crate::streaming::{body_channel, StreamOptions};
use crate::tool_registry::ToolOutput;
use crate::{JsonRpcError, McpRequest, McpResponse, McpServer};
use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info, Level};

/// HTTP transport (JSON-RPC + REST endpoints)
pub struct HttpTransport {
    bind_addr: String,
    enable_cors: bool,
}

impl HttpTransport {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            enable_cors: true,
        }
    }

    pub fn without_cors(mut self) -> Self {
        self.enable_cors = false;
        self
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn serve(self, server: Arc<McpServer>) -> Result<()> {
        info!(addr = %self.bind_addr, "Starting HTTP transport");

        let mut app = router(server).layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        );

        // CORS outermost
        if self.enable_cors {
            app = app.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
            );
        }

        let listener = tokio::net::TcpListener::bind(&self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP transport listening");

        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// All HTTP routes, without CORS
pub fn router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/", get(root_handler).post(mcp_handler))
        .route("/mcp", post(mcp_handler))
        .route("/message", post(mcp_handler))
        .route("/health", get(health_handler))
        .route("/tools/list", get(tools_list_handler))
        .route("/tools/call", post(tools_call_handler))
        .route("/resources/list", get(resources_list_handler))
        .with_state(server)
}

fn status_for(err: &McpError) -> StatusCode {
    match err {
        McpError::NotFound { .. } => StatusCode::NOT_FOUND,
        McpError::InvalidArguments(_) => StatusCode::BAD_REQUEST,
        McpError::ServerClosed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &McpError) -> Response {
    (status_for(err), Json(json!({ "error": err.to_string() }))).into_response()
}

// === Handlers ===

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": crate::SERVER_NAME,
        "version": crate::SERVER_VERSION,
        "protocol": crate::PROTOCOL_VERSION,
        "endpoints": {
            "mcp": "POST /mcp",
            "health": "GET /health",
            "tools_list": "GET /tools/list",
            "tools_call": "POST /tools/call",
            "resources_list": "GET /resources/list"
        }
    }))
}

async fn health_handler(State(server): State<Arc<McpServer>>) -> impl IntoResponse {
    let closed = server.is_closed().await;
    let status = if closed { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };
    (status, Json(json!({
        "status": if closed { "closed" } else { "ok" },
        "service": crate::SERVER_NAME,
        "version": crate::SERVER_VERSION
    })))
}

async fn mcp_handler(
    State(server): State<Arc<McpServer>>,
    payload: std::result::Result<Json<McpRequest>, JsonRejection>,
) -> Response {
    // Unparseable bodies still get a JSON-RPC reply
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected MCP request body");
            let error = JsonRpcError::parse_error(rejection.body_text());
            return (StatusCode::BAD_REQUEST, Json(McpResponse::error(None, error))).into_response();
        }
    };
    debug!(method = %request.method, "HTTP MCP request");
    if request.is_notification() {
        server.handle_request(request).await;
        return StatusCode::ACCEPTED.into_response();
    }
    Json(server.handle_request(request).await).into_response()
}

async fn tools_list_handler(State(server): State<Arc<McpServer>>) -> Response {
    match server.list_tools().await {
        Ok(tools) => Json(json!({ "tools": tools })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn resources_list_handler(State(server): State<Arc<McpServer>>) -> Response {
    match server.list_resources().await {
        Ok(resources) => Json(json!({ "resources": resources })).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct ToolCall {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

async fn tools_call_handler(
    State(server): State<Arc<McpServer>>,
    Json(call): Json<ToolCall>,
) -> Response {
    let arguments = call.arguments.unwrap_or_else(|| json!({}));

    let result = server.invoke_tool(&call.name, arguments).await;
    match result {
        Ok(ToolOutput::Value(value)) => Json(value).into_response(),
        Ok(output) => {
            let (mut channel, pending) = body_channel(server.config().stream_buffer);
            let name = call.name;
            tokio::spawn(async move {
                // Faults are already on the fault channel; the body just ends
                if let Err(e) = server
                    .deliver(&name, output, &mut channel, &StreamOptions::default())
                    .await
                {
                    debug!(tool = %name, error = %e, "Streamed tool call ended early");
                }
            });
            pending.into_response().await
        }
        Err(e) => {
            debug!(tool = %call.name, error = %e, "Tool call failed");
            error_response(&e)
        }
    }
}
