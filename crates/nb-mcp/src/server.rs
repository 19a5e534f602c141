//! Discovery & Invocation Server
//!
//! Owns the tool registry and the session resource source, answers
//! discovery (`list_tools`, `list_resources`) and dispatches invocations.
//! Transport-agnostic: stdio and HTTP both drive it through
//! [`McpServer::handle_request`] or the typed methods below.
//!
//! Lifecycle is `Ready -> Closed`. Everything built in [`McpServer::create`]
//! is dropped on [`McpServer::close`]; later calls get `ServerClosed`.

use futures::stream;
use nb_core::SessionStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::error::{McpError, Result};
use crate::faults::{Fault, FaultReporter, FaultSource};
use crate::protocol::{JsonRpcError, McpRequest, McpResponse};
use crate::resources::{ResourceContents, ResourceInfo, SessionResources};
use crate::streaming::{collect_text, stream_to_channel, ResponseChannel, StreamOptions, StreamSummary};
use crate::tool_registry::{ToolInfo, ToolOutput, ToolRegistry};
use crate::tools::{self, ToolContext};
use crate::{PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION};

/// Server configuration
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Server name override
    pub name: Option<String>,
    /// Default number of source lines in `get_cell_map` previews
    pub preview_lines: usize,
    /// Buffered faults per subscriber before the slowest one lags
    pub fault_capacity: usize,
    /// Chunks buffered between a streaming tool and an HTTP body
    pub stream_buffer: usize,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            name: None,
            preview_lines: 3,
            fault_capacity: 64,
            stream_buffer: 16,
        }
    }
}

/// Observable lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Ready,
    Closed,
}

enum ServerState {
    Ready {
        tools: Arc<ToolRegistry>,
        resources: Arc<SessionResources>,
    },
    Closed,
}

#[derive(Debug, Clone)]
struct ClientInfo {
    name: String,
    version: Option<String>,
}

pub struct McpServer {
    config: McpServerConfig,
    store: Arc<dyn SessionStore>,
    faults: FaultReporter,
    state: RwLock<ServerState>,
    /// Client info from last initialize
    client_info: RwLock<Option<ClientInfo>>,
}

impl McpServer {
    /// Build a ready server over `store` with the built-in tool set
    pub fn create(config: McpServerConfig, store: Arc<dyn SessionStore>) -> Result<Arc<Self>> {
        let mut registry = ToolRegistry::new();
        let ctx = ToolContext {
            store: store.clone(),
            preview_lines: config.preview_lines,
        };
        tools::register_all(&mut registry, &ctx)?;

        let resources = SessionResources::new(store.clone());
        let faults = FaultReporter::new(config.fault_capacity);

        info!(
            name = config.name.as_deref().unwrap_or(SERVER_NAME),
            tools = registry.len(),
            "MCP server ready"
        );

        Ok(Arc::new(Self {
            config,
            store,
            faults,
            state: RwLock::new(ServerState::Ready {
                tools: Arc::new(registry),
                resources: Arc::new(resources),
            }),
            client_info: RwLock::new(None),
        }))
    }

    pub fn config(&self) -> &McpServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn faults(&self) -> &FaultReporter {
        &self.faults
    }

    /// Name and version the client sent with its last `initialize`
    pub async fn client(&self) -> Option<(String, Option<String>)> {
        self.client_info
            .read()
            .await
            .as_ref()
            .map(|c| (c.name.clone(), c.version.clone()))
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        match *self.state.read().await {
            ServerState::Ready { .. } => Lifecycle::Ready,
            ServerState::Closed => Lifecycle::Closed,
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.lifecycle().await == Lifecycle::Closed
    }

    async fn tools(&self) -> Result<Arc<ToolRegistry>> {
        match &*self.state.read().await {
            ServerState::Ready { tools, .. } => Ok(tools.clone()),
            ServerState::Closed => Err(McpError::ServerClosed),
        }
    }

    async fn resources(&self) -> Result<Arc<SessionResources>> {
        match &*self.state.read().await {
            ServerState::Ready { resources, .. } => Ok(resources.clone()),
            ServerState::Closed => Err(McpError::ServerClosed),
        }
    }

    /// Registered tools, in registration order
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        Ok(self.tools().await?.definitions())
    }

    /// One descriptor per open session, recomputed on every call
    pub async fn list_resources(&self) -> Result<Vec<ResourceInfo>> {
        self.resources().await?.list().await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ResourceContents> {
        self.resources().await?.read(uri).await
    }

    /// Invoke a tool by exact name. Unknown names and schema mismatches
    /// fail before anything executes. A handler panic is reported on the
    /// fault channel and returned.
    pub async fn invoke_tool(&self, name: &str, args: Value) -> Result<ToolOutput> {
        let tools = self.tools().await?;
        debug!(tool = %name, "Invoking tool");
        let result = tools.execute(name, args).await;
        if let Err(e @ McpError::HandlerPanic { .. }) = &result {
            self.report_fault(Fault::from_error(FaultSource::Handler, e).with_context(name));
        }
        result
    }

    /// Render a tool output as text, draining a stream output completely.
    /// A producer failure is reported on the fault channel and returned.
    pub async fn collect_output(&self, name: &str, output: ToolOutput) -> Result<String> {
        match output {
            ToolOutput::Value(value) => Ok(serde_json::to_string_pretty(&value)?),
            ToolOutput::Stream(chunks) => {
                let result = collect_text(chunks).await;
                if let Err(e) = &result {
                    if e.is_stream_fault() {
                        self.report_fault(
                            Fault::from_error(FaultSource::Stream, e).with_context(name),
                        );
                    }
                }
                result
            }
        }
    }

    /// Invoke a tool and deliver its output through `channel`
    pub async fn stream_tool<C>(
        &self,
        name: &str,
        args: Value,
        channel: &mut C,
        options: &StreamOptions,
    ) -> Result<StreamSummary>
    where
        C: ResponseChannel + ?Sized,
    {
        let output = self.invoke_tool(name, args).await?;
        self.deliver(name, output, channel, options).await
    }

    /// Deliver an already produced tool output through `channel`.
    ///
    /// A value output goes out as a single JSON chunk. Faults raised after
    /// the headers may have been committed are reported on the fault
    /// channel and returned.
    pub async fn deliver<C>(
        &self,
        name: &str,
        output: ToolOutput,
        channel: &mut C,
        options: &StreamOptions,
    ) -> Result<StreamSummary>
    where
        C: ResponseChannel + ?Sized,
    {
        let result = match output {
            ToolOutput::Stream(chunks) => stream_to_channel(chunks, channel, options).await,
            ToolOutput::Value(value) => {
                let body = serde_json::to_vec(&value)?;
                let options = options.clone().with_header(
                    axum::http::header::CONTENT_TYPE,
                    axum::http::HeaderValue::from_static("application/json"),
                );
                let once = stream::iter([Ok::<_, McpError>(body)]);
                stream_to_channel(once, channel, &options).await
            }
        };

        if let Err(e) = &result {
            if e.is_stream_fault() {
                self.report_fault(Fault::from_error(FaultSource::Stream, e).with_context(name));
            }
        }
        result
    }

    /// Transition to `Closed`. Idempotent.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        if matches!(*state, ServerState::Closed) {
            debug!("Close on an already closed server");
            return;
        }
        *state = ServerState::Closed;
        info!("MCP server closed");
    }

    pub fn subscribe_faults(&self) -> broadcast::Receiver<Fault> {
        self.faults.subscribe()
    }

    pub fn report_fault(&self, fault: Fault) {
        self.faults.report(fault);
    }

    /// Handle an MCP request
    pub async fn handle_request(&self, request: McpRequest) -> McpResponse {
        debug!(method = %request.method, "Handling MCP request");

        match request.method.as_str() {
            "initialize" => self.handle_initialize(request).await,
            "initialized" | "notifications/initialized" => {
                McpResponse::success(request.id, json!({}))
            }
            "ping" => McpResponse::success(request.id, json!({})),
            "tools/list" => self.handle_tools_list(request).await,
            "tools/call" => self.handle_tools_call(request).await,
            "resources/list" => self.handle_resources_list(request).await,
            "resources/read" => self.handle_resources_read(request).await,
            _ => McpResponse::error(
                request.id,
                JsonRpcError::method_not_found(&request.method),
            ),
        }
    }

    async fn handle_initialize(&self, request: McpRequest) -> McpResponse {
        let client = request.params.as_ref().and_then(|p| p.get("clientInfo"));
        let client_name = client
            .and_then(|ci| ci.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("unknown");
        let client_version = client
            .and_then(|ci| ci.get("version"))
            .and_then(|v| v.as_str());

        *self.client_info.write().await = Some(ClientInfo {
            name: client_name.to_string(),
            version: client_version.map(String::from),
        });

        info!(
            client = %client_name,
            version = %client_version.unwrap_or("?"),
            "Client connected"
        );

        let server_name = self.config.name.as_deref().unwrap_or(SERVER_NAME);

        McpResponse::success(request.id, json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": true }
            },
            "serverInfo": {
                "name": server_name,
                "version": SERVER_VERSION
            }
        }))
    }

    async fn handle_tools_list(&self, request: McpRequest) -> McpResponse {
        match self.list_tools().await {
            Ok(tools) => McpResponse::success(request.id, json!({ "tools": tools })),
            Err(e) => McpResponse::error(request.id, JsonRpcError::from(&e)),
        }
    }

    async fn handle_tools_call(&self, request: McpRequest) -> McpResponse {
        let params = match &request.params {
            Some(p) => p,
            None => return McpResponse::error(
                request.id,
                JsonRpcError::invalid_params("Missing params"),
            ),
        };

        let tool_name = match params.get("name").and_then(|n| n.as_str()) {
            Some(n) => n.to_string(),
            None => return McpResponse::error(
                request.id,
                JsonRpcError::invalid_params("Missing tool name"),
            ),
        };

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let text = match self.invoke_tool(&tool_name, arguments).await {
            Ok(output) => self.collect_output(&tool_name, output).await,
            Err(e) => Err(e),
        };

        match text {
            Ok(text) => McpResponse::success(request.id, json!({
                "content": [{ "type": "text", "text": text }],
                "isError": false
            })),
            Err(e @ (McpError::NotFound { .. }
            | McpError::InvalidArguments(_)
            | McpError::ServerClosed)) => {
                warn!(tool = %tool_name, error = %e, "Tool call rejected");
                McpResponse::error(request.id, JsonRpcError::from(&e))
            }
            Err(e) => McpResponse::success(request.id, json!({
                "content": [{ "type": "text", "text": format!("Error: {}", e) }],
                "isError": true
            })),
        }
    }

    async fn handle_resources_list(&self, request: McpRequest) -> McpResponse {
        match self.list_resources().await {
            Ok(resources) => McpResponse::success(request.id, json!({ "resources": resources })),
            Err(e) => McpResponse::error(request.id, JsonRpcError::from(&e)),
        }
    }

    async fn handle_resources_read(&self, request: McpRequest) -> McpResponse {
        let uri = request.params
            .as_ref()
            .and_then(|p| p.get("uri"))
            .and_then(|u| u.as_str())
            .unwrap_or("");

        if uri.is_empty() {
            return McpResponse::error(
                request.id,
                JsonRpcError::invalid_params("Missing uri"),
            );
        }

        match self.read_resource(uri).await {
            Ok(contents) => McpResponse::success(request.id, json!({ "contents": [contents] })),
            Err(e) => McpResponse::error(request.id, JsonRpcError::from(&e)),
        }
    }
}
