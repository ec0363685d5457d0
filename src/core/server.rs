//! MCP server handler.
//!
//! The handler only advertises tools. `list_tools` answers from the catalog
//! computed at startup and `call_tool` hands every request to the
//! dispatcher, serialized through a single call gate so tool calls run one
//! at a time regardless of the transport.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, model::*, service::RequestContext,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use super::config::Config;
use crate::domains::tools::{Dispatcher, JsonObject, ResponseEnvelope};

/// The gateway's MCP server handler.
///
/// Cloning is cheap; clones share the dispatcher and the call gate.
#[derive(Clone)]
pub struct McpServer {
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    /// Catalog as rmcp models, built once.
    tools: Arc<Vec<Tool>>,
    /// Held for the duration of each tool call.
    call_gate: Arc<Mutex<()>>,
}

impl McpServer {
    /// Wrap a fully built dispatcher.
    pub fn new(config: Arc<Config>, dispatcher: Dispatcher) -> Self {
        let tools = dispatcher.catalog().to_tools();
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            tools: Arc::new(tools),
            call_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    pub fn version(&self) -> &str {
        &self.config.server.version
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Advertised tools, in catalog order.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Run one tool call to completion under the call gate.
    pub async fn call(&self, name: &str, args: JsonObject) -> ResponseEnvelope {
        let _turn = self.call_gate.lock().await;
        self.dispatcher.dispatch(name, args).await
    }

    // ========================================================================
    // HTTP Transport Support Methods
    // ========================================================================

    /// Tool list in MCP wire form (for HTTP transport).
    pub fn list_tools_json(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.input_schema
                })
            })
            .collect()
    }

    /// Call a tool and return the MCP `CallToolResult` as JSON (for HTTP
    /// transport).
    pub async fn call_tool_json(&self, name: &str, arguments: Value) -> Result<Value, String> {
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => JsonObject::new(),
            other => return Err(format!("arguments must be an object, got {}", other)),
        };
        let result = tool_result(&self.call(name, args).await);
        serde_json::to_value(result).map_err(|e| e.to_string())
    }
}

/// Envelope as pretty JSON text content; error envelopes set `isError`.
pub fn tool_result(envelope: &ResponseEnvelope) -> CallToolResult {
    let content = vec![Content::text(envelope.to_pretty_json())];
    if envelope.is_success() {
        CallToolResult::success(content)
    } else {
        CallToolResult::error(content)
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Research gateway: storage, research coordination, visualization and knowledge \
                 tools, plus GitHub, Perplexity, Notion, Gemini, Kimi K2 and Wolfram|Alpha when configured."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    #[instrument(skip(self, _request, _context))]
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        info!("Listing {} tools", self.tools.len());
        Ok(ListToolsResult {
            tools: self.tools.to_vec(),
            next_cursor: None,
            meta: None,
        })
    }

    #[instrument(skip(self, request, _context), fields(tool = %request.name))]
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request.arguments.unwrap_or_default();
        let envelope = self.call(&request.name, args).await;
        Ok(tool_result(&envelope))
    }
}
