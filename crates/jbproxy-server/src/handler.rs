//! `rmcp::ServerHandler` implementation that forwards `list_tools`/`call_tool`
//! to the upstream session supervisor, converting [`ToolError`] into the
//! protocol's own error representation.

use rmcp::model::{
    CallToolRequestParam, CallToolResult, GetPromptRequestParam, GetPromptResult, Implementation,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::Map;

use jbproxy_upstream::{SharedSupervisor, ToolError};

/// Converts a [`ToolError`] into the JSON-RPC error the transport returns to
/// the client. The original code (400/404/408/500) is kept in the message
/// text since `rmcp`'s `ErrorData` only distinguishes JSON-RPC-level error
/// classes, not this proxy's own code space.
fn to_mcp_error(err: ToolError) -> McpError {
    let message = format!("[{}] {}", err.code, err.message);
    match err.code {
        400 => McpError::invalid_params(message, None),
        _ => McpError::internal_error(message, None),
    }
}

/// Joins the trimmed text of a failed tool result's content blocks with a
/// single space, skipping empty parts, falling back to a generic message
/// when nothing is left.
fn content_error_message(result: &CallToolResult) -> String {
    let joined = result
        .content
        .iter()
        .filter_map(|block| block.as_text())
        .map(|text| text.text.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        "Error calling tool. Please check the server logs for more details.".to_string()
    } else {
        joined
    }
}

/// Serves the Protocol to a client, backed by a single shared
/// [`jbproxy_upstream::Supervisor`]. Cheap to clone: the supervisor is held
/// behind an `Arc`.
#[derive(Clone)]
pub struct ProxyHandler {
    supervisor: SharedSupervisor,
    server_name: String,
}

impl ProxyHandler {
    pub fn new(supervisor: SharedSupervisor, server_name: String) -> Self {
        Self {
            supervisor,
            server_name,
        }
    }
}

impl ServerHandler for ProxyHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.server_name.clone(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                website_url: None,
                icons: None,
            },
            instructions: Some(
                "Protocol-translating proxy to a JetBrains IDE-hosted MCP tool server"
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = self.supervisor.list_tools().await.map_err(to_mcp_error)?;
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request.arguments.unwrap_or_else(Map::new);
        let result = self
            .supervisor
            .call_tool(request.name.as_ref(), arguments)
            .await
            .map_err(to_mcp_error)?;

        if result.is_error.unwrap_or(false) {
            return Err(McpError::internal_error(content_error_message(&result), None));
        }
        Ok(result)
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        Ok(ListPromptsResult {
            prompts: vec![],
            next_cursor: None,
        })
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        Err(McpError::invalid_params(
            format!("no prompts are served by this proxy: {}", request.name),
            None,
        ))
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: vec![],
            next_cursor: None,
        })
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        Ok(ListResourceTemplatesResult {
            next_cursor: None,
            resource_templates: vec![],
        })
    }
}
