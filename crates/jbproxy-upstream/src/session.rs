use rmcp::model::{CallToolRequestParam, CallToolResult, ClientCapabilities, ClientInfo, Implementation, Tool};
use rmcp::service::RunningService;
use rmcp::{RoleClient, ServiceExt};

use crate::error::ToolError;

/// Connection parameters for the upstream JetBrains IDE MCP tool server.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    pub headers: Option<std::collections::HashMap<String, String>>,
}

/// Builds a `reqwest::Client` carrying the configured headers as defaults on
/// every request the SSE transport makes.
fn build_client_with_headers(
    headers: &std::collections::HashMap<String, String>,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut header_map = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        let Ok(name) = reqwest::header::HeaderName::from_bytes(name.as_bytes()) else {
            log::warn!("ignoring invalid upstream header name: {name}");
            continue;
        };
        let Ok(value) = reqwest::header::HeaderValue::from_str(value) else {
            log::warn!("ignoring invalid upstream header value for '{name}'");
            continue;
        };
        header_map.insert(name, value);
    }
    reqwest::Client::builder().default_headers(header_map).build()
}

/// A connected upstream session. Dropping this without calling [`close`]
/// still tears the transport down (rmcp's `RunningService` cancels on drop),
/// but callers should prefer the explicit, bounded close so failures are
/// observed and logged rather than silently swallowed by a destructor.
pub struct UpstreamSession {
    peer: RunningService<RoleClient, ClientInfo>,
}

/// Opens the SSE transport, performs the MCP handshake, and returns a
/// connected session. Any failure here leaves nothing for the caller to tear
/// down — the transport and handshake are opened atomically by `serve`.
pub async fn open(config: &SessionConfig) -> Result<UpstreamSession, ToolError> {
    let transport = match &config.headers {
        None => rmcp::transport::SseClientTransport::start(config.url.clone())
            .await
            .map_err(|e| ToolError::server(format!("failed to open SSE transport: {e}")))?,
        Some(headers) => {
            let client = build_client_with_headers(headers)
                .map_err(|e| ToolError::server(format!("failed to build HTTP client: {e}")))?;
            rmcp::transport::SseClientTransport::start_with_client(
                client,
                rmcp::transport::sse_client::SseClientConfig {
                    sse_endpoint: config.url.clone().into(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ToolError::server(format!("failed to open SSE transport: {e}")))?
        }
    };

    let client_info = ClientInfo {
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "jetbrains-proxy-mcp-server".to_string(),
            title: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            website_url: None,
            icons: None,
        },
    };

    let peer = client_info
        .serve(transport)
        .await
        .map_err(|e| ToolError::server(format!("failed to initialize upstream session: {e}")))?;

    Ok(UpstreamSession { peer })
}

impl UpstreamSession {
    pub async fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        let result = self
            .peer
            .list_tools(Default::default())
            .await
            .map_err(|e| ToolError::server(format!("list_tools failed: {e}")))?;
        Ok(result.tools)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<CallToolResult, ToolError> {
        self.peer
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| ToolError::server(format!("call_tool '{name}' failed: {e}")))
    }

    /// Closes the session. Never panics; callers are expected to bound this
    /// with their own timeout and log failures rather than propagate them.
    pub async fn close(self) -> Result<(), ToolError> {
        self.peer
            .cancel()
            .await
            .map(|_| ())
            .map_err(|e| ToolError::server(format!("failed to close upstream session: {e}")))
    }
}
