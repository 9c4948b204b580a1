//! Owns the connection to the JetBrains IDE-hosted MCP tool server: session
//! lifecycle (start/stop/restart), retry-with-restart semantics for RPCs,
//! and the tool allow-list with per-tool path rewriting.

mod dispatcher;
mod error;
mod session;
mod state;
mod supervisor;

pub use dispatcher::{is_allowed, TOOL_REGISTRY};
pub use error::ToolError;
pub use state::SessionState;
pub use supervisor::{SharedSupervisor, Supervisor};
