//! SSE and stdio transport front-ends that expose the upstream session
//! supervisor and tool dispatcher (`jbproxy_upstream`) to clients speaking
//! the Protocol.

pub mod cli;
mod handler;
mod sse;
mod sse_handle;
mod stdio;

pub use cli::Cli;
pub use handler::ProxyHandler;
pub use sse::serve as serve_sse;
pub use sse_handle::ServerHandle;
pub use stdio::serve as serve_stdio;
