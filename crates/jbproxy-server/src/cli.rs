use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// `jbproxy` — protocol-translating proxy to a JetBrains IDE-hosted MCP tool
/// server. The config file is the source of truth; every flag here is an
/// optional override.
#[derive(Parser, Debug)]
#[command(name = "jbproxy", version, about)]
pub struct Cli {
    /// Path to the YAML config file. Defaults to the search order described
    /// in `jbproxy_config::resolve_config_path`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides the configured transport.
    #[arg(long, value_enum)]
    pub transport: Option<TransportArg>,

    /// Overrides the SSE bind address (host:port) when the transport is
    /// `sse`.
    #[arg(long)]
    pub sse: Option<SocketAddr>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportArg {
    Stdio,
    Sse,
}

impl TransportArg {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportArg::Stdio => "stdio",
            TransportArg::Sse => "sse",
        }
    }
}
