use clap::Parser;
use jbproxy_server::cli::{Cli, TransportArg};
use jbproxy_server::ProxyHandler;
use jbproxy_upstream::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let config_path = jbproxy_config::resolve_config_path(cli.config.as_deref());
    let mut config = match jbproxy_config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("[{}] failed to load config from {config_path:?}: {e}", e.code());
            std::process::exit(1);
        }
    };

    if let Some(transport) = cli.transport {
        config.transport = transport.as_str().to_string();
    }
    if let Some(addr) = cli.sse {
        config.sse_bind_host = addr.ip().to_string();
        config.sse_port = addr.port();
    }

    let supervisor = match Supervisor::new(&config.jetbrains_mcp_server) {
        Ok(s) => std::sync::Arc::new(s),
        Err(e) => {
            log::error!("[400] invalid jetbrains_mcp_server path configuration: {e}");
            std::process::exit(1);
        }
    };

    let handler = ProxyHandler::new(supervisor.clone(), config.server_name.clone());

    match config.transport.as_str() {
        "stdio" => {
            if console_logging_enabled() {
                log::error!(
                    "[400] stdio transport requires SIMP_LOGGER_LOG_CONSOLE_ENABLED=false \
                     (stdio must not share stdout with log output)"
                );
                std::process::exit(1);
            }
            jbproxy_server::serve_stdio(handler).await?;
            supervisor.stop().await;
        }
        "sse" => {
            let handle = jbproxy_server::serve_sse(
                handler,
                &config.sse_bind_host,
                config.sse_port,
                &config.sse_transport_endpoint,
            )
            .await?;

            wait_for_shutdown_signal().await;
            log::info!("shutdown signal received, stopping SSE transport");
            handle.cancel();
            if handle.wait_for_completion(config.timeout).await.is_err() {
                log::warn!("SSE transport did not shut down within {:?}, exiting anyway", config.timeout);
            }
            supervisor.stop().await;
        }
        other => {
            log::error!("[400] unknown transport '{other}', expected 'stdio' or 'sse'");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// `SIMP_LOGGER_LOG_CONSOLE_ENABLED` gates stdio transport: console logging
/// must be explicitly disabled since stdio framing owns stdout.
fn console_logging_enabled() -> bool {
    match std::env::var("SIMP_LOGGER_LOG_CONSOLE_ENABLED") {
        Ok(v) => !matches!(v.to_lowercase().as_str(), "false" | "no" | "0" | "n" | "off"),
        Err(_) => true,
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let ctrl_c = tokio::signal::ctrl_c();
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            let _ = ctrl_c.await;
            return;
        };
        tokio::select! {
            _ = ctrl_c => log::debug!("received SIGINT"),
            _ = sigterm.recv() => log::debug!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
