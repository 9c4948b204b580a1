//! SSE HTTP transport front-end: binds an `rmcp` SSE server to the
//! configured host/port and endpoint, and attaches a [`ProxyHandler`] per
//! incoming client connection.

use std::net::SocketAddr;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::handler::ProxyHandler;
use crate::sse_handle::ServerHandle;

/// Binds and serves the SSE transport in the background, returning a handle
/// the caller uses to signal and await graceful shutdown.
pub async fn serve(
    handler: ProxyHandler,
    bind_host: &str,
    port: u16,
    post_path: &str,
) -> anyhow::Result<ServerHandle> {
    use rmcp::transport::sse_server::{SseServer as RmcpSseServer, SseServerConfig};

    let addr: SocketAddr = format!("{bind_host}:{port}").parse()?;
    let ct = CancellationToken::new();

    let config = SseServerConfig {
        bind: addr,
        sse_path: "/sse".to_string(),
        post_path: post_path.to_string(),
        ct: ct.clone(),
        sse_keep_alive: None,
    };

    let (sse_server, router) = RmcpSseServer::new(config);

    log::info!("starting SSE transport on http://{addr}{post_path}");
    let (completion_tx, completion_rx) = oneshot::channel();

    let axum_handle = axum_server::Handle::new();
    let shutdown_handle = axum_handle.clone();
    let server_task = tokio::spawn(async move {
        let result = axum_server::bind(addr)
            .handle(axum_handle)
            .serve(router.into_make_service())
            .await;
        if let Err(e) = result {
            log::error!("SSE transport error: {e}");
        }
    });

    let _service_ct = sse_server.with_service_directly(move || handler.clone());

    let monitor_ct = ct.clone();
    tokio::spawn(async move {
        monitor_ct.cancelled().await;
        log::debug!("SSE shutdown signal received, stopping listener");
        shutdown_handle.graceful_shutdown(None);
        let _ = server_task.await;
        let _ = completion_tx.send(());
    });

    Ok(ServerHandle::new(ct, completion_rx))
}
