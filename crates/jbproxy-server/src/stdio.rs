//! Stdio transport front-end. Reads/writes framed Protocol messages on
//! stdin/stdout; per §7, this must never share stdout with log output, so
//! callers are required to set `SIMP_LOGGER_LOG_CONSOLE_ENABLED=false`
//! before this is invoked (checked in `main`).

use rmcp::ServiceExt;

use crate::handler::ProxyHandler;

pub async fn serve(handler: ProxyHandler) -> anyhow::Result<()> {
    log::info!("starting stdio transport");
    let service = handler
        .serve(rmcp::transport::stdio())
        .await
        .inspect_err(|e| log::error!("stdio serve error: {e:?}"))?;
    service.waiting().await?;
    log::info!("stdio transport stopped");
    Ok(())
}
