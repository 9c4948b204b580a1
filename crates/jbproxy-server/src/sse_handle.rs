//! Separates "signal shutdown" from "wait for shutdown to finish" for the
//! SSE front-end, so the caller can bound the wait with its own timeout
//! independent of the cancellation signal itself.

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub struct ServerHandle {
    cancel_token: CancellationToken,
    completion_rx: oneshot::Receiver<()>,
}

impl ServerHandle {
    pub fn new(cancel_token: CancellationToken, completion_rx: oneshot::Receiver<()>) -> Self {
        Self {
            cancel_token,
            completion_rx,
        }
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub async fn wait_for_completion(
        self,
        timeout: std::time::Duration,
    ) -> Result<(), tokio::time::error::Elapsed> {
        match tokio::time::timeout(timeout, self.completion_rx).await {
            Ok(Ok(())) => {
                log::debug!("SSE server shutdown completed via signal");
                Ok(())
            }
            Ok(Err(_recv_error)) => {
                log::warn!("shutdown completion channel closed without signal");
                Ok(())
            }
            Err(elapsed) => {
                log::warn!("SSE server shutdown timed out after {timeout:?}");
                Err(elapsed)
            }
        }
    }
}
