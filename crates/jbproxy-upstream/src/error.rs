/// A client-visible failure, carrying the protocol error code the spec
/// assigns to each kind: 400 (argument), 404 (not found), 408 (timeout), 500
/// (server error).
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct ToolError {
    pub code: u16,
    pub message: String,
}

impl ToolError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(408, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }

    /// A timeout is never retried-then-restarted: it either came from our own
    /// deadline or from an upstream that already told us it gave up.
    pub fn is_timeout(&self) -> bool {
        self.code == 408
    }
}

impl From<jbproxy_retry::RetryError<ToolError>> for ToolError {
    fn from(err: jbproxy_retry::RetryError<ToolError>) -> Self {
        match err {
            jbproxy_retry::RetryError::Timeout => ToolError::timeout("operation deadline exceeded"),
            jbproxy_retry::RetryError::NonRetryable(e) => e,
            jbproxy_retry::RetryError::Exhausted { last, .. } => last,
        }
    }
}
