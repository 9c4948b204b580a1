use std::sync::Arc;
use std::time::Duration;

use rmcp::model::{CallToolResult, Tool};
use serde_json::Map;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use jbproxy_config::JetbrainsMcpServer;
use jbproxy_paths::{PathStyle, UnknownPathStyle};
use jbproxy_retry::{AttemptHookArgs, RetryConfig};

use crate::dispatcher;
use crate::error::ToolError;
use crate::session::{self, SessionConfig, UpstreamSession};
use crate::state::SessionState;

/// Owns the long-lived upstream session: connects, tears down, restarts, and
/// dispatches `list_tools`/`call_tool` through the allow-list and per-tool
/// path rewriters. At most one lifecycle transition (start/stop/restart) is
/// in flight at a time.
pub struct Supervisor {
    session_config: SessionConfig,
    retry: RetryConfig,
    start_timeout: Duration,
    stop_timeout: Duration,
    client_style: PathStyle,
    server_style: PathStyle,

    state: Mutex<SessionState>,
    notify: Notify,
    session: Mutex<Option<UpstreamSession>>,
}

impl Supervisor {
    pub fn new(config: &JetbrainsMcpServer) -> Result<Self, UnknownPathStyle> {
        let client_style: PathStyle = config.client_path_type.parse()?;
        let server_style: PathStyle = config.server_path_type.parse()?;

        Ok(Self {
            session_config: SessionConfig {
                url: config.url.clone(),
                headers: config.headers.clone(),
            },
            retry: RetryConfig {
                max_attempts: config.max_attempts,
                initial_backoff: config.initial_backoff,
                max_backoff: config.max_backoff,
                backoff_multiplier: config.backoff_multiplier,
            },
            start_timeout: config.start_timeout,
            stop_timeout: config.stop_timeout,
            client_style,
            server_style,
            state: Mutex::new(SessionState::Stopped),
            notify: Notify::new(),
            session: Mutex::new(None),
        })
    }

    /// Waits (bounded by `deadline`) until the state is stable, returning the
    /// stable state observed. Never returns a transient state.
    async fn wait_stable(&self, deadline: Instant) -> Result<SessionState, ToolError> {
        loop {
            {
                let state = self.state.lock().await;
                if state.is_stable() {
                    return Ok(*state);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ToolError::timeout(
                    "timed out waiting for upstream session lifecycle to settle",
                ));
            }
            let remaining = deadline - now;
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }

    pub async fn start(&self) -> Result<(), ToolError> {
        self.start_with_deadline(Instant::now() + self.start_timeout)
            .await
    }

    async fn start_with_deadline(&self, deadline: Instant) -> Result<(), ToolError> {
        let stable = self.wait_stable(deadline).await?;
        if stable == SessionState::Started {
            return Ok(());
        }

        {
            let mut state = self.state.lock().await;
            *state = SessionState::Starting;
        }
        self.notify.notify_waiters();

        let result = session::open(&self.session_config).await;

        match result {
            Ok(opened) => {
                *self.session.lock().await = Some(opened);
                let mut state = self.state.lock().await;
                *state = SessionState::Started;
                drop(state);
                self.notify.notify_waiters();
                Ok(())
            }
            Err(err) => {
                // Nothing was stored on failure; `session::open` is atomic.
                let mut state = self.state.lock().await;
                *state = SessionState::Stopped;
                drop(state);
                self.notify.notify_waiters();
                Err(err)
            }
        }
    }

    /// Ensures the session is started, bounded by `deadline`.
    async fn ensure_started(&self, deadline: Instant) -> Result<(), ToolError> {
        let stable = self.wait_stable(deadline).await?;
        if stable == SessionState::Started {
            return Ok(());
        }
        self.start_with_deadline(deadline).await
    }

    /// Never raises: logs and swallows every failure along the way.
    pub async fn stop(&self) {
        self.stop_with_deadline(Instant::now() + self.stop_timeout)
            .await
    }

    async fn stop_with_deadline(&self, deadline: Instant) {
        let stable = match self.wait_stable(deadline).await {
            Ok(s) => s,
            Err(_) => {
                log::warn!("timed out waiting for upstream session lifecycle to settle before stop()");
                return;
            }
        };

        if stable == SessionState::Stopped {
            return;
        }
        if stable != SessionState::Started {
            log::warn!("stop() called while session is not started (state is {stable:?})");
            return;
        }

        {
            let mut state = self.state.lock().await;
            *state = SessionState::Stopping;
        }
        self.notify.notify_waiters();

        // rmcp's `RunningService::cancel` tears down the session and its
        // transport together, unlike the two-phase session-then-transport
        // close this proxy's upstream protocol SDK otherwise requires; one
        // bounded close replaces that split.
        let taken = self.session.lock().await.take();
        if let Some(opened) = taken {
            let floor = Duration::from_secs(1);
            let remaining = deadline.saturating_duration_since(Instant::now()).max(floor);
            match tokio::time::timeout(remaining, opened.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("failed to close upstream session: {e}"),
                Err(_) => log::warn!("closing upstream session timed out"),
            }
        }

        let mut state = self.state.lock().await;
        *state = SessionState::Stopped;
        drop(state);
        self.notify.notify_waiters();
    }

    pub async fn restart(&self) -> Result<(), ToolError> {
        let deadline = Instant::now() + self.start_timeout + self.stop_timeout;
        self.restart_with_deadline(deadline).await
    }

    async fn restart_with_deadline(&self, deadline: Instant) -> Result<(), ToolError> {
        let stop_deadline = Instant::now() + self.stop_timeout.min(deadline.saturating_duration_since(Instant::now()));
        self.stop_with_deadline(stop_deadline).await;
        self.start_with_deadline(deadline).await
    }

    fn is_retryable(error: &ToolError) -> bool {
        !error.is_timeout()
    }

    /// The shared attempt hook: on a retryable failure that is not itself a
    /// timeout, restart the session before the next attempt. Restart
    /// failures are logged, not propagated — the next attempt will simply
    /// fail again and eventually exhaust.
    async fn restart_on_error(&self, args: AttemptHookArgs<ToolError>) {
        if args.error.is_timeout() {
            log::debug!("attempt {} failed with a timeout, not restarting", args.attempt);
            return;
        }
        log::warn!(
            "attempt {} failed ({}), restarting upstream session",
            args.attempt,
            args.error
        );
        let remaining = args.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        if let Err(e) = self.restart_with_deadline(Instant::now() + remaining).await {
            log::warn!("restart after failed attempt did not complete: {e}");
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        let deadline = Instant::now() + self.start_timeout;
        self.ensure_started(deadline).await?;

        let result = jbproxy_retry::get(
            deadline,
            &self.retry,
            Self::is_retryable,
            Some(|args: AttemptHookArgs<ToolError>| self.restart_on_error(args)),
            || async { self.do_list_tools(deadline).await },
        )
        .await;

        match result {
            Ok(tools) => Ok(tools),
            Err(e) => {
                self.stop().await;
                Err(e.into())
            }
        }
    }

    async fn do_list_tools(&self, deadline: Instant) -> Result<Vec<Tool>, ToolError> {
        let session = self.session.lock().await;
        let Some(session) = session.as_ref() else {
            return Err(ToolError::server("upstream session is not connected"));
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let tools = match tokio::time::timeout(remaining, session.list_tools()).await {
            Ok(Ok(tools)) => tools,
            Ok(Err(e)) => return Err(ToolError::server(e.message)),
            Err(_) => return Err(ToolError::timeout("list_tools timed out")),
        };

        let mut filtered: Vec<Tool> = tools
            .into_iter()
            .filter(|tool| {
                let allowed = dispatcher::is_allowed(tool.name.as_ref());
                if !allowed {
                    log::warn!("discarding unsupported tool from upstream catalogue: {}", tool.name);
                }
                allowed
            })
            .collect();
        filtered.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(filtered)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, serde_json::Value>,
    ) -> Result<CallToolResult, ToolError> {
        let deadline = Instant::now() + self.start_timeout;
        self.ensure_started(deadline).await?;

        let Some(spec) = dispatcher::find(name) else {
            return self.call_generic(name, arguments, deadline).await;
        };

        dispatcher::validate_required_args(spec, &arguments)?;

        let mut request_args = arguments;
        dispatcher::rewrite_request_args(spec, &mut request_args, self.client_style, self.server_style);

        let result = jbproxy_retry::get(
            deadline,
            &self.retry,
            Self::is_retryable,
            Some(|args: AttemptHookArgs<ToolError>| self.restart_on_error(args)),
            || async { self.do_call_tool(deadline, name, request_args.clone()).await },
        )
        .await;

        match result {
            Ok(mut call_result) => {
                dispatcher::rewrite_response_content(spec, &mut call_result, self.client_style, self.server_style);
                Ok(call_result)
            }
            Err(e) => {
                let error: ToolError = e.into();
                self.stop().await;
                Err(error)
            }
        }
    }

    async fn call_generic(
        &self,
        name: &str,
        arguments: Map<String, serde_json::Value>,
        deadline: Instant,
    ) -> Result<CallToolResult, ToolError> {
        let result = jbproxy_retry::get(
            deadline,
            &self.retry,
            Self::is_retryable,
            Some(|args: AttemptHookArgs<ToolError>| self.restart_on_error(args)),
            || async { self.do_call_tool(deadline, name, arguments.clone()).await },
        )
        .await;

        match result {
            Ok(call_result) => Ok(call_result),
            Err(e) => {
                let error: ToolError = e.into();
                self.stop().await;
                Err(error)
            }
        }
    }

    async fn do_call_tool(
        &self,
        deadline: Instant,
        name: &str,
        arguments: Map<String, serde_json::Value>,
    ) -> Result<CallToolResult, ToolError> {
        let session = self.session.lock().await;
        let Some(session) = session.as_ref() else {
            return Err(ToolError::server("upstream session is not connected"));
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, session.call_tool(name, Some(arguments))).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(ToolError::server(e.message)),
            Err(_) => Err(ToolError::timeout(format!("call_tool '{name}' timed out"))),
        }
    }
}

pub type SharedSupervisor = Arc<Supervisor>;
