/// Lifecycle state of the upstream session, guarded by the supervisor's
/// mutex. Transitions: STOPPED -> STARTING -> STARTED -> STOPPING -> STOPPED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl SessionState {
    /// A lifecycle method may proceed once the state lands on one of these;
    /// STARTING/STOPPING are transient and callers wait for them to resolve.
    pub fn is_stable(self) -> bool {
        matches!(self, SessionState::Started | SessionState::Stopped)
    }
}
