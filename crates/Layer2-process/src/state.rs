//! Process state machine

/// Observable state of a started process
///
/// A process that fails to spawn never gets a handle, so handles only ever
/// see `Running` and `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Child is alive or its exit has not been reported yet
    Running,

    /// `end` message emitted; nothing more will be sent for this process
    Ended,
}

impl ProcessState {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Ended)
    }
}
