use std::fmt;

/// Terminal (or intermediate) result of a session phase.
///
/// Workers report one of these to the pool when they exit. Only `Failed`
/// marks the server run as unsuccessful; every other variant is an expected
/// way for a conversation with a client to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOutcome {
    Succeeded,
    Failed,
    TimedOut,
    PeerDisconnectedAbruptly,
    GracefullyDisconnected,
    PlayerLeftSession,
    ConnectionDenied,
    BackToMenu,
    ShuttingDown,
}

impl SessionOutcome {
    pub fn is_failure(self) -> bool {
        matches!(self, SessionOutcome::Failed)
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionOutcome::Succeeded => "succeeded",
            SessionOutcome::Failed => "failed",
            SessionOutcome::TimedOut => "timed out",
            SessionOutcome::PeerDisconnectedAbruptly => "peer disconnected abruptly",
            SessionOutcome::GracefullyDisconnected => "gracefully disconnected",
            SessionOutcome::PlayerLeftSession => "player left the session",
            SessionOutcome::ConnectionDenied => "connection denied",
            SessionOutcome::BackToMenu => "back to menu",
            SessionOutcome::ShuttingDown => "shutting down",
        };
        f.write_str(text)
    }
}
