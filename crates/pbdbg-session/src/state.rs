//! State machine transition table, `spec.md` §4.3.

/// Authoritative session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Launching,
    Stopped,
    Running,
    Terminated,
}

/// Every event or action that can move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Launch,
    HandshakeComplete,
    HandshakeTimeoutOrTransportFailure,
    SendRun,
    SendStep,
    SendTerminate,
    RecvStopped,
    RecvBreakpointHit,
    RecvError,
    RecvExited,
    TransportClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// `event` is not legal while the session is in `state`.
    InvalidState {
        state: SessionState,
        event: Transition,
    },
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidState { state, event } => {
                write!(f, "{:?} is not legal while the session is {:?}", event, state)
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Compute the next state for `event` from `state`, or reject it.
///
/// This is the one place the transition table of `spec.md` §4.3 is
/// encoded; every other component calls through [`super::Session::
/// transition`] rather than matching on [`SessionState`] directly.
pub fn next_state(state: SessionState, event: Transition) -> Result<SessionState, SessionError> {
    use SessionState::*;
    use Transition::*;

    let next = match (state, event) {
        (Idle, Launch) => Launching,
        (Launching, HandshakeComplete) => Stopped,
        (Launching, HandshakeTimeoutOrTransportFailure) => Terminated,
        (Launching, RecvExited) => Terminated,
        (Stopped, SendRun) => Running,
        (Stopped, SendStep) => Running,
        (Stopped, RecvExited) => Terminated,
        (Stopped, RecvStopped) => Stopped,
        (Running, RecvStopped) => Stopped,
        (Running, RecvBreakpointHit) => Stopped,
        (Running, RecvError) => Stopped,
        (Running, RecvExited) => Terminated,
        (Running, TransportClosed) => Terminated,
        (Stopped, TransportClosed) => Terminated,
        (Launching, TransportClosed) => Terminated,
        // Terminate is legal in every non-terminal state (spec.md §4.4:
        // "Terminate is always legal... except when already terminated"),
        // which is broader than the idle/launching/stopped/running table
        // in spec.md §4.3 alone would suggest; see DESIGN.md.
        (Idle, SendTerminate) => Terminated,
        (Launching, SendTerminate) => Terminated,
        (Stopped, SendTerminate) => Terminated,
        (Running, SendTerminate) => Terminated,
        _ => return Err(SessionError::InvalidState { state, event }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminated_is_a_sink() {
        for event in [
            Transition::Launch,
            Transition::SendRun,
            Transition::SendStep,
            Transition::SendTerminate,
            Transition::RecvStopped,
            Transition::RecvExited,
        ] {
            assert!(next_state(SessionState::Terminated, event).is_err());
        }
    }

    #[test]
    fn stopped_accepts_idempotent_stopped_event() {
        assert_eq!(
            next_state(SessionState::Stopped, Transition::RecvStopped).unwrap(),
            SessionState::Stopped
        );
    }

    #[test]
    fn terminate_is_legal_everywhere_except_terminated() {
        for state in [
            SessionState::Idle,
            SessionState::Launching,
            SessionState::Stopped,
            SessionState::Running,
        ] {
            assert_eq!(
                next_state(state, Transition::SendTerminate).unwrap(),
                SessionState::Terminated
            );
        }
        assert!(next_state(SessionState::Terminated, Transition::SendTerminate).is_err());
    }
}
