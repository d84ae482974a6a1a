//! Session identity, state machine, and breakpoint table.
//!
//! A [`Session`] is owned exclusively by its protocol engine task (no other
//! task mutates it — see `spec.md` §5), so none of its fields need internal
//! locking; the encapsulation here exists to keep every state transition
//! going through one explicit method instead of ad hoc field writes.

mod breakpoints;
mod state;

pub use breakpoints::{Breakpoint, BreakpointTable, OutOfRange, MAX_FILE_INDEX, MAX_LINE};
pub use state::{SessionError, SessionState, Transition};

/// Last observed program counter: `(file_index, line)`, both 0-based as
/// carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramCounter {
    pub file_index: u32,
    pub line0: u32,
}

/// Identity and mutable state for one debug session.
pub struct Session {
    /// Generated hex pipe identifier, uppercase, >= 8 characters.
    pub pipe_id: String,
    /// Editor-assigned session id, opaque to the engine.
    pub editor_session_id: String,
    state: SessionState,
    last_pc: Option<ProgramCounter>,
    breakpoints: BreakpointTable,
}

impl Session {
    pub fn new(pipe_id: String, editor_session_id: String) -> Self {
        Self {
            pipe_id,
            editor_session_id,
            state: SessionState::Idle,
            last_pc: None,
            breakpoints: BreakpointTable::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_pc(&self) -> Option<ProgramCounter> {
        self.last_pc
    }

    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    pub fn breakpoints_mut(&mut self) -> &mut BreakpointTable {
        &mut self.breakpoints
    }

    /// Update the last-known program counter. Valid in any state; callers
    /// are expected to only do this from `Stopped`/`BreakpointHit` events.
    pub fn set_last_pc(&mut self, pc: ProgramCounter) {
        self.last_pc = Some(pc);
    }

    pub fn transition(&mut self, event: state::Transition) -> Result<SessionState, SessionError> {
        let next = state::next_state(self.state, event)?;
        tracing::debug!(session = %self.editor_session_id, from = ?self.state, to = ?next, ?event, "session state transition");
        self.state = next;
        Ok(next)
    }
}
