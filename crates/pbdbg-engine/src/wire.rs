//! Command integers and frame encoders (`spec.md` §6). Wire-stable; never
//! renumber.

use bytes::Bytes;
use pbdbg_session::Breakpoint;

pub const CMD_INIT: u32 = 0;
pub const CMD_EXE_MODE: u32 = 1;
pub const CMD_RUN: u32 = 2;
pub const CMD_BREAKPOINT_EDIT: u32 = 3;
pub const CMD_STEP_INTO: u32 = 4;
pub const CMD_STEP_OVER: u32 = 5;
pub const CMD_STEP_OUT: u32 = 6;
pub const CMD_TERMINATE: u32 = 7;
pub const CMD_OUTPUT: u32 = 10;
pub const CMD_STOPPED: u32 = 11;
pub const CMD_ERROR: u32 = 12;
pub const CMD_EXITED: u32 = 13;

const BREAKPOINT_ADD: u32 = 1;
const BREAKPOINT_REMOVE: u32 = 0;

/// `Step{Into,Over,Out}`, each a distinct wire command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Into,
    Over,
    Out,
}

impl StepKind {
    fn command(self) -> u32 {
        match self {
            Self::Into => CMD_STEP_INTO,
            Self::Over => CMD_STEP_OVER,
            Self::Out => CMD_STEP_OUT,
        }
    }
}

pub fn encode_run() -> Bytes {
    pbdbg_frame::encode(CMD_RUN, 0, 0, &[])
}

pub fn encode_step(kind: StepKind) -> Bytes {
    pbdbg_frame::encode(kind.command(), 0, 0, &[])
}

pub fn encode_terminate() -> Bytes {
    pbdbg_frame::encode(CMD_TERMINATE, 0, 0, &[])
}

/// `v1 = Add(1)/Remove(0)`, `v2 = (file_index << 20) | line_zero_based`.
pub fn encode_breakpoint_edit(bp: Breakpoint, add: bool) -> Bytes {
    let v1 = if add { BREAKPOINT_ADD } else { BREAKPOINT_REMOVE };
    let v2 = ((bp.file_index as u32) << 20) | bp.line0();
    pbdbg_frame::encode(CMD_BREAKPOINT_EDIT, v1, v2, &[])
}
