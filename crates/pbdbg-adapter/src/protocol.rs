//! The editor-facing command vocabulary (`spec.md` §6), as `serde`-encoded
//! newline-delimited JSON values.

use serde::{Deserialize, Serialize};

pub type CorrelationId = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterRequest {
    Launch {
        correlation_id: CorrelationId,
        exe_path: String,
        #[serde(default)]
        args: Vec<String>,
        /// Left unset, each of these falls back to `spec.md` §6's default
        /// (`1;1;0;0`) rather than to `false` — see
        /// `DebuggeeOptions::with_overrides`.
        #[serde(default)]
        unicode: Option<bool>,
        #[serde(default)]
        stop_on_entry: Option<bool>,
        #[serde(default)]
        stop_on_end: Option<bool>,
        #[serde(default)]
        big_endian: Option<bool>,
    },
    SetBreakpoint {
        correlation_id: CorrelationId,
        file: u16,
        line: u32,
        enabled: bool,
    },
    Run {
        correlation_id: CorrelationId,
    },
    StepInto {
        correlation_id: CorrelationId,
    },
    StepOver {
        correlation_id: CorrelationId,
    },
    StepOut {
        correlation_id: CorrelationId,
    },
    Terminate {
        correlation_id: CorrelationId,
    },
}

impl AdapterRequest {
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            Self::Launch { correlation_id, .. }
            | Self::SetBreakpoint { correlation_id, .. }
            | Self::Run { correlation_id }
            | Self::StepInto { correlation_id }
            | Self::StepOver { correlation_id }
            | Self::StepOut { correlation_id }
            | Self::Terminate { correlation_id } => *correlation_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterEvent {
    /// Response to a request that completed successfully.
    Ack { correlation_id: CorrelationId },
    /// Response to a request that failed.
    Error {
        correlation_id: Option<CorrelationId>,
        message: String,
    },
    Initialized,
    Stopped { reason: String, file: u32, line: u32 },
    Output { channel: String, text: String },
    Exited { code: u32 },
}
