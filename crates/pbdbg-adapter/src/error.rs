//! `AdapterError`: the taxonomy-level error kind from `spec.md` §7. Every
//! lower crate's error converts into this via `From`, so the CLI has one
//! place to map an error onto an exit code.

#[derive(Debug)]
pub enum AdapterError {
    Configuration(String),
    LauncherFailed(String),
    TransportTimeout,
    TransportBroken,
    MalformedFrame(String),
    HandshakeFailed(String),
    InvalidState(String),
    OutOfRange(String),
    Cancelled,
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(m) => write!(f, "configuration error: {m}"),
            Self::LauncherFailed(m) => write!(f, "launcher failed: {m}"),
            Self::TransportTimeout => write!(f, "transport timed out"),
            Self::TransportBroken => write!(f, "transport broken"),
            Self::MalformedFrame(m) => write!(f, "malformed frame: {m}"),
            Self::HandshakeFailed(m) => write!(f, "handshake failed: {m}"),
            Self::InvalidState(m) => write!(f, "invalid state: {m}"),
            Self::OutOfRange(m) => write!(f, "out of range: {m}"),
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for AdapterError {}

impl From<pbdbg_launcher::LauncherError> for AdapterError {
    fn from(e: pbdbg_launcher::LauncherError) -> Self {
        Self::LauncherFailed(e.to_string())
    }
}

impl From<pbdbg_transport::TransportError> for AdapterError {
    fn from(e: pbdbg_transport::TransportError) -> Self {
        match e {
            pbdbg_transport::TransportError::Timeout => Self::TransportTimeout,
            other => {
                tracing::debug!(error = %other, "transport error mapped to TransportBroken");
                Self::TransportBroken
            }
        }
    }
}

impl From<pbdbg_engine::EngineError> for AdapterError {
    fn from(e: pbdbg_engine::EngineError) -> Self {
        match e {
            pbdbg_engine::EngineError::Transport(t) => t.into(),
            pbdbg_engine::EngineError::Frame(f) => Self::MalformedFrame(f.to_string()),
            pbdbg_engine::EngineError::Session(s) => Self::InvalidState(s.to_string()),
            pbdbg_engine::EngineError::OutOfRange(r) => Self::OutOfRange(r.to_string()),
            pbdbg_engine::EngineError::HandshakeFailed(reason) => Self::HandshakeFailed(reason),
            pbdbg_engine::EngineError::Cancelled => Self::Cancelled,
        }
    }
}
