//! Handshake: read frames until `Init` then `ExeMode` have both arrived, or
//! the deadline expires (`spec.md` §4.4).

use std::time::{Duration, Instant};

use pbdbg_frame::FrameDecoder;
use pbdbg_transport::Reader;

use crate::events::{classify, Event, ExeModeFlags};
use crate::EngineError;

pub struct HandshakeResult {
    pub version: u32,
    pub flags: ExeModeFlags,
}

/// Reads frames from `reader` until `Init` (first) and `ExeMode` (second)
/// have both been seen, or `deadline` elapses. Any other frame observed
/// mid-handshake is logged and ignored — the handshake only cares about
/// the two frames that establish session parameters.
pub async fn perform(
    reader: &mut Reader,
    decoder: &mut FrameDecoder,
    deadline: Duration,
) -> Result<HandshakeResult, EngineError> {
    let started = Instant::now();
    let mut version = None;

    loop {
        for frame in decoder.drain().map_err(EngineError::Frame)? {
            match classify(&frame, false) {
                Event::Init { version: v } if version.is_none() => {
                    version = Some(v);
                }
                Event::ExeMode(flags) if version.is_some() => {
                    return Ok(HandshakeResult {
                        version: version.unwrap(),
                        flags,
                    });
                }
                Event::Exited { exit_code } => {
                    return Err(EngineError::HandshakeFailed(format!(
                        "debuggee exited during handshake with code {exit_code}"
                    )));
                }
                other => {
                    tracing::warn!(?other, "unexpected frame during handshake, ignored");
                }
            }
        }

        let remaining = deadline
            .checked_sub(started.elapsed())
            .ok_or_else(|| EngineError::HandshakeFailed("handshake deadline exceeded".into()))?;

        let chunk = tokio::time::timeout(remaining, reader.read_chunk())
            .await
            .map_err(|_| EngineError::HandshakeFailed("handshake deadline exceeded".into()))?
            .map_err(EngineError::Transport)?;
        decoder.feed(&chunk);
    }
}
