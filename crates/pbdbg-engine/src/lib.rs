//! Protocol engine: owns the transport halves and the session, drives the
//! handshake, encodes outbound commands, and classifies inbound frames.

mod events;
mod handshake;
mod wire;

pub use events::{Event, ExeModeFlags};
pub use wire::StepKind;

use std::time::Duration;

use pbdbg_frame::{FrameDecoder, FrameError};
use pbdbg_session::{Breakpoint, Session, SessionError, Transition};
use pbdbg_transport::{Reader, TransportError, Writer};
use tokio_util::sync::CancellationToken;

/// Timing and size knobs for one engine instance (`spec.md` §4.1/§4.2/§4.4).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub handshake_deadline: Duration,
    pub teardown_deadline: Duration,
    pub max_frame_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            handshake_deadline: Duration::from_secs(10),
            teardown_deadline: Duration::from_secs(2),
            max_frame_size: pbdbg_frame::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    Transport(TransportError),
    Frame(FrameError),
    Session(SessionError),
    OutOfRange(pbdbg_session::OutOfRange),
    HandshakeFailed(String),
    /// The operation was interrupted by the engine's cancellation signal
    /// (`spec.md` §5) rather than completing or timing out.
    Cancelled,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Frame(e) => write!(f, "frame error: {e}"),
            Self::Session(e) => write!(f, "session error: {e}"),
            Self::OutOfRange(e) => write!(f, "breakpoint out of range: {e}"),
            Self::HandshakeFailed(reason) => write!(f, "handshake failed: {reason}"),
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Frame(e) => Some(e),
            Self::Session(e) => Some(e),
            Self::OutOfRange(e) => Some(e),
            Self::HandshakeFailed(_) => None,
            Self::Cancelled => None,
        }
    }
}

impl From<TransportError> for EngineError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<FrameError> for EngineError {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

impl From<SessionError> for EngineError {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

/// One live debugger session: transport halves, session state, and the
/// frame decoder for the inbound side.
pub struct Engine {
    reader: Reader,
    writer: Writer,
    decoder: FrameDecoder,
    session: Session,
    config: EngineConfig,
    unicode: bool,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(reader: Reader, writer: Writer, session: Session, config: EngineConfig) -> Self {
        let decoder = FrameDecoder::new(config.max_frame_size);
        Self {
            reader,
            writer,
            decoder,
            session,
            config,
            unicode: true,
            cancel: CancellationToken::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// A handle that cancels every suspension point currently or
    /// subsequently awaited on this engine (`spec.md` §5). All clones share
    /// one cancellation state: calling `.cancel()` on any of them cancels
    /// them all.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the handshake: `launching -> stopped` on success. Must be called
    /// exactly once, before any command is submitted.
    pub async fn handshake(&mut self) -> Result<(), EngineError> {
        self.session.transition(Transition::Launch)?;
        let cancel = self.cancel.clone();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            r = handshake::perform(&mut self.reader, &mut self.decoder, self.config.handshake_deadline) => r,
        };
        match outcome {
            Ok(result) => {
                self.unicode = result.flags.unicode;
                tracing::info!(version = result.version, flags = ?result.flags, "handshake complete");
                self.session.transition(Transition::HandshakeComplete)?;
                Ok(())
            }
            Err(err) => {
                self.session.transition(Transition::HandshakeTimeoutOrTransportFailure)?;
                Err(err)
            }
        }
    }

    /// `Run`: legal only from `stopped`. The state transition happens only
    /// after the wire write completes (`spec.md` §4.4). Cancelling before
    /// the write starts leaves the session state unchanged; cancelling
    /// while the write is in flight forces `terminated`, since the
    /// debuggee may already have seen it.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let cancel = self.cancel.clone();
        let encoded = wire::encode_run();
        let write = self.writer.write_all(&encoded);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.force_terminated();
                Err(EngineError::Cancelled)
            }
            r = write => {
                r?;
                self.session.transition(Transition::SendRun)?;
                Ok(())
            }
        }
    }

    /// Same cancellation contract as [`Engine::run`].
    pub async fn step(&mut self, kind: StepKind) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let cancel = self.cancel.clone();
        let encoded = wire::encode_step(kind);
        let write = self.writer.write_all(&encoded);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.force_terminated();
                Err(EngineError::Cancelled)
            }
            r = write => {
                r?;
                self.session.transition(Transition::SendStep)?;
                Ok(())
            }
        }
    }

    /// `Terminate`: legal in every state but `terminated`. Writes the
    /// command, then waits up to the teardown deadline for the debuggee's
    /// `Exited` acknowledgement (`spec.md` §4.4, §8 scenario 6). Whether the
    /// ack arrives, times out, or the transport breaks while waiting, the
    /// session always ends in `terminated` and the transport is closed.
    pub async fn terminate(&mut self) -> Result<(), EngineError> {
        self.writer.write_all(&wire::encode_terminate()).await?;

        let deadline = self.config.teardown_deadline;
        let cancel = self.cancel.clone();
        let wait = self.wait_for_exit();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = tokio::time::timeout(deadline, wait) => Some(r),
        };

        match outcome {
            Some(Ok(Ok(()))) => {
                // `wait_for_exit` already drove the session to `terminated`
                // via the `Exited` event.
            }
            Some(Ok(Err(e))) => {
                tracing::warn!(error = %e, "transport error while waiting for terminate acknowledgement");
                self.force_terminated();
            }
            Some(Err(_)) | None => {
                tracing::warn!("terminate not acknowledged within teardown deadline, forcing shutdown");
                self.force_terminated();
            }
        }

        self.reader.close();
        self.writer.close();
        Ok(())
    }

    async fn wait_for_exit(&mut self) -> Result<(), EngineError> {
        loop {
            let event = self.next_event_inner().await?;
            if matches!(event, Event::Exited { .. }) {
                return Ok(());
            }
        }
    }

    /// `terminated` is a sink, so a failed transition here means the
    /// session already reached it by another path; that's fine.
    fn force_terminated(&mut self) {
        let _ = self.session.transition(Transition::SendTerminate);
    }

    /// Enable or disable a breakpoint. A no-op update (already in the
    /// requested state) produces no wire traffic.
    pub async fn set_breakpoint(&mut self, file_index: u16, line: u32, enabled: bool) -> Result<(), EngineError> {
        let bp = Breakpoint::new(file_index, line).map_err(EngineError::OutOfRange)?;
        let changed = if enabled {
            self.session.breakpoints_mut().insert(bp)
        } else {
            self.session.breakpoints_mut().remove(&bp)
        };
        if !changed {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let cancel = self.cancel.clone();
        let encoded = wire::encode_breakpoint_edit(bp, enabled);
        let write = self.writer.write_all(&encoded);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.force_terminated();
                Err(EngineError::Cancelled)
            }
            r = write => r.map_err(EngineError::from),
        }
    }

    /// Read and classify the next inbound event, applying whatever session
    /// transition it implies. Blocks until a full frame is available, or
    /// until cancelled.
    pub async fn next_event(&mut self) -> Result<Event, EngineError> {
        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            r = self.next_event_inner() => r,
        }
    }

    async fn next_event_inner(&mut self) -> Result<Event, EngineError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                let event = events::classify(&frame, self.unicode);
                self.apply(&event)?;
                return Ok(event);
            }
            let chunk = self.reader.read_chunk().await?;
            self.decoder.feed(&chunk);
        }
    }

    fn apply(&mut self, event: &Event) -> Result<(), EngineError> {
        match event {
            Event::Stopped { .. } => {
                self.session.transition(Transition::RecvStopped)?;
            }
            Event::Error { .. } => {
                self.session.transition(Transition::RecvError)?;
            }
            Event::Exited { .. } => {
                self.session.transition(Transition::RecvExited)?;
            }
            Event::Init { .. } | Event::ExeMode(_) | Event::Output { .. } | Event::Unknown { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbdbg_transport::mem_pair;

    fn frame_bytes(cmd: u32, v1: u32, v2: u32, data: &[u8]) -> bytes::Bytes {
        pbdbg_frame::encode(cmd, v1, v2, data)
    }

    #[tokio::test]
    async fn handshake_then_run_then_stopped() {
        let ((engine_reader, engine_writer), (mut debuggee_reader, mut debuggee_writer)) = mem_pair();
        let session = Session::new("DEADBEEF".into(), "editor-1".into());
        let mut engine = Engine::new(engine_reader, engine_writer, session, EngineConfig::default());

        debuggee_writer
            .write_all(&frame_bytes(wire::CMD_INIT, 0, 1, &[]))
            .await
            .unwrap();
        debuggee_writer
            .write_all(&frame_bytes(wire::CMD_EXE_MODE, 0b0011, 0, &[]))
            .await
            .unwrap();

        engine.handshake().await.unwrap();
        assert_eq!(engine.session().state(), pbdbg_session::SessionState::Stopped);

        engine.run().await.unwrap();
        let sent = debuggee_reader.read_chunk().await.unwrap();
        assert_eq!(sent.as_ref(), frame_bytes(wire::CMD_RUN, 0, 0, &[]).as_ref());
        assert_eq!(engine.session().state(), pbdbg_session::SessionState::Running);

        debuggee_writer
            .write_all(&frame_bytes(wire::CMD_STOPPED, 0, 8, &[]))
            .await
            .unwrap();
        let event = engine.next_event().await.unwrap();
        assert_eq!(event, Event::Stopped { file_index: 0, line0: 8 });
        assert_eq!(engine.session().state(), pbdbg_session::SessionState::Stopped);
    }

    #[tokio::test]
    async fn breakpoint_set_twice_writes_once() {
        let ((engine_reader, engine_writer), (mut debuggee_reader, _debuggee_writer)) = mem_pair();
        let session = Session::new("DEADBEEF".into(), "editor-1".into());
        let mut engine = Engine::new(engine_reader, engine_writer, session, EngineConfig::default());

        engine.set_breakpoint(0, 9, true).await.unwrap();
        let sent = debuggee_reader.read_chunk().await.unwrap();
        assert_eq!(sent.as_ref(), frame_bytes(wire::CMD_BREAKPOINT_EDIT, 1, 0x0000_0008, &[]).as_ref());

        engine.set_breakpoint(0, 9, true).await.unwrap();
        let race = tokio::time::timeout(Duration::from_millis(50), debuggee_reader.read_chunk()).await;
        assert!(race.is_err(), "second identical set must not write to the wire");
    }

    #[tokio::test]
    async fn out_of_range_breakpoint_is_rejected_without_wire_write() {
        let ((engine_reader, engine_writer), (mut debuggee_reader, _debuggee_writer)) = mem_pair();
        let session = Session::new("DEADBEEF".into(), "editor-1".into());
        let mut engine = Engine::new(engine_reader, engine_writer, session, EngineConfig::default());

        let err = engine.set_breakpoint(0, 0, true).await.unwrap_err();
        assert!(matches!(err, EngineError::OutOfRange(_)));
        let race = tokio::time::timeout(Duration::from_millis(50), debuggee_reader.read_chunk()).await;
        assert!(race.is_err());
    }

    #[tokio::test]
    async fn handshake_times_out_when_debuggee_never_opens_pipes() {
        let ((engine_reader, engine_writer), (_debuggee_reader, _debuggee_writer)) = mem_pair();
        let session = Session::new("DEADBEEF".into(), "editor-1".into());
        let mut config = EngineConfig::default();
        config.handshake_deadline = Duration::from_millis(50);
        let mut engine = Engine::new(engine_reader, engine_writer, session, config);

        let err = engine.handshake().await.unwrap_err();
        assert!(matches!(err, EngineError::HandshakeFailed(_)));
        assert_eq!(engine.session().state(), pbdbg_session::SessionState::Terminated);
    }

    async fn handshaken_engine() -> (Engine, Reader, Writer) {
        let ((engine_reader, engine_writer), (mut debuggee_reader, mut debuggee_writer)) = mem_pair();
        let session = Session::new("DEADBEEF".into(), "editor-1".into());
        let mut engine = Engine::new(engine_reader, engine_writer, session, EngineConfig::default());

        debuggee_writer.write_all(&frame_bytes(wire::CMD_INIT, 0, 1, &[])).await.unwrap();
        debuggee_writer
            .write_all(&frame_bytes(wire::CMD_EXE_MODE, 0b0011, 0, &[]))
            .await
            .unwrap();
        engine.handshake().await.unwrap();

        (engine, debuggee_reader, debuggee_writer)
    }

    /// spec.md §8 scenario 6: terminate waits for, and consumes, the
    /// debuggee's `Exited` acknowledgement before the session reaches
    /// `terminated`.
    #[tokio::test]
    async fn terminate_waits_for_and_consumes_exit_ack() {
        let (mut engine, mut debuggee_reader, mut debuggee_writer) = handshaken_engine().await;

        let terminate = tokio::spawn(async move {
            engine.terminate().await.unwrap();
            engine
        });

        let sent = debuggee_reader.read_chunk().await.unwrap();
        assert_eq!(sent.as_ref(), frame_bytes(wire::CMD_TERMINATE, 0, 0, &[]).as_ref());

        debuggee_writer.write_all(&frame_bytes(wire::CMD_EXITED, 0, 0, &[])).await.unwrap();

        let engine = tokio::time::timeout(Duration::from_secs(1), terminate)
            .await
            .expect("terminate should return once the ack arrives")
            .unwrap();
        assert_eq!(engine.session().state(), pbdbg_session::SessionState::Terminated);
    }

    #[tokio::test]
    async fn terminate_forces_terminated_after_teardown_deadline() {
        let (mut engine, mut debuggee_reader, _debuggee_writer) = handshaken_engine().await;
        engine.config.teardown_deadline = Duration::from_millis(50);

        engine.terminate().await.unwrap();
        let sent = debuggee_reader.read_chunk().await.unwrap();
        assert_eq!(sent.as_ref(), frame_bytes(wire::CMD_TERMINATE, 0, 0, &[]).as_ref());
        assert_eq!(engine.session().state(), pbdbg_session::SessionState::Terminated);
    }

    #[tokio::test]
    async fn run_cancelled_before_write_leaves_state_unchanged() {
        let (mut engine, _debuggee_reader, _debuggee_writer) = handshaken_engine().await;
        assert_eq!(engine.session().state(), pbdbg_session::SessionState::Stopped);

        engine.cancellation_token().cancel();
        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(engine.session().state(), pbdbg_session::SessionState::Stopped);
    }
}
