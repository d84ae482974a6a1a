//! In-memory transport pair and a scriptable fixture debuggee: exercise
//! the session, engine, and adapter layers without spawning real OS
//! processes or real pipes.

use bytes::Bytes;
use pbdbg_frame::{Frame, FrameDecoder};
use pbdbg_transport::{mem_pair, Reader, TransportError, Writer};

const CMD_INIT: u32 = 0;
const CMD_EXE_MODE: u32 = 1;
const CMD_OUTPUT: u32 = 10;
const CMD_STOPPED: u32 = 11;
const CMD_ERROR: u32 = 12;
const CMD_EXITED: u32 = 13;

/// The two halves of an in-memory pipe pair: the engine's side, handed to
/// [`pbdbg_engine::Engine::new`], and a [`FixtureDebuggee`] driving the
/// other end under test control.
pub fn fixture_pair() -> ((Reader, Writer), FixtureDebuggee) {
    let (engine_side, debuggee_side) = mem_pair();
    (engine_side, FixtureDebuggee::new(debuggee_side.0, debuggee_side.1))
}

/// A test-only stand-in for a real PureBasic debug executable, driven
/// purely over an in-memory transport.
pub struct FixtureDebuggee {
    reader: Reader,
    writer: Writer,
    decoder: FrameDecoder,
}

impl FixtureDebuggee {
    fn new(reader: Reader, writer: Writer) -> Self {
        Self {
            reader,
            writer,
            decoder: FrameDecoder::new(pbdbg_frame::DEFAULT_MAX_FRAME_SIZE),
        }
    }

    pub async fn send_handshake(&mut self, version: u32, flags: u32) -> Result<(), TransportError> {
        self.writer.write_all(&pbdbg_frame::encode(CMD_INIT, 0, version, &[])).await?;
        self.writer.write_all(&pbdbg_frame::encode(CMD_EXE_MODE, flags, 0, &[])).await
    }

    pub async fn send_output(&mut self, text: &str) -> Result<(), TransportError> {
        self.writer.write_all(&pbdbg_frame::encode(CMD_OUTPUT, 0, 0, text.as_bytes())).await
    }

    pub async fn send_stopped(&mut self, file_index: u32, line0: u32) -> Result<(), TransportError> {
        self.writer.write_all(&pbdbg_frame::encode(CMD_STOPPED, file_index, line0, &[])).await
    }

    pub async fn send_error(&mut self, message: &str) -> Result<(), TransportError> {
        self.writer.write_all(&pbdbg_frame::encode(CMD_ERROR, 0, 0, message.as_bytes())).await
    }

    pub async fn send_exited(&mut self, exit_code: u32) -> Result<(), TransportError> {
        self.writer.write_all(&pbdbg_frame::encode(CMD_EXITED, exit_code, 0, &[])).await
    }

    /// Block until the engine has written one full frame, and return it.
    pub async fn recv_frame(&mut self) -> Result<Frame, TransportError> {
        loop {
            if let Ok(Some(frame)) = self.decoder.next_frame() {
                return Ok(frame);
            }
            let chunk: Bytes = self.reader.read_chunk().await?;
            self.decoder.feed(&chunk);
        }
    }

    /// Close both ends, as a real debuggee process exiting would.
    pub fn disconnect(&mut self) {
        self.reader.close();
        self.writer.close();
    }
}
