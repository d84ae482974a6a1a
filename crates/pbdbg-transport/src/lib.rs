//! Duplex transport between the engine and a debug-instrumented PureBasic
//! executable.
//!
//! A session talks to its debuggee over two unidirectional named channels,
//! `InPipe` (program -> engine) and `OutPipe` (engine -> program). This
//! crate never looks at frame structure: it moves raw byte chunks, and the
//! protocol engine layers [`pbdbg_frame`] on top.

use std::time::Duration;

use bytes::Bytes;
use enum_dispatch::enum_dispatch;

mod mem;
#[cfg(unix)]
mod posix_fifo;
#[cfg(windows)]
mod windows_named_pipe;

pub use mem::mem_pair;

/// Timing and size knobs for a transport connection attempt.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// How long to wait for the debuggee to connect both pipe ends.
    pub connect_deadline: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_deadline: Duration::from_secs(10),
        }
    }
}

/// Errors raised by a transport backend.
#[derive(Debug)]
pub enum TransportError {
    /// The peer disconnected unexpectedly.
    Broken,
    /// The peer did not connect within the configured deadline.
    Timeout,
    /// The transport was explicitly closed.
    Closed,
    /// Underlying OS I/O failure.
    Io(std::io::Error),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Broken => write!(f, "transport broken: peer disconnected"),
            Self::Timeout => write!(f, "transport timed out waiting for peer"),
            Self::Closed => write!(f, "transport is closed"),
            Self::Io(e) => write!(f, "transport I/O error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[enum_dispatch]
pub(crate) trait ReaderBackend: Send {
    async fn read_chunk(&mut self) -> Result<Bytes, TransportError>;
    fn close(&mut self);
}

#[enum_dispatch]
pub(crate) trait WriterBackend: Send {
    /// Deliver `bytes` atomically; short writes are retried internally.
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    fn close(&mut self);
}

/// The engine's read half of a transport (receives bytes from `InPipe`).
#[enum_dispatch(ReaderBackend)]
pub enum Reader {
    Mem(mem::MemReader),
    #[cfg(unix)]
    Fifo(posix_fifo::FifoReader),
    #[cfg(windows)]
    NamedPipe(windows_named_pipe::NamedPipeReader),
}

/// The engine's write half of a transport (sends bytes to `OutPipe`).
#[enum_dispatch(WriterBackend)]
pub enum Writer {
    Mem(mem::MemWriter),
    #[cfg(unix)]
    Fifo(posix_fifo::FifoWriter),
    #[cfg(windows)]
    NamedPipe(windows_named_pipe::NamedPipeWriter),
}

impl Reader {
    pub async fn read_chunk(&mut self) -> Result<Bytes, TransportError> {
        ReaderBackend::read_chunk(self).await
    }

    pub fn close(&mut self) {
        ReaderBackend::close(self)
    }
}

impl Writer {
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        WriterBackend::write_all(self, bytes).await
    }

    pub fn close(&mut self) {
        WriterBackend::close(self)
    }
}

/// A pipe pair that has been created (nodes exist, or pipe server
/// instances are listening) but not yet connected to by a debuggee.
///
/// Split into `prepare()` + `accept()` because the caller must create the
/// pipes *before* spawning the debuggee (the child's environment points at
/// these names) but can only wait for the other end to connect *after*
/// spawning it.
pub enum Listening {
    #[cfg(unix)]
    Fifo(posix_fifo::FifoListening),
    #[cfg(windows)]
    NamedPipe(windows_named_pipe::NamedPipeListening),
}

impl Listening {
    pub async fn accept(self, config: &TransportConfig) -> Result<(Reader, Writer), TransportError> {
        match self {
            #[cfg(unix)]
            Self::Fifo(l) => {
                let (r, w) = l.accept(config).await?;
                Ok((Reader::Fifo(r), Writer::Fifo(w)))
            }
            #[cfg(windows)]
            Self::NamedPipe(l) => {
                let (r, w) = l.accept(config).await?;
                Ok((Reader::NamedPipe(r), Writer::NamedPipe(w)))
            }
        }
    }
}

/// Create the platform-native pipe pair for `pipe_id`. Must be called
/// before the debuggee is spawned.
#[cfg(windows)]
pub fn prepare(pipe_id: &str) -> Result<Listening, TransportError> {
    Ok(Listening::NamedPipe(windows_named_pipe::prepare(pipe_id)?))
}

/// Create the platform-native pipe pair for `pipe_id`. Must be called
/// before the debuggee is spawned.
#[cfg(unix)]
pub fn prepare(pipe_id: &str) -> Result<Listening, TransportError> {
    Ok(Listening::Fifo(posix_fifo::prepare(pipe_id)?))
}

/// Windows named pipe paths for `pipe_id`, as documented on the wire
/// protocol (`spec.md` §6).
#[cfg(windows)]
pub fn windows_pipe_names(pipe_id: &str) -> (String, String) {
    windows_named_pipe::pipe_names(pipe_id)
}

/// POSIX FIFO node paths for `pipe_id`, as documented on the wire protocol
/// (`spec.md` §6).
#[cfg(unix)]
pub fn posix_fifo_paths(pipe_id: &str) -> (std::path::PathBuf, std::path::PathBuf) {
    posix_fifo::fifo_paths(pipe_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mem_pair_round_trips_bytes() {
        let ((mut r_a, mut w_a), (mut r_b, mut w_b)) = mem_pair();

        w_a.write_all(b"hello").await.unwrap();
        let got = r_b.read_chunk().await.unwrap();
        assert_eq!(got.as_ref(), b"hello");

        w_b.write_all(b"world").await.unwrap();
        let got = r_a.read_chunk().await.unwrap();
        assert_eq!(got.as_ref(), b"world");
    }

    #[tokio::test]
    async fn closing_writer_breaks_reader() {
        let ((mut r_a, _w_a), (_r_b, mut w_b)) = mem_pair();
        w_b.close();
        let err = r_a.read_chunk().await.unwrap_err();
        assert!(matches!(err, TransportError::Broken | TransportError::Closed));
    }
}
