//! Windows named pipe transport backend.
//!
//! Two named pipes are created: `\\.\pipe\PureBasic_DebuggerPipeA_<ID>`
//! (`InPipe`, program -> engine) and `...PipeB_<ID>` (`OutPipe`, engine ->
//! program) (`spec.md` §6). The engine listens on both before the debuggee
//! is spawned; the debuggee connects to each after spawn. Two separate
//! pipes are used rather than one duplex pipe because a single named pipe
//! instance cannot be read and written concurrently from two different
//! connection roles without the deadlocks that motivate that split
//! elsewhere in the ecosystem.

use bytes::Bytes;
use interprocess::os::windows::named_pipe::{
    pipe_mode, tokio::RecvPipeStream, tokio::SendPipeStream, PipeListenerOptions,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::{ReaderBackend, TransportConfig, TransportError, WriterBackend};

const READ_CHUNK_SIZE: usize = 64 * 1024;

pub fn pipe_names(pipe_id: &str) -> (String, String) {
    (
        format!(r"\\.\pipe\PureBasic_DebuggerPipeA_{pipe_id}"),
        format!(r"\\.\pipe\PureBasic_DebuggerPipeB_{pipe_id}"),
    )
}

/// Create both named pipe server instances without waiting for a client.
/// This must run before the debuggee is spawned: the pipe names have to
/// exist at the paths the debuggee's environment variables point to.
pub fn prepare(pipe_id: &str) -> Result<NamedPipeListening, TransportError> {
    let (in_name, out_name) = pipe_names(pipe_id);

    let in_listener = PipeListenerOptions::new()
        .path(in_name.as_str())
        .create_tokio_duplex::<pipe_mode::Bytes>()
        .map_err(TransportError::Io)?;
    let out_listener = PipeListenerOptions::new()
        .path(out_name.as_str())
        .create_tokio_duplex::<pipe_mode::Bytes>()
        .map_err(TransportError::Io)?;

    Ok(NamedPipeListening {
        in_listener,
        out_listener,
    })
}

pub struct NamedPipeListening {
    in_listener: interprocess::os::windows::named_pipe::tokio::DuplexPipeListener<pipe_mode::Bytes>,
    out_listener: interprocess::os::windows::named_pipe::tokio::DuplexPipeListener<pipe_mode::Bytes>,
}

impl NamedPipeListening {
    /// Wait for the debuggee to connect to both pipes, up to
    /// `config.connect_deadline`.
    pub async fn accept(
        self,
        config: &TransportConfig,
    ) -> Result<(NamedPipeReader, NamedPipeWriter), TransportError> {
        let in_stream = timeout(config.connect_deadline, self.in_listener.accept())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(TransportError::Io)?;
        let out_stream = timeout(config.connect_deadline, self.out_listener.accept())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(TransportError::Io)?;

        let (in_recv, _in_send) = in_stream.split();
        let (_out_recv, out_send) = out_stream.split();

        Ok((
            NamedPipeReader { stream: in_recv },
            NamedPipeWriter { stream: out_send },
        ))
    }
}

pub struct NamedPipeReader {
    stream: RecvPipeStream<pipe_mode::Bytes>,
}

impl ReaderBackend for NamedPipeReader {
    async fn read_chunk(&mut self) -> Result<Bytes, TransportError> {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let n = self.stream.read(&mut buf).await.map_err(TransportError::Io)?;
        if n == 0 {
            return Err(TransportError::Broken);
        }
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }

    fn close(&mut self) {}
}

pub struct NamedPipeWriter {
    stream: SendPipeStream<pipe_mode::Bytes>,
}

impl WriterBackend for NamedPipeWriter {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes).await.map_err(TransportError::Io)
    }

    fn close(&mut self) {}
}
