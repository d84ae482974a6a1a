//! POSIX FIFO transport backend.
//!
//! Two FIFO nodes are created under the system temp directory, named
//! `pb-debug-in-<ID>` and `pb-debug-out-<ID>` (`spec.md` §6). The engine
//! opens the in-FIFO read-only non-blocking first, then the out-FIFO
//! write-only non-blocking, retrying with bounded backoff until the
//! debuggee opens the matching end — opening the write end of a FIFO with
//! no reader present fails with `ENXIO` until one shows up.

use std::os::fd::{AsFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bytes::Bytes;
use rustix::fs::{mkfifoat, open, Mode, OFlags, CWD};
use rustix::io::Errno;
use tokio::io::unix::AsyncFd;

use crate::{ReaderBackend, TransportConfig, TransportError, WriterBackend};

const READ_CHUNK_SIZE: usize = 64 * 1024;
const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_millis(200);

pub fn fifo_paths(pipe_id: &str) -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir();
    (
        dir.join(format!("pb-debug-in-{pipe_id}")),
        dir.join(format!("pb-debug-out-{pipe_id}")),
    )
}

fn create_fifo(path: &Path) -> Result<(), TransportError> {
    match mkfifoat(CWD, path, Mode::from_bits_truncate(0o600)) {
        Ok(()) | Err(Errno::EXIST) => Ok(()),
        Err(e) => Err(TransportError::Io(e.into())),
    }
}

async fn open_with_retry(
    path: &Path,
    flags: OFlags,
    deadline: Instant,
) -> Result<OwnedFd, TransportError> {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match open(path, flags | OFlags::NONBLOCK | OFlags::CLOEXEC, Mode::empty()) {
            Ok(fd) => return Ok(fd),
            // No peer has opened the other end yet.
            Err(Errno::NXIO) | Err(Errno::AGAIN) => {
                if Instant::now() >= deadline {
                    return Err(TransportError::Timeout);
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) => return Err(TransportError::Io(e.into())),
        }
    }
}

/// Create both FIFO nodes and open the in-FIFO for reading, without
/// waiting for the debuggee. A non-blocking read-open of a FIFO succeeds
/// immediately even with no writer present, so this step can and must run
/// before the debuggee is spawned — the nodes have to exist at the paths
/// the debuggee's environment variables point to.
pub fn prepare(pipe_id: &str) -> Result<FifoListening, TransportError> {
    let (in_path, out_path) = fifo_paths(pipe_id);
    create_fifo(&in_path)?;
    create_fifo(&out_path)?;
    let in_fd = open(&in_path, OFlags::RDONLY | OFlags::NONBLOCK | OFlags::CLOEXEC, Mode::empty())
        .map_err(|e| TransportError::Io(e.into()))?;
    Ok(FifoListening { in_fd, out_path })
}

pub struct FifoListening {
    in_fd: OwnedFd,
    out_path: PathBuf,
}

impl FifoListening {
    /// Open the out-FIFO for writing, retrying until the debuggee opens its
    /// read end or `config.connect_deadline` elapses.
    pub async fn accept(
        self,
        config: &TransportConfig,
    ) -> Result<(FifoReader, FifoWriter), TransportError> {
        let deadline = Instant::now() + config.connect_deadline;
        let out_fd = open_with_retry(&self.out_path, OFlags::WRONLY, deadline).await?;
        Ok((
            FifoReader {
                fd: AsyncFd::new(self.in_fd).map_err(TransportError::Io)?,
                closed: false,
            },
            FifoWriter {
                fd: AsyncFd::new(out_fd).map_err(TransportError::Io)?,
                closed: false,
            },
        ))
    }
}

pub struct FifoReader {
    fd: AsyncFd<OwnedFd>,
    closed: bool,
}

impl ReaderBackend for FifoReader {
    async fn read_chunk(&mut self) -> Result<Bytes, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut buf = [0u8; READ_CHUNK_SIZE];
        loop {
            let mut guard = self
                .fd
                .readable_mut()
                .await
                .map_err(TransportError::Io)?;
            match rustix::io::read(guard.get_ref().get_ref().as_fd(), &mut buf) {
                Ok(0) => return Err(TransportError::Broken),
                Ok(n) => return Ok(Bytes::copy_from_slice(&buf[..n])),
                Err(Errno::AGAIN) => {
                    guard.clear_ready();
                    continue;
                }
                Err(e) => return Err(TransportError::Io(e.into())),
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

pub struct FifoWriter {
    fd: AsyncFd<OwnedFd>,
    closed: bool,
}

impl WriterBackend for FifoWriter {
    async fn write_all(&mut self, mut bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        while !bytes.is_empty() {
            let mut guard = self
                .fd
                .writable_mut()
                .await
                .map_err(TransportError::Io)?;
            match rustix::io::write(guard.get_ref().get_ref().as_fd(), bytes) {
                Ok(0) => return Err(TransportError::Broken),
                Ok(n) => bytes = &bytes[n..],
                Err(Errno::AGAIN) => {
                    guard.clear_ready();
                    continue;
                }
                Err(Errno::PIPE) => return Err(TransportError::Broken),
                Err(e) => return Err(TransportError::Io(e.into())),
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
