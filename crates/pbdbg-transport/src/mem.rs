//! In-memory transport backend, used by tests and the `pbdbg-testkit`
//! fixture debuggee: a pair of `tokio::mpsc` channels wired crosswise,
//! closable from either end.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{Reader, ReaderBackend, TransportError, Writer, WriterBackend};

const CHANNEL_CAPACITY: usize = 64;

pub struct MemReader {
    rx: mpsc::Receiver<Bytes>,
    closed: bool,
}

pub struct MemWriter {
    tx: Option<mpsc::Sender<Bytes>>,
}

impl ReaderBackend for MemReader {
    async fn read_chunk(&mut self) -> Result<Bytes, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.rx.recv().await.ok_or(TransportError::Broken)
    }

    fn close(&mut self) {
        self.closed = true;
        self.rx.close();
    }
}

impl WriterBackend for MemWriter {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match &self.tx {
            Some(tx) => tx
                .send(Bytes::copy_from_slice(bytes))
                .await
                .map_err(|_| TransportError::Broken),
            None => Err(TransportError::Closed),
        }
    }

    fn close(&mut self) {
        // Dropping the sender closes the channel, so the peer's `recv`
        // observes end-of-stream instead of hanging.
        self.tx = None;
    }
}

/// Build two connected in-memory transport endpoints: `(a_reader, a_writer)`
/// and `(b_reader, b_writer)`, where bytes written on `a` arrive on `b` and
/// vice versa.
pub fn mem_pair() -> ((Reader, Writer), (Reader, Writer)) {
    let (tx_a_to_b, rx_a_to_b) = mpsc::channel(CHANNEL_CAPACITY);
    let (tx_b_to_a, rx_b_to_a) = mpsc::channel(CHANNEL_CAPACITY);

    let a = (
        Reader::Mem(MemReader {
            rx: rx_b_to_a,
            closed: false,
        }),
        Writer::Mem(MemWriter {
            tx: Some(tx_a_to_b),
        }),
    );
    let b = (
        Reader::Mem(MemReader {
            rx: rx_a_to_b,
            closed: false,
        }),
        Writer::Mem(MemWriter {
            tx: Some(tx_b_to_a),
        }),
    );

    (a, b)
}
