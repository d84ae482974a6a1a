//! Wire framing for the PureBasic debugger protocol.
//!
//! A frame is a fixed 20-byte header followed by a variable-length payload.
//! All integers are little-endian regardless of host endianness. This crate
//! performs no I/O: it turns byte streams into frames and frames into byte
//! streams, nothing else.
//!
//! ```text
//! offset 0  u32 command
//! offset 4  u32 data_size
//! offset 8  u32 value1
//! offset 12 u32 value2
//! offset 16 u32 timestamp
//! offset 20 bytes payload (length = data_size)
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};

/// Size of the fixed frame header, in bytes.
pub const HEADER_LEN: usize = 20;

/// Default ceiling on `data_size` before a frame is considered malformed.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// A single decoded (or about-to-be-encoded) wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u32,
    pub value1: u32,
    pub value2: u32,
    pub timestamp: u32,
    pub data: Bytes,
}

impl Frame {
    /// Build a frame with `timestamp` set to the current wall-clock time.
    ///
    /// `timestamp` is informational only; receivers must not rely on it for
    /// ordering frames.
    pub fn new(command: u32, value1: u32, value2: u32, data: impl Into<Bytes>) -> Self {
        Self {
            command,
            value1,
            value2,
            timestamp: now_unix_seconds(),
            data: data.into(),
        }
    }

    /// Encode this frame to its wire representation: `20 + data.len()` bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.data.len());
        buf.extend_from_slice(&self.command.to_le_bytes());
        buf.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.value1.to_le_bytes());
        buf.extend_from_slice(&self.value2.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.data);
        buf.freeze()
    }
}

fn now_unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Encode a frame directly from its fields, without constructing a [`Frame`].
pub fn encode(command: u32, value1: u32, value2: u32, data: &[u8]) -> Bytes {
    Frame::new(command, value1, value2, Bytes::copy_from_slice(data)).encode()
}

/// Errors raised by the frame codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// `data_size` in the header exceeds the configured maximum.
    Malformed { data_size: u32, max: u32 },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed { data_size, max } => write!(
                f,
                "frame data_size {} exceeds maximum of {} bytes",
                data_size, max
            ),
        }
    }
}

impl std::error::Error for FrameError {}

/// Turns an incoming byte stream into an ordered sequence of complete
/// frames. Partial headers or partial payloads stay buffered across calls.
///
/// Once `next_frame` returns a [`FrameError`], the decoder is considered
/// poisoned: the offending header is never consumed, so every subsequent
/// call returns the same error until the caller tears the channel down.
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_size: u32,
}

impl FrameDecoder {
    pub fn new(max_frame_size: u32) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Append freshly-read bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete frame out of the buffer, if any.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A reader must never
    /// call this expecting it to block; pair it with `feed`.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let data_size = u32::from_le_bytes(self.buf[4..8].try_into().unwrap());
        if data_size > self.max_frame_size {
            return Err(FrameError::Malformed {
                data_size,
                max: self.max_frame_size,
            });
        }

        let total_len = HEADER_LEN + data_size as usize;
        if self.buf.len() < total_len {
            // Reserve the rest up front so one huge declared frame doesn't
            // cause repeated doubling reallocations as bytes trickle in.
            let missing = total_len - self.buf.len();
            self.buf.reserve(missing);
            return Ok(None);
        }

        let mut frame_bytes = self.buf.split_to(total_len);
        let command = u32::from_le_bytes(frame_bytes[0..4].try_into().unwrap());
        let value1 = u32::from_le_bytes(frame_bytes[8..12].try_into().unwrap());
        let value2 = u32::from_le_bytes(frame_bytes[12..16].try_into().unwrap());
        let timestamp = u32::from_le_bytes(frame_bytes[16..20].try_into().unwrap());
        let data = frame_bytes.split_off(HEADER_LEN).freeze();

        Ok(Some(Frame {
            command,
            value1,
            value2,
            timestamp,
            data,
        }))
    }

    /// Drain every complete frame currently buffered, in wire order.
    pub fn drain(&mut self) -> Result<Vec<Frame>, FrameError> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(bytes: &[u8]) -> Frame {
        let mut dec = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        dec.feed(bytes);
        dec.next_frame().unwrap().expect("frame")
    }

    #[test]
    fn round_trip_empty_payload() {
        let frame = Frame::new(2, 0, 0, Bytes::new());
        let encoded = frame.encode();
        assert_eq!(encoded.len(), HEADER_LEN);
        let decoded = decode_one(&encoded);
        assert_eq!(decoded.command, 2);
        assert_eq!(decoded.value1, 0);
        assert_eq!(decoded.value2, 0);
        assert_eq!(decoded.data, Bytes::new());
    }

    #[test]
    fn round_trip_with_payload() {
        for (cmd, v1, v2, payload) in [
            (0u32, 0u32, 1u32, &b""[..]),
            (10, 0, 0, b"Hello"),
            (12, 1, 0, b"something went wrong"),
            (3, 1, 0x00000008, &[]),
        ] {
            let frame = Frame::new(cmd, v1, v2, Bytes::copy_from_slice(payload));
            let encoded = frame.encode();
            assert_eq!(encoded.len(), HEADER_LEN + payload.len());
            let decoded = decode_one(&encoded);
            assert_eq!(decoded.command, cmd);
            assert_eq!(decoded.value1, v1);
            assert_eq!(decoded.value2, v2);
            assert_eq!(decoded.data.as_ref(), payload);
        }
    }

    #[test]
    fn stream_reassembly_across_arbitrary_chunking() {
        let frames: Vec<Frame> = (0..20)
            .map(|i| Frame::new(i, i * 2, i * 3, Bytes::from(vec![b'x'; i as usize])))
            .collect();

        let mut concatenated = BytesMut::new();
        for frame in &frames {
            concatenated.extend_from_slice(&frame.encode());
        }
        let concatenated = concatenated.freeze();

        // Try a handful of fixed chunk sizes, including ones that split a
        // header in half and ones that split a payload in half.
        for chunk_size in [1usize, 3, 7, 19, 20, 21, 64, 4096] {
            let mut dec = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
            let mut collected = Vec::new();
            for chunk in concatenated.chunks(chunk_size) {
                dec.feed(chunk);
                collected.extend(dec.drain().unwrap());
            }
            assert_eq!(collected, frames, "mismatch at chunk_size={chunk_size}");
        }
    }

    #[test]
    fn cross_boundary_chunking_yields_exactly_one_frame() {
        let frame = Frame::new(10, 0, 0, Bytes::from_static(b"Hello"));
        let encoded = frame.encode();

        let mut dec = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        dec.feed(&encoded[0..10]);
        assert!(dec.next_frame().unwrap().is_none());

        dec.feed(&encoded[10..20]);
        dec.feed(&encoded[20..25]);
        assert!(dec.next_frame().unwrap().is_none());

        dec.feed(&encoded[25..]);
        let decoded = dec.next_frame().unwrap().expect("one frame");
        assert_eq!(decoded, frame);
        assert!(dec.next_frame().unwrap().is_none());
    }

    #[test]
    fn oversized_data_size_is_malformed() {
        let mut header = BytesMut::new();
        header.extend_from_slice(&1u32.to_le_bytes());
        header.extend_from_slice(&(1u32 << 31).to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());

        let mut dec = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        dec.feed(&header);
        let err = dec.next_frame().unwrap_err();
        assert_eq!(
            err,
            FrameError::Malformed {
                data_size: 1u32 << 31,
                max: DEFAULT_MAX_FRAME_SIZE
            }
        );
        // The malformed header is never consumed; re-polling repeats the error.
        assert_eq!(dec.next_frame().unwrap_err(), err);
    }
}
