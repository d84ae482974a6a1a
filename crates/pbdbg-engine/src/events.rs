//! Classifies decoded frames into the engine's semantic vocabulary
//! (`spec.md` §3, §4.4, §9 — unknown commands are preserved, never dropped).

use bytes::Bytes;
use pbdbg_frame::Frame;

use crate::wire::{CMD_ERROR, CMD_EXE_MODE, CMD_EXITED, CMD_INIT, CMD_OUTPUT, CMD_STOPPED};

/// The debuggee flags carried by `ExeMode`'s `value1` bit flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExeModeFlags {
    pub unicode: bool,
    pub stop_on_entry: bool,
    pub stop_on_end: bool,
    pub big_endian: bool,
}

impl ExeModeFlags {
    pub fn from_bits(v1: u32) -> Self {
        Self {
            unicode: v1 & 0b0001 != 0,
            stop_on_entry: v1 & 0b0010 != 0,
            stop_on_end: v1 & 0b0100 != 0,
            big_endian: v1 & 0b1000 != 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Init {
        version: u32,
    },
    ExeMode(ExeModeFlags),
    Output {
        text: String,
    },
    Error {
        message: String,
    },
    /// Covers both the `Stopped` and `BreakpointHit` semantic tags — both
    /// share wire command 11 and carry the same `(file_index, line0)`
    /// fields; callers distinguish a breakpoint hit by checking the
    /// session's breakpoint table for the reported location.
    Stopped {
        file_index: u32,
        line0: u32,
    },
    Exited {
        exit_code: u32,
    },
    /// A `command` integer with no known mapping. Logged, never dropped.
    Unknown {
        cmd: u32,
        v1: u32,
        v2: u32,
        data: Bytes,
    },
}

/// `unicode` is the flag observed in the session's `ExeMode` handshake
/// frame; it selects `Output`'s payload text encoding.
pub fn classify(frame: &Frame, unicode: bool) -> Event {
    match frame.command {
        CMD_INIT => Event::Init { version: frame.value2 },
        CMD_EXE_MODE => Event::ExeMode(ExeModeFlags::from_bits(frame.value1)),
        CMD_OUTPUT => Event::Output {
            text: decode_text(&frame.data, unicode),
        },
        CMD_STOPPED => Event::Stopped {
            file_index: frame.value1,
            line0: frame.value2,
        },
        CMD_ERROR => Event::Error {
            message: decode_text(&frame.data, unicode),
        },
        CMD_EXITED => Event::Exited { exit_code: frame.value1 },
        cmd => Event::Unknown {
            cmd,
            v1: frame.value1,
            v2: frame.value2,
            data: frame.data.clone(),
        },
    }
}

fn decode_text(data: &[u8], unicode: bool) -> String {
    if unicode {
        let units: Vec<u16> = data
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(data).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exe_mode_bit_layout_matches_spec() {
        let flags = ExeModeFlags::from_bits(0b1011);
        assert!(flags.unicode);
        assert!(flags.stop_on_entry);
        assert!(!flags.stop_on_end);
        assert!(flags.big_endian);
    }

    #[test]
    fn output_decodes_utf8_and_utf16le() {
        let frame = Frame::new(CMD_OUTPUT, 0, 0, Bytes::from_static(b"Hello"));
        assert_eq!(classify(&frame, false), Event::Output { text: "Hello".into() });

        let utf16: Vec<u8> = "Hi".encode_utf16().flat_map(u16::to_le_bytes).collect();
        let frame = Frame::new(CMD_OUTPUT, 0, 0, Bytes::from(utf16));
        assert_eq!(classify(&frame, true), Event::Output { text: "Hi".into() });
    }

    #[test]
    fn unrecognized_command_becomes_unknown() {
        let frame = Frame::new(999, 1, 2, Bytes::from_static(b"?"));
        assert_eq!(
            classify(&frame, false),
            Event::Unknown {
                cmd: 999,
                v1: 1,
                v2: 2,
                data: Bytes::from_static(b"?"),
            }
        );
    }
}
