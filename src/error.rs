// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.


//! Error types for the link layer and the file transfer on top of it.
//!
//! Byte-level noise never shows up here: malformed frames are absorbed by the
//! recognizer and corrupted payloads are answered with REJ. Only an exhausted
//! retry budget or a broken port reaches the caller.

use thiserror::Error;

/// Errors surfaced by [`crate::link::Link`] operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The port could not be opened, configured, read or written.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// No answer to SET or DISC within the retry budget.
    #[error("no answer to {stage} after {attempts} attempts")]
    HandshakeTimeout { stage: &'static str, attempts: u32 },

    /// An information frame was never acknowledged.
    #[error("frame not acknowledged after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    #[error("payload of {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// The peer sent DISC while a payload was expected.
    #[error("peer disconnected")]
    Disconnected,

    /// The link was aborted by an earlier fatal error.
    #[error("link is closed")]
    Closed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Malformed stuffed frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Escape followed by a byte that does not unescape to FLAG or ESCAPE.
    #[error("invalid escape sequence 0x7D 0x{0:02X}")]
    InvalidEscape(u8),

    /// Frame body ends right after an escape byte.
    #[error("frame body ends with an escape byte")]
    TruncatedEscape,

    /// Frame body has no room for the payload checksum.
    #[error("frame body has no checksum")]
    MissingChecksum,
}

/// Application packet decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,

    #[error("unknown packet type 0x{0:02X}")]
    UnknownType(u8),

    #[error("packet too short: need at least {required} bytes, got {actual}")]
    TooShort { required: usize, actual: usize },

    #[error("unknown parameter type 0x{0:02X}")]
    UnknownParameter(u8),

    #[error("invalid {0} parameter")]
    InvalidParameter(&'static str),

    #[error("missing {0} parameter")]
    MissingParameter(&'static str),

    #[error("data block of {len} bytes exceeds maximum of {max}")]
    DataTooLong { len: usize, max: usize },
}

/// Errors surfaced by the file sender and receiver.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("unexpected {0} packet")]
    UnexpectedPacket(&'static str),

    #[error("data packet out of order: expected {expected}, got {actual}")]
    OutOfOrder { expected: u8, actual: u8 },

    #[error("file size mismatch: announced {expected} bytes, received {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
}
