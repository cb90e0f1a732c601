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


//! Frame encoding and decoding.
//!
//! Supervisory frames are `FLAG A C BCC1 FLAG`. Information frames insert the
//! stuffed payload and its stuffed BCC2 before the closing flag. BCC2 covers
//! the logical payload bytes, never their stuffed representation.

use crate::error::FrameError;
use crate::protocol::{self, Sequence, ADDRESS, ESCAPE, ESCAPE_MASK, FLAG, SUPERVISORY_LEN};

/// Header check: XOR of address and control.
pub fn bcc1(address: u8, control: u8) -> u8 {
    address ^ control
}

/// Payload check: running XOR of all payload bytes.
pub fn bcc2(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &b| acc ^ b)
}

pub fn encode_supervisory(address: u8, control: u8) -> [u8; SUPERVISORY_LEN] {
    [FLAG, address, control, bcc1(address, control), FLAG]
}

/// Append `byte` to `out`, escaping it if it would be mistaken for a flag.
pub fn stuff_into(out: &mut Vec<u8>, byte: u8) {
    match byte {
        FLAG | ESCAPE => out.extend_from_slice(&[ESCAPE, byte ^ ESCAPE_MASK]),
        _ => out.push(byte),
    }
}

pub fn stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        stuff_into(&mut out, b);
    }
    out
}

pub fn encode_information(seq: Sequence, payload: &[u8]) -> Vec<u8> {
    let control = protocol::info(seq);

    // worst case every byte is escaped
    let mut frame = Vec::with_capacity(2 * payload.len() + 8);
    frame.extend_from_slice(&[FLAG, ADDRESS, control, bcc1(ADDRESS, control)]);

    let mut check = 0u8;
    for &b in payload {
        check ^= b;
        stuff_into(&mut frame, b);
    }
    stuff_into(&mut frame, check);

    frame.push(FLAG);
    frame
}

/// Incremental unescaping of a stuffed frame body.
#[derive(Debug, Default)]
pub struct Destuffer {
    escaped: bool,
}

impl Destuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stuffed byte (never the closing flag). Returns the logical byte
    /// once one is complete.
    pub fn push(&mut self, byte: u8) -> Result<Option<u8>, FrameError> {
        if self.escaped {
            self.escaped = false;
            return match byte ^ ESCAPE_MASK {
                b @ (FLAG | ESCAPE) => Ok(Some(b)),
                _ => Err(FrameError::InvalidEscape(byte)),
            };
        }

        if byte == ESCAPE {
            self.escaped = true;
            Ok(None)
        } else {
            Ok(Some(byte))
        }
    }

    /// Whether the last byte pushed was an unfinished escape.
    pub fn is_escaped(&self) -> bool {
        self.escaped
    }

    pub fn reset(&mut self) {
        self.escaped = false;
    }
}

pub fn destuff(stuffed: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut destuffer = Destuffer::new();
    let mut out = Vec::with_capacity(stuffed.len());

    for &b in stuffed {
        if let Some(b) = destuffer.push(b)? {
            out.push(b);
        }
    }

    if destuffer.is_escaped() {
        return Err(FrameError::TruncatedEscape);
    }

    Ok(out)
}

/// Decode the stuffed region between BCC1 and the closing flag.
///
/// Returns the payload and whether its BCC2 matched.
pub fn decode_information(stuffed: &[u8]) -> Result<(Vec<u8>, bool), FrameError> {
    let mut body = destuff(stuffed)?;
    let check = body.pop().ok_or(FrameError::MissingChecksum)?;
    let intact = bcc2(&body) == check;
    Ok((body, intact))
}
