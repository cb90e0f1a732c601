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


//! Link protocol constants

/// Frame delimiter, opens and closes every frame
pub const FLAG: u8 = 0x7E;

/// Escape - the next byte was XORed with ESCAPE_MASK
pub const ESCAPE: u8 = 0x7D;

/// Applied to an escaped byte
pub const ESCAPE_MASK: u8 = 0x20;

/// Address field carried by every frame
pub const ADDRESS: u8 = 0x03;

/// Set up - transmitter requests a connection
pub const SET: u8 = 0x03;

/// Unnumbered acknowledgment - answers SET and the final DISC
pub const UA: u8 = 0x07;

/// Disconnect - either side requests teardown
pub const DISC: u8 = 0x0B;

/// Low bits of a receiver-ready acknowledgment
const RR_BASE: u8 = 0x05;

/// Low bits of a reject acknowledgment
const REJ_BASE: u8 = 0x01;

/// Size of a supervisory frame on the wire
pub const SUPERVISORY_LEN: usize = 5;

/// Alternating sequence bit of the stop-and-wait protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sequence {
    #[default]
    Zero,
    One,
}

impl Sequence {
    pub fn bit(self) -> u8 {
        match self {
            Sequence::Zero => 0,
            Sequence::One => 1,
        }
    }

    pub fn next(self) -> Sequence {
        match self {
            Sequence::Zero => Sequence::One,
            Sequence::One => Sequence::Zero,
        }
    }

    pub fn toggle(&mut self) {
        *self = self.next();
    }

    /// Sequence bit of an information frame control byte, if it is one.
    pub fn from_info(control: u8) -> Option<Sequence> {
        match control {
            0x00 => Some(Sequence::Zero),
            0x80 => Some(Sequence::One),
            _ => None,
        }
    }
}

/// Control byte of an information frame.
pub fn info(seq: Sequence) -> u8 {
    seq.bit() << 7
}

/// Receiver ready, `seq` is the next frame the receiver expects.
pub fn rr(seq: Sequence) -> u8 {
    (seq.bit() << 7) | RR_BASE
}

/// Reject, `seq` is the frame the receiver wants retransmitted.
pub fn rej(seq: Sequence) -> u8 {
    (seq.bit() << 7) | REJ_BASE
}

/// Human readable name of a control byte, used in log output.
pub fn control_name(control: u8) -> &'static str {
    match control {
        SET => "SET",
        UA => "UA",
        DISC => "DISC",
        0x00 | 0x80 => "I",
        0x05 | 0x85 => "RR",
        0x01 | 0x81 => "REJ",
        _ => "unknown",
    }
}
