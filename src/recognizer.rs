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


//! Byte-at-a-time frame recognition.
//!
//! One [`Recognizer`] handles every supervisory exchange; what it waits for is
//! data (an address and a set of acceptable control bytes), not code. Noise
//! and partial frames never fail it, it just falls back to [`State::Idle`]
//! and waits for the next flag.
//!
//! [`FrameDecoder`] layers payload collection on top for the receive path,
//! where the frame length is only known once the closing flag shows up.

use crate::codec::{self, Destuffer};
use crate::protocol::{self, Sequence, ADDRESS, FLAG};

// ============================================================================
// Recognizer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    FlagSeen,
    AddressOk,
    ControlOk,
    HeaderValid,
    Accepted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing decided yet.
    Pending,
    /// A complete frame with this control byte was recognized.
    Accepted(u8),
    /// The frame in progress was abandoned and the machine resynchronized.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct Recognizer {
    address: u8,
    controls: Vec<u8>,
    state: State,
    control: u8,
}

impl Recognizer {
    pub fn new(address: u8, controls: &[u8]) -> Self {
        Recognizer {
            address,
            controls: controls.to_vec(),
            state: State::Idle,
            control: 0,
        }
    }

    /// Waits for one supervisory frame such as SET, UA or DISC.
    pub fn supervisory(control: u8) -> Self {
        Self::new(ADDRESS, &[control])
    }

    /// Waits for the answer to an information frame sent with `sent`:
    /// RR for the following bit, or REJ asking for `sent` again.
    pub fn acknowledgment(sent: Sequence) -> Self {
        Self::new(ADDRESS, &[protocol::rr(sent.next()), protocol::rej(sent)])
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Control byte matched by the header seen so far.
    pub fn matched(&self) -> Option<u8> {
        match self.state {
            State::ControlOk | State::HeaderValid | State::Accepted => Some(self.control),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    pub fn feed(&mut self, byte: u8) -> Outcome {
        let (next, outcome) = match self.state {
            State::Idle | State::Accepted => match byte {
                FLAG => (State::FlagSeen, Outcome::Pending),
                _ => (State::Idle, Outcome::Pending),
            },
            State::FlagSeen => match byte {
                FLAG => (State::FlagSeen, Outcome::Pending),
                b if b == self.address => (State::AddressOk, Outcome::Pending),
                _ => (State::Idle, Outcome::Rejected),
            },
            State::AddressOk => match byte {
                FLAG => (State::FlagSeen, Outcome::Rejected),
                b if self.controls.contains(&b) => {
                    self.control = b;
                    (State::ControlOk, Outcome::Pending)
                }
                _ => (State::Idle, Outcome::Rejected),
            },
            State::ControlOk => match byte {
                FLAG => (State::FlagSeen, Outcome::Rejected),
                b if b == codec::bcc1(self.address, self.control) => (State::HeaderValid, Outcome::Pending),
                _ => (State::Idle, Outcome::Rejected),
            },
            State::HeaderValid => match byte {
                FLAG => (State::Accepted, Outcome::Accepted(self.control)),
                _ => (State::Idle, Outcome::Rejected),
            },
        };

        if outcome == Outcome::Rejected {
            tracing::trace!("discarded partial frame in state {:?} on 0x{:02X}", self.state, byte);
        }

        self.state = next;
        outcome
    }
}

// ============================================================================
// Information Frame Decoder
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Information {
        seq: Sequence,
        payload: Vec<u8>,
        /// BCC2 matched and the stuffing was well formed.
        intact: bool,
    },
    Supervisory(u8),
}

#[derive(Debug)]
struct Body {
    seq: Sequence,
    destuffer: Destuffer,
    data: Vec<u8>,
    corrupt: bool,
}

impl Body {
    fn new(seq: Sequence) -> Self {
        Body {
            seq,
            destuffer: Destuffer::new(),
            data: Vec::new(),
            corrupt: false,
        }
    }

    fn push(&mut self, byte: u8, limit: usize) {
        match self.destuffer.push(byte) {
            Ok(Some(b)) if self.data.len() < limit => self.data.push(b),
            Ok(Some(_)) => self.corrupt = true,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("{}", e);
                self.corrupt = true;
            }
        }
    }

    fn finish(mut self) -> Decoded {
        if self.destuffer.is_escaped() {
            self.corrupt = true;
        }

        let intact = match self.data.pop() {
            Some(check) => !self.corrupt && codec::bcc2(&self.data) == check,
            None => false,
        };

        Decoded::Information {
            seq: self.seq,
            payload: self.data,
            intact,
        }
    }
}

/// Recognizes information frames, destuffing the payload as it arrives, plus
/// a set of supervisory frames the receive path must also answer.
#[derive(Debug)]
pub struct FrameDecoder {
    header: Recognizer,
    body: Option<Body>,
    max_payload: usize,
}

impl FrameDecoder {
    pub fn new(max_payload: usize, supervisory: &[u8]) -> Self {
        let mut controls = vec![protocol::info(Sequence::Zero), protocol::info(Sequence::One)];
        controls.extend_from_slice(supervisory);

        FrameDecoder {
            header: Recognizer::new(ADDRESS, &controls),
            body: None,
            max_payload,
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<Decoded> {
        if self.body.is_none() && self.header.state() == State::HeaderValid {
            if let Some(seq) = self.header.matched().and_then(Sequence::from_info) {
                self.body = Some(Body::new(seq));
            }
        }

        if let Some(body) = self.body.as_mut() {
            if byte != FLAG {
                // payload plus its checksum
                body.push(byte, self.max_payload + 1);
                return None;
            }

            self.header.reset();
            return self.body.take().map(Body::finish);
        }

        match self.header.feed(byte) {
            Outcome::Accepted(control) => {
                self.header.reset();
                Some(Decoded::Supervisory(control))
            }
            _ => None,
        }
    }
}
