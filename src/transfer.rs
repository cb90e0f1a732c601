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


//! Stop-and-wait transfer of information frames.
//!
//! Exactly one frame is in flight at a time. The sender keeps one sequence
//! bit and flips it only when the matching RR arrives; the receiver keeps the
//! bit it expects next and flips it only when it hands a payload to the
//! caller.

use crate::codec;
use crate::error::LinkError;
use crate::link::{Channel, Link, Poll};
use crate::protocol::{self, Sequence, DISC, SET, UA};
use crate::recognizer::{Decoded, FrameDecoder, Outcome, Recognizer};
use crate::timer::Timer;

enum Ack {
    Ready,
    Reject,
    Timeout,
}

impl Link {
    /// Deliver `payload` to the peer, retransmitting until it is acknowledged.
    ///
    /// Running out of attempts leaves the link closed.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        let result = self.transmit(payload);
        if let Err(LinkError::RetryExhausted { .. } | LinkError::Transport(_)) = &result {
            self.abort();
        }
        result
    }

    /// Wait for the next payload from the peer.
    ///
    /// Returns [`LinkError::Disconnected`] if the peer starts the teardown
    /// instead; [`Link::close`] then completes it.
    pub fn receive(&mut self) -> Result<Vec<u8>, LinkError> {
        let result = self.accept();
        if let Err(LinkError::Transport(_)) = &result {
            self.abort();
        }
        result
    }

    fn transmit(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        let seq = self.tx_seq;
        let channel = self.channel.as_mut().ok_or(LinkError::Closed)?;

        let max = channel.config.max_payload;
        if payload.len() > max {
            return Err(LinkError::PayloadTooLarge { size: payload.len(), max });
        }

        let frame = codec::encode_information(seq, payload);
        let mut ack = Recognizer::acknowledgment(seq);
        let mut timer = Timer::new();
        let max_retries = channel.config.max_retries;

        // a REJ costs an attempt just like a timeout
        for attempt in 1..=max_retries {
            if attempt > 1 {
                channel.stats.retransmissions += 1;
            }

            channel.send_frame(&frame)?;
            timer.arm(channel.config.timeout);
            ack.reset();

            match await_ack(channel, &mut ack, &mut timer, seq)? {
                Ack::Ready => {
                    self.tx_seq.toggle();
                    return Ok(());
                }
                Ack::Reject => {
                    channel.stats.rejects_received += 1;
                    tracing::warn!("Frame {} rejected by peer", seq.bit());
                }
                Ack::Timeout => {
                    channel.stats.timeouts += 1;
                    tracing::warn!(
                        "No acknowledgment for frame {} (attempt {} of {})",
                        seq.bit(),
                        attempt,
                        max_retries
                    );
                }
            }
        }

        Err(LinkError::RetryExhausted { attempts: max_retries })
    }

    fn accept(&mut self) -> Result<Vec<u8>, LinkError> {
        let channel = self.channel.as_mut().ok_or(LinkError::Closed)?;

        let mut decoder = FrameDecoder::new(channel.config.max_payload, &[SET, DISC]);
        // never armed, the receiver waits for as long as it takes
        let mut timer = Timer::new();

        loop {
            let byte = match channel.poll(&mut timer)? {
                Poll::Byte(byte) => byte,
                Poll::Idle | Poll::Expired => continue,
            };

            let Some(frame) = decoder.push(byte) else {
                continue;
            };

            match frame {
                Decoded::Information { seq, payload, intact } => {
                    channel.received(protocol::info(seq));

                    if seq != self.rx_expected {
                        // our RR got lost, the sender is repeating itself
                        channel.stats.duplicates += 1;
                        tracing::warn!("Duplicate frame {}, acknowledging again", seq.bit());
                        channel.send_supervisory(protocol::rr(self.rx_expected))?;
                    } else if intact {
                        self.rx_expected.toggle();
                        channel.send_supervisory(protocol::rr(self.rx_expected))?;
                        return Ok(payload);
                    } else {
                        channel.stats.rejects_sent += 1;
                        tracing::warn!("Frame {} corrupted, requesting retransmission", seq.bit());
                        channel.send_supervisory(protocol::rej(self.rx_expected))?;
                    }
                }
                Decoded::Supervisory(SET) => {
                    // our UA got lost, the transmitter is still opening
                    channel.received(SET);
                    tracing::warn!("Repeated SET, answering UA again");
                    channel.send_supervisory(UA)?;
                }
                Decoded::Supervisory(DISC) => {
                    channel.received(DISC);
                    self.peer_disconnected = true;
                    return Err(LinkError::Disconnected);
                }
                Decoded::Supervisory(_) => {}
            }
        }
    }
}

/// Wait for RR or REJ for the frame sent with `seq`. Anything else,
/// including a stale acknowledgment of the previous frame, is noise.
fn await_ack(
    channel: &mut Channel,
    ack: &mut Recognizer,
    timer: &mut Timer,
    seq: Sequence,
) -> Result<Ack, LinkError> {
    loop {
        match channel.poll(timer)? {
            Poll::Byte(byte) => {
                if let Outcome::Accepted(control) = ack.feed(byte) {
                    timer.cancel();
                    channel.received(control);

                    return Ok(if control == protocol::rr(seq.next()) {
                        Ack::Ready
                    } else {
                        Ack::Reject
                    });
                }
            }
            Poll::Idle => {}
            Poll::Expired => return Ok(Ack::Timeout),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
