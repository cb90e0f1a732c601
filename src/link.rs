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


//! Connection session.
//!
//! A [`Link`] owns everything one open connection needs: the port, the
//! negotiated retry policy, both sequence bits and the counters. Nothing in
//! the link layer lives in statics.

use std::fmt;
use std::time::Duration;

use crate::codec;
use crate::connection;
use crate::error::LinkError;
use crate::protocol::{self, Sequence, ADDRESS};
use crate::serial::{RealSerialPort, SerialPort};
use crate::timer::Timer;

/// Read timeout used while no timer is armed.
const IDLE_POLL: Duration = Duration::from_millis(100);

// ============================================================================
// Configuration
// ============================================================================

/// Which side of the link this is. The transmitter opens and closes the
/// connection, the receiver answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Transmitter,
    Receiver,
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub role: Role,
    pub baud_rate: u32,
    /// Maximum transmissions of a single frame before giving up.
    pub max_retries: u32,
    /// How long to wait for an answer after each transmission.
    pub timeout: Duration,
    /// Largest payload carried by one information frame.
    pub max_payload: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            role: Role::Transmitter,
            baud_rate: 38400,
            max_retries: 3,
            timeout: Duration::from_secs(3),
            max_payload: 1000,
        }
    }
}

impl LinkConfig {
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.max_retries == 0 {
            return Err(LinkError::InvalidConfig("max_retries must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(LinkError::InvalidConfig("timeout must not be zero".into()));
        }
        if self.max_payload == 0 {
            return Err(LinkError::InvalidConfig("max_payload must not be zero".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub rejects_sent: u64,
    pub rejects_received: u64,
    /// Information frames received twice because an acknowledgment was lost.
    pub duplicates: u64,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames sent: {}, frames received: {}, retransmissions: {}, timeouts: {}, \
             REJ sent: {}, REJ received: {}, duplicates: {}",
            self.frames_sent,
            self.frames_received,
            self.retransmissions,
            self.timeouts,
            self.rejects_sent,
            self.rejects_received,
            self.duplicates,
        )
    }
}

// ============================================================================
// Channel
// ============================================================================

pub(crate) enum Poll {
    Byte(u8),
    /// The armed timer ran out.
    Expired,
    /// Nothing arrived and no timer is armed.
    Idle,
}

/// Port plus per-session settings, handed between the connection state
/// machines and the [`Link`] that owns it while open.
pub(crate) struct Channel {
    pub(crate) port: Box<dyn SerialPort>,
    pub(crate) config: LinkConfig,
    pub(crate) stats: Statistics,
}

impl Channel {
    pub(crate) fn new(port: Box<dyn SerialPort>, config: LinkConfig) -> Self {
        Channel {
            port,
            config,
            stats: Statistics::default(),
        }
    }

    pub(crate) fn role(&self) -> Role {
        self.config.role
    }

    pub(crate) fn send_frame(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        if let Err(e) = self.port.write_all(frame) {
            return Err(self.fail(e.into()));
        }

        self.stats.frames_sent += 1;
        tracing::debug!(
            "Sent: {} (control 0x{:02X}, {} bytes)",
            protocol::control_name(frame[2]),
            frame[2],
            frame.len()
        );
        Ok(())
    }

    pub(crate) fn send_supervisory(&mut self, control: u8) -> Result<(), LinkError> {
        self.send_frame(&codec::encode_supervisory(ADDRESS, control))
    }

    pub(crate) fn received(&mut self, control: u8) {
        self.stats.frames_received += 1;
        tracing::debug!("Received: {} (control 0x{:02X})", protocol::control_name(control), control);
    }

    /// Read one byte, waiting no longer than the timer allows.
    ///
    /// A read that times out with the timer armed means the timer fired; the
    /// timer is disarmed before `Expired` is returned. Past the deadline the
    /// port is still read once without waiting, so bytes already buffered
    /// are seen before the expiry.
    pub(crate) fn poll(&mut self, timer: &mut Timer) -> Result<Poll, LinkError> {
        let timeout = timer.remaining().unwrap_or(IDLE_POLL);

        let mut buf = [0u8; 1];
        match self.port.read_timeout(&mut buf, timeout) {
            Ok(n) if n > 0 => Ok(Poll::Byte(buf[0])),
            Ok(_) => Ok(self.timed_out(timer)),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(self.timed_out(timer)),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(Poll::Idle),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    fn timed_out(&mut self, timer: &mut Timer) -> Poll {
        if timer.is_armed() {
            timer.cancel();
            Poll::Expired
        } else {
            Poll::Idle
        }
    }

    /// Restore the port after a fatal error and hand the error back.
    pub(crate) fn fail(&mut self, err: LinkError) -> LinkError {
        self.abort();
        err
    }

    pub(crate) fn abort(&mut self) {
        if let Err(e) = self.port.restore() {
            tracing::warn!("failed to restore port settings: {}", e);
        }
    }
}

// ============================================================================
// Link
// ============================================================================

/// An open connection.
///
/// Dropping a `Link` without [`Link::close`] skips the DISC exchange but
/// still restores the port.
pub struct Link {
    pub(crate) channel: Option<Channel>,
    role: Role,
    pub(crate) tx_seq: Sequence,
    pub(crate) rx_expected: Sequence,
    pub(crate) peer_disconnected: bool,
}

impl Link {
    /// Run the connection handshake for `config.role` over `port`.
    pub fn open(port: Box<dyn SerialPort>, config: LinkConfig) -> Result<Link, LinkError> {
        config.validate()?;

        let role = config.role;
        let channel = connection::establish(Channel::new(port, config))?;
        tracing::info!("Connection established as {:?}", role);

        Ok(Link::from_channel(channel))
    }

    /// Open the serial device `port_name` and run the handshake on it.
    pub fn connect(port_name: &str, config: LinkConfig) -> Result<Link, LinkError> {
        config.validate()?;

        let port = RealSerialPort::open(port_name, config.baud_rate)?;
        Link::open(Box::new(port), config)
    }

    pub(crate) fn from_channel(channel: Channel) -> Link {
        Link {
            role: channel.role(),
            channel: Some(channel),
            tx_seq: Sequence::Zero,
            rx_expected: Sequence::Zero,
            peer_disconnected: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the link can still carry data.
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    pub fn max_payload(&self) -> usize {
        self.channel.as_ref().map_or(0, |c| c.config.max_payload)
    }

    pub fn statistics(&self) -> Option<&Statistics> {
        self.channel.as_ref().map(|c| &c.stats)
    }

    /// Give up on the connection: restore the port and refuse further use.
    pub(crate) fn abort(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            tracing::warn!("Link aborted");
            channel.abort();
        }
    }

    /// Run the DISC exchange, restore the port and return the counters.
    pub fn close(mut self) -> Result<Statistics, LinkError> {
        let channel = self.channel.take().ok_or(LinkError::Closed)?;

        let mut channel = connection::teardown(channel, self.peer_disconnected)?;
        channel.port.restore()?;
        tracing::info!("Connection closed");

        Ok(channel.stats)
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.abort();
    }
}
