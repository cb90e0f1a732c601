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


use std::io::{Read, Write};
use std::time::Duration;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort as SerialPortTrait, StopBits};

// ============================================================================
// SerialPort Trait
// ============================================================================

/// Byte channel consumed by the link layer.
///
/// `read_timeout` returns an error of kind `TimedOut` when nothing arrived
/// within `timeout`; the engine treats that as expiry of its own timer.
pub trait SerialPort: Send {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize>;

    /// Revert the line configuration to what it was when the session started.
    fn restore(&mut self) -> std::io::Result<()>;
}

// ============================================================================
// Pre-session line settings
// ============================================================================

/// Terminal attributes of the device as found before the session
/// reconfigured it, re-applied through a second descriptor on the same tty.
#[cfg(unix)]
mod line {
    use std::fs::{File, OpenOptions};
    use std::os::unix::fs::OpenOptionsExt;
    use nix::fcntl::OFlag;
    use nix::sys::termios::{self, SetArg, Termios};

    pub(super) struct LineSnapshot {
        device: File,
        termios: Termios,
    }

    impl LineSnapshot {
        /// Must run before the device is configured for the session.
        pub(super) fn take(port_name: &str) -> std::io::Result<Self> {
            let device = OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags((OFlag::O_NOCTTY | OFlag::O_NONBLOCK).bits())
                .open(port_name)?;
            let termios = termios::tcgetattr(&device)?;
            Ok(LineSnapshot { device, termios })
        }

        pub(super) fn apply(&self) -> std::io::Result<()> {
            termios::tcsetattr(&self.device, SetArg::TCSANOW, &self.termios)?;
            Ok(())
        }
    }

}

/// Without termios access the best available snapshot is the port's own
/// settings right after opening.
#[cfg(not(unix))]
mod line {
    use std::time::Duration;
    use serialport::{DataBits, FlowControl, Parity, SerialPort as SerialPortTrait, StopBits};

    pub(super) struct LineSnapshot {
        baud_rate: u32,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
        flow_control: FlowControl,
        timeout: Duration,
    }

    impl LineSnapshot {
        pub(super) fn take(port: &dyn SerialPortTrait) -> std::io::Result<Self> {
            Ok(LineSnapshot {
                baud_rate: port.baud_rate()?,
                data_bits: port.data_bits()?,
                parity: port.parity()?,
                stop_bits: port.stop_bits()?,
                flow_control: port.flow_control()?,
                timeout: port.timeout(),
            })
        }

        pub(super) fn apply(&self, port: &mut dyn SerialPortTrait) -> std::io::Result<()> {
            port.set_baud_rate(self.baud_rate)?;
            port.set_data_bits(self.data_bits)?;
            port.set_parity(self.parity)?;
            port.set_stop_bits(self.stop_bits)?;
            port.set_flow_control(self.flow_control)?;
            port.set_timeout(self.timeout)?;
            Ok(())
        }
    }
}

use line::LineSnapshot;

// ============================================================================
// Real Serial Port Implementation
// ============================================================================

/// Real serial port implementation that wraps the serialport crate
pub struct RealSerialPort {
    port: Box<dyn SerialPortTrait>,
    saved: LineSnapshot,
    restored: bool,
}

impl RealSerialPort {
    /// Open `port_name` in raw 8N1 mode without flow control.
    pub fn open(port_name: &str, baud_rate: u32) -> std::io::Result<Self> {
        #[cfg(unix)]
        let saved = LineSnapshot::take(port_name)?;

        let port = serialport::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()?;

        #[cfg(not(unix))]
        let saved = LineSnapshot::take(port.as_ref())?;

        // stale bytes from a previous session would confuse the recognizer
        port.clear(ClearBuffer::All)?;

        tracing::debug!(port = port_name, baud_rate, "serial port opened");
        Ok(RealSerialPort { port, saved, restored: false })
    }
}

impl SerialPort for RealSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.port.write_all(buf)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
        self.port.set_timeout(timeout)?;
        match self.port.read(buf) {
            // a zero-length read on a tty is a timeout, not end of stream
            Ok(0) => Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out")),
            other => other,
        }
    }

    fn restore(&mut self) -> std::io::Result<()> {
        self.port.flush()?;
        self.port.clear(ClearBuffer::Input)?;

        #[cfg(unix)]
        self.saved.apply()?;
        #[cfg(not(unix))]
        self.saved.apply(self.port.as_mut())?;

        self.restored = true;
        tracing::debug!("serial port settings restored");
        Ok(())
    }
}

impl Drop for RealSerialPort {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(e) = self.restore() {
                tracing::warn!("failed to restore serial port settings: {}", e);
            }
        }
    }
}

// ============================================================================
// Mock Serial Port for Testing
// ============================================================================

#[cfg(test)]
pub struct MockSerialPort {
    // Data to return on reads (None = timeout)
    read_buffer: Vec<Option<u8>>,
    read_pos: usize,
    // Track what was written
    write_log: Vec<u8>,
    // Expected writes for verification
    expected_writes: Vec<u8>,
    restored: bool,
    expect_restored: Option<bool>,
}

#[cfg(test)]
impl MockSerialPort {
    pub fn new(responses: Vec<Option<u8>>, expected_writes: Vec<u8>) -> Self {
        MockSerialPort {
            read_buffer: responses,
            read_pos: 0,
            write_log: Vec::new(),
            expected_writes,
            restored: false,
            expect_restored: None,
        }
    }

    /// Also check on drop whether `restore` was called.
    pub fn expect_restored(mut self, restored: bool) -> Self {
        self.expect_restored = Some(restored);
        self
    }
}

/// Turn frames into a scripted read sequence.
#[cfg(test)]
pub fn script(frames: &[&[u8]]) -> Vec<Option<u8>> {
    frames.iter().flat_map(|f| f.iter().map(|&b| Some(b))).collect()
}

#[cfg(test)]
impl SerialPort for MockSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_log.extend_from_slice(buf);
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> std::io::Result<usize> {
        // Out of responses = the test script is wrong, fail instead of spinning
        if self.read_pos >= self.read_buffer.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "Mock exhausted"
            ));
        }

        // If current response is None = timeout
        if self.read_buffer[self.read_pos].is_none() {
            self.read_pos += 1;
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Mock timeout"
            ));
        }

        let mut bytes_read = 0;
        while bytes_read < buf.len() && self.read_pos < self.read_buffer.len() {
            match self.read_buffer[self.read_pos] {
                Some(byte) => {
                    buf[bytes_read] = byte;
                    bytes_read += 1;
                    self.read_pos += 1;
                }
                None => break,  // Stop at timeout marker
            }
        }

        Ok(bytes_read)
    }

    fn restore(&mut self) -> std::io::Result<()> {
        self.restored = true;
        Ok(())
    }
}

#[cfg(test)]
impl Drop for MockSerialPort {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        assert_eq!(
            self.read_pos,
            self.read_buffer.len(),
            "MockSerialPort dropped with {} unconsumed responses (read {} of {} bytes)",
            self.read_buffer.len() - self.read_pos,
            self.read_pos,
            self.read_buffer.len()
        );

        assert_eq!(
            &self.write_log,
            &self.expected_writes,
            "MockSerialPort write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );

        if let Some(expected) = self.expect_restored {
            assert_eq!(self.restored, expected, "MockSerialPort restore state mismatch");
        }
    }
}
