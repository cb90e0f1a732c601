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


//! HDLC-style stop-and-wait link layer over a serial port.

pub mod app;
pub mod codec;
mod connection;
pub mod error;
pub mod link;
pub mod packet;
pub mod protocol;
pub mod recognizer;
pub mod serial;
pub mod timer;
mod transfer;

pub use error::{AppError, FrameError, LinkError, PacketError};
pub use link::{Link, LinkConfig, Role, Statistics};
pub use serial::{RealSerialPort, SerialPort};
