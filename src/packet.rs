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


//! Application packets carried as link payloads.
//!
//! ```text
//! control:  C(2=START|3=END) | T L V | T L V
//!           T=0 file size, big-endian, 1..=8 bytes
//!           T=1 file name, UTF-8
//! data:     C(1) | N | L2 | L1 | L2*256+L1 bytes
//! ```

use crate::error::PacketError;

pub const DATA: u8 = 0x01;
pub const START: u8 = 0x02;
pub const END: u8 = 0x03;

const PARAM_SIZE: u8 = 0x00;
const PARAM_NAME: u8 = 0x01;

/// Bytes in front of the data of a DATA packet.
pub const DATA_HEADER_LEN: usize = 4;

/// Largest data block one DATA packet can describe.
pub const MAX_DATA_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
    pub name: String,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, size: u64) -> Result<Self, PacketError> {
        let name = name.into();
        if name.is_empty() || name.len() > u8::MAX as usize {
            return Err(PacketError::InvalidParameter("file name"));
        }
        Ok(FileInfo { size, name })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Start(FileInfo),
    Data { seq: u8, data: Vec<u8> },
    End(FileInfo),
}

impl Packet {
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Start(_) => "START",
            Packet::Data { .. } => "DATA",
            Packet::End(_) => "END",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        match self {
            Packet::Start(info) => Ok(encode_control(START, info)),
            Packet::End(info) => Ok(encode_control(END, info)),
            Packet::Data { seq, data } => {
                let len = data.len();
                if len > MAX_DATA_LEN {
                    return Err(PacketError::DataTooLong { len, max: MAX_DATA_LEN });
                }

                let mut buf = Vec::with_capacity(DATA_HEADER_LEN + len);
                buf.extend_from_slice(&[DATA, *seq, (len >> 8) as u8, len as u8]);
                buf.extend_from_slice(data);
                Ok(buf)
            }
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Packet, PacketError> {
        let (&kind, rest) = buf.split_first().ok_or(PacketError::Empty)?;

        match kind {
            DATA => decode_data(buf),
            START => Ok(Packet::Start(decode_control(rest)?)),
            END => Ok(Packet::End(decode_control(rest)?)),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

fn encode_control(kind: u8, info: &FileInfo) -> Vec<u8> {
    let size = info.size.to_be_bytes();
    // keep at least one byte for a zero size
    let skip = size.iter().take_while(|&&b| b == 0).count().min(size.len() - 1);
    let size = &size[skip..];

    let name = info.name.as_bytes();
    let name = &name[..name.len().min(u8::MAX as usize)];

    let mut buf = Vec::with_capacity(5 + size.len() + name.len());
    buf.push(kind);
    buf.extend_from_slice(&[PARAM_SIZE, size.len() as u8]);
    buf.extend_from_slice(size);
    buf.extend_from_slice(&[PARAM_NAME, name.len() as u8]);
    buf.extend_from_slice(name);
    buf
}

fn decode_control(mut params: &[u8]) -> Result<FileInfo, PacketError> {
    let mut size = None;
    let mut name = None;

    while !params.is_empty() {
        if params.len() < 2 {
            return Err(PacketError::TooShort { required: 2, actual: params.len() });
        }

        let (kind, len) = (params[0], params[1] as usize);
        let value = params
            .get(2..2 + len)
            .ok_or(PacketError::TooShort { required: 2 + len, actual: params.len() })?;

        match kind {
            PARAM_SIZE => {
                if value.is_empty() || value.len() > 8 {
                    return Err(PacketError::InvalidParameter("file size"));
                }
                size = Some(value.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64));
            }
            PARAM_NAME => {
                let s = std::str::from_utf8(value)
                    .map_err(|_| PacketError::InvalidParameter("file name"))?;
                name = Some(s.to_string());
            }
            other => return Err(PacketError::UnknownParameter(other)),
        }

        params = &params[2 + len..];
    }

    let size = size.ok_or(PacketError::MissingParameter("file size"))?;
    let name = name.ok_or(PacketError::MissingParameter("file name"))?;
    FileInfo::new(name, size)
}

fn decode_data(buf: &[u8]) -> Result<Packet, PacketError> {
    if buf.len() < DATA_HEADER_LEN {
        return Err(PacketError::TooShort { required: DATA_HEADER_LEN, actual: buf.len() });
    }

    let len = (buf[2] as usize) << 8 | buf[3] as usize;
    let data = buf
        .get(DATA_HEADER_LEN..DATA_HEADER_LEN + len)
        .ok_or(PacketError::TooShort { required: DATA_HEADER_LEN + len, actual: buf.len() })?;

    Ok(Packet::Data { seq: buf[1], data: data.to_vec() })
}
