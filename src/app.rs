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


//! File transfer on top of an open [`Link`].
//!
//! The transmitter sends a START packet naming the file, the contents as
//! numbered DATA packets, then an END packet repeating the START parameters.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{AppError, LinkError, PacketError};
use crate::link::Link;
use crate::packet::{FileInfo, Packet, DATA_HEADER_LEN, MAX_DATA_LEN};

/// Send the file at `path`. Returns the number of content bytes sent.
pub fn send_file(link: &mut Link, path: &Path) -> Result<u64, AppError> {
    let chunk_size = link.max_payload().saturating_sub(DATA_HEADER_LEN).min(MAX_DATA_LEN);
    if chunk_size == 0 {
        return Err(LinkError::InvalidConfig(format!(
            "max_payload must exceed {} bytes to carry file data",
            DATA_HEADER_LEN
        ))
        .into());
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(PacketError::InvalidParameter("file name"))?;
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let info = FileInfo::new(name, size)?;

    tracing::info!("Sending {} ({} bytes)", info.name, info.size);
    link.send(&Packet::Start(info.clone()).encode()?)?;

    let mut buf = vec![0u8; chunk_size];
    let mut seq: u8 = 0;
    let mut sent: u64 = 0;
    loop {
        let n = read_chunk(&mut file, &mut buf)?;
        if n == 0 {
            break;
        }

        link.send(&Packet::Data { seq, data: buf[..n].to_vec() }.encode()?)?;
        sent += n as u64;
        seq = seq.wrapping_add(1);
        tracing::debug!("Sent {}/{} bytes", sent, info.size);
    }

    link.send(&Packet::End(info.clone()).encode()?)?;
    tracing::info!("Sent {} ({} bytes)", info.name, sent);

    Ok(sent)
}

/// Fill `buf` as far as the file allows.
fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Receive one file into `output_dir` and return where it was written.
///
/// Only the last component of the announced name is used.
pub fn receive_file(link: &mut Link, output_dir: &Path) -> Result<PathBuf, AppError> {
    let info = match Packet::decode(&link.receive()?)? {
        Packet::Start(info) => info,
        other => return Err(AppError::UnexpectedPacket(other.kind())),
    };

    let name = Path::new(&info.name)
        .file_name()
        .ok_or(PacketError::InvalidParameter("file name"))?;
    let path = output_dir.join(name);

    tracing::info!("Receiving {} ({} bytes) into {}", info.name, info.size, path.display());
    let mut file = File::create(&path)?;

    let mut expected_seq: u8 = 0;
    let mut received: u64 = 0;
    loop {
        match Packet::decode(&link.receive()?)? {
            Packet::Data { seq, data } => {
                if seq != expected_seq {
                    return Err(AppError::OutOfOrder { expected: expected_seq, actual: seq });
                }
                file.write_all(&data)?;
                received += data.len() as u64;
                expected_seq = expected_seq.wrapping_add(1);
                tracing::debug!("Received {}/{} bytes", received, info.size);
            }
            Packet::End(end) => {
                if end != info {
                    tracing::warn!("END packet differs from START: {:?} vs {:?}", end, info);
                }
                break;
            }
            other @ Packet::Start(_) => return Err(AppError::UnexpectedPacket(other.kind())),
        }
    }

    file.flush()?;
    if received != info.size {
        return Err(AppError::SizeMismatch { expected: info.size, actual: received });
    }

    tracing::info!("Received {} ({} bytes)", path.display(), received);
    Ok(path)
}

/// Keep answering the peer until it starts the teardown.
///
/// A lost acknowledgment of the END packet makes the sender retransmit it;
/// the duplicate is acknowledged again here instead of being left unanswered.
pub fn wait_for_disconnect(link: &mut Link) -> Result<(), AppError> {
    loop {
        match link.receive() {
            Ok(payload) => tracing::warn!("Ignoring {} byte payload after END", payload.len()),
            Err(LinkError::Disconnected) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::codec::{encode_information, encode_supervisory};
    use crate::link::{Channel, LinkConfig, Role};
    use crate::protocol::{rr, Sequence::{One, Zero}, ADDRESS};
    use crate::serial::{script, MockSerialPort};

    fn link(role: Role, max_payload: usize, port: MockSerialPort) -> Link {
        let config = LinkConfig {
            role,
            max_retries: 2,
            timeout: Duration::from_secs(1),
            max_payload,
            ..Default::default()
        };
        Link::from_channel(Channel::new(Box::new(port), config))
    }

    fn scratch_dir(test: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hdlink-{}-{}", test, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn ack(seq: crate::protocol::Sequence) -> Vec<u8> {
        encode_supervisory(ADDRESS, rr(seq)).to_vec()
    }

    #[test]
    fn test_send_file_in_chunks() {
        let dir = scratch_dir("send");
        let path = dir.join("n");
        std::fs::write(&path, b"0123456789").unwrap();

        let info = FileInfo::new("n", 10).unwrap();
        let expected_writes = [
            encode_information(Zero, &Packet::Start(info.clone()).encode().unwrap()),
            encode_information(One, &Packet::Data { seq: 0, data: b"012345".to_vec() }.encode().unwrap()),
            encode_information(Zero, &Packet::Data { seq: 1, data: b"6789".to_vec() }.encode().unwrap()),
            encode_information(One, &Packet::End(info).encode().unwrap()),
        ]
        .concat();
        let responses = script(&[&ack(One), &ack(Zero), &ack(One), &ack(Zero)]);

        // 10 bytes of payload leaves 6 for file data
        let mut link = link(Role::Transmitter, 10, MockSerialPort::new(responses, expected_writes));
        assert_eq!(send_file(&mut link, &path).unwrap(), 10);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_send_file_payload_too_small() {
        let dir = scratch_dir("small");
        let path = dir.join("x");
        std::fs::write(&path, b"x").unwrap();

        let mut link = link(Role::Transmitter, 4, MockSerialPort::new(vec![], vec![]));
        assert!(matches!(
            send_file(&mut link, &path),
            Err(AppError::Link(LinkError::InvalidConfig(_)))
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_receive_file() {
        let dir = scratch_dir("receive");

        // a directory in the name must not escape the output directory
        let info = FileInfo::new("../secret/data.bin", 5).unwrap();
        let frames = [
            encode_information(Zero, &Packet::Start(info.clone()).encode().unwrap()),
            encode_information(One, &Packet::Data { seq: 0, data: b"abc".to_vec() }.encode().unwrap()),
            encode_information(Zero, &Packet::Data { seq: 1, data: b"de".to_vec() }.encode().unwrap()),
            encode_information(One, &Packet::End(info).encode().unwrap()),
        ];
        let refs: Vec<&[u8]> = frames.iter().map(|f| f.as_slice()).collect();
        let expected_writes = [ack(One), ack(Zero), ack(One), ack(Zero)].concat();

        let mut link = link(Role::Receiver, 64, MockSerialPort::new(script(&refs), expected_writes));
        let path = receive_file(&mut link, &dir).unwrap();

        assert_eq!(path, dir.join("data.bin"));
        assert_eq!(std::fs::read(&path).unwrap(), b"abcde");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_receive_file_out_of_order() {
        let dir = scratch_dir("order");

        let info = FileInfo::new("f", 3).unwrap();
        let frames = [
            encode_information(Zero, &Packet::Start(info).encode().unwrap()),
            encode_information(One, &Packet::Data { seq: 1, data: b"abc".to_vec() }.encode().unwrap()),
        ];
        let refs: Vec<&[u8]> = frames.iter().map(|f| f.as_slice()).collect();
        let expected_writes = [ack(One), ack(Zero)].concat();

        let mut link = link(Role::Receiver, 64, MockSerialPort::new(script(&refs), expected_writes));
        assert!(matches!(
            receive_file(&mut link, &dir),
            Err(AppError::OutOfOrder { expected: 0, actual: 1 })
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_receive_file_size_mismatch() {
        let dir = scratch_dir("size");

        let info = FileInfo::new("f", 4).unwrap();
        let frames = [
            encode_information(Zero, &Packet::Start(info.clone()).encode().unwrap()),
            encode_information(One, &Packet::Data { seq: 0, data: b"ab".to_vec() }.encode().unwrap()),
            encode_information(Zero, &Packet::End(info).encode().unwrap()),
        ];
        let refs: Vec<&[u8]> = frames.iter().map(|f| f.as_slice()).collect();
        let expected_writes = [ack(One), ack(Zero), ack(One)].concat();

        let mut link = link(Role::Receiver, 64, MockSerialPort::new(script(&refs), expected_writes));
        assert!(matches!(
            receive_file(&mut link, &dir),
            Err(AppError::SizeMismatch { expected: 4, actual: 2 })
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_receive_file_requires_start() {
        let dir = scratch_dir("start");

        let frame = encode_information(Zero, &Packet::Data { seq: 0, data: b"a".to_vec() }.encode().unwrap());
        let mut link = link(Role::Receiver, 64, MockSerialPort::new(script(&[&frame]), ack(One)));
        assert!(matches!(
            receive_file(&mut link, &dir),
            Err(AppError::UnexpectedPacket("DATA"))
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_wait_for_disconnect_reacknowledges_end() {
        let end = encode_information(Zero, &Packet::End(FileInfo::new("f", 0).unwrap()).encode().unwrap());
        let disc = encode_supervisory(ADDRESS, crate::protocol::DISC);
        let responses = script(&[&end, &disc]);

        let mut link = link(Role::Receiver, 64, MockSerialPort::new(responses, ack(One)));
        link.rx_expected = One;

        wait_for_disconnect(&mut link).unwrap();
        assert!(link.peer_disconnected);
        assert_eq!(link.statistics().unwrap().duplicates, 1);
    }
}
