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


//! Both ends of a link running on separate threads over an in-memory line.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use hdlink::{app, Link, LinkConfig, LinkError, Role, SerialPort, Statistics};

/// Decides the fate of the n-th write on one end: return false to lose the
/// frame, or mutate it to corrupt it.
type Fault = Box<dyn FnMut(usize, &mut Vec<u8>) -> bool + Send>;

struct Pipe {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    writes: usize,
    fault: Fault,
}

impl Pipe {
    fn pair() -> (Pipe, Pipe) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (Pipe::new(a_tx, a_rx), Pipe::new(b_tx, b_rx))
    }

    fn new(tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>) -> Pipe {
        Pipe { tx, rx, pending: VecDeque::new(), writes: 0, fault: Box::new(|_: usize, _: &mut Vec<u8>| true) }
    }

    fn with_fault(mut self, fault: impl FnMut(usize, &mut Vec<u8>) -> bool + Send + 'static) -> Pipe {
        self.fault = Box::new(fault);
        self
    }
}

impl SerialPort for Pipe {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let index = self.writes;
        self.writes += 1;

        let mut frame = buf.to_vec();
        if (self.fault)(index, &mut frame) {
            // nobody listening is not an error on a serial line
            let _ = self.tx.send(frame);
        }
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(timeout) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "line idle"));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // the other end hung up, behave like a silent line
                    thread::sleep(timeout);
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "line idle"));
                }
            }
        }

        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn restore(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn config(role: Role) -> LinkConfig {
    LinkConfig {
        role,
        max_retries: 4,
        timeout: Duration::from_millis(200),
        max_payload: 64,
        ..Default::default()
    }
}

/// Receive until the transmitter disconnects, then close.
fn spawn_receiver(port: Pipe) -> thread::JoinHandle<(Vec<Vec<u8>>, Statistics)> {
    thread::spawn(move || {
        let mut link = Link::open(Box::new(port), config(Role::Receiver)).expect("receiver open");
        let mut delivered = Vec::new();
        loop {
            match link.receive() {
                Ok(payload) => delivered.push(payload),
                Err(LinkError::Disconnected) => break,
                Err(e) => panic!("receive failed: {}", e),
            }
        }
        let stats = link.close().expect("receiver close");
        (delivered, stats)
    })
}

fn transmit(port: Pipe, payloads: &[&[u8]]) -> Statistics {
    let mut link = Link::open(Box::new(port), config(Role::Transmitter)).expect("transmitter open");
    for payload in payloads {
        link.send(payload).expect("send");
    }
    link.close().expect("transmitter close")
}

const PAYLOADS: [&[u8]; 4] = [b"hello", b"\x7E flag \x7D escape", b"", b"last"];

fn expected() -> Vec<Vec<u8>> {
    PAYLOADS.iter().map(|p| p.to_vec()).collect()
}

#[test]
fn test_clean_exchange() {
    let (tx_port, rx_port) = Pipe::pair();
    let receiver = spawn_receiver(rx_port);

    let tx_stats = transmit(tx_port, &PAYLOADS);
    let (delivered, rx_stats) = receiver.join().unwrap();

    assert_eq!(delivered, expected());
    assert_eq!(tx_stats.retransmissions, 0);
    assert_eq!(rx_stats.duplicates, 0);
    assert_eq!(rx_stats.rejects_sent, 0);
}

#[test]
fn test_lost_acknowledgment_is_not_delivered_twice() {
    let (tx_port, rx_port) = Pipe::pair();
    // write 0 is UA, write 1 acknowledges the first payload
    let rx_port = rx_port.with_fault(|index, _| index != 1);
    let receiver = spawn_receiver(rx_port);

    let tx_stats = transmit(tx_port, &PAYLOADS);
    let (delivered, rx_stats) = receiver.join().unwrap();

    assert_eq!(delivered, expected());
    assert!(tx_stats.timeouts >= 1);
    assert!(tx_stats.retransmissions >= 1);
    assert_eq!(rx_stats.duplicates, 1);
}

#[test]
fn test_corrupted_frame_is_rejected_and_resent() {
    let (tx_port, rx_port) = Pipe::pair();
    // write 0 is SET, write 1 carries "hello"; flip a bit of its first data byte
    let tx_port = tx_port.with_fault(|index, frame| {
        if index == 1 {
            frame[4] ^= 0x01;
        }
        true
    });
    let receiver = spawn_receiver(rx_port);

    let tx_stats = transmit(tx_port, &PAYLOADS);
    let (delivered, rx_stats) = receiver.join().unwrap();

    assert_eq!(delivered, expected());
    assert_eq!(rx_stats.rejects_sent, 1);
    assert_eq!(tx_stats.rejects_received, 1);
    assert_eq!(tx_stats.retransmissions, 1);
}

// Byte-level damage: the recognizers must resynchronise on the next flag.

#[test]
fn test_missing_closing_flag() {
    let (tx_port, rx_port) = Pipe::pair();
    // the retransmission's opening flag ends the frame, so "hello" is
    // delivered late and the rest of the copy is discarded as noise
    let tx_port = tx_port.with_fault(|index, frame| {
        if index == 1 {
            frame.pop();
        }
        true
    });
    let receiver = spawn_receiver(rx_port);

    let tx_stats = transmit(tx_port, &PAYLOADS);
    let (delivered, rx_stats) = receiver.join().unwrap();

    assert_eq!(delivered, expected());
    assert_eq!(tx_stats.timeouts, 1);
    assert_eq!(rx_stats.duplicates, 0);
}

#[test]
fn test_lost_payload_byte_is_rejected() {
    let (tx_port, rx_port) = Pipe::pair();
    // drop the 'e' of "hello"
    let tx_port = tx_port.with_fault(|index, frame| {
        if index == 1 {
            frame.remove(5);
        }
        true
    });
    let receiver = spawn_receiver(rx_port);

    let tx_stats = transmit(tx_port, &PAYLOADS);
    let (delivered, rx_stats) = receiver.join().unwrap();

    assert_eq!(delivered, expected());
    assert_eq!(rx_stats.rejects_sent, 1);
    assert_eq!(tx_stats.rejects_received, 1);
}

#[test]
fn test_duplicated_payload_byte_is_rejected() {
    let (tx_port, rx_port) = Pipe::pair();
    let tx_port = tx_port.with_fault(|index, frame| {
        if index == 1 {
            let byte = frame[5];
            frame.insert(5, byte);
        }
        true
    });
    let receiver = spawn_receiver(rx_port);

    let tx_stats = transmit(tx_port, &PAYLOADS);
    let (delivered, rx_stats) = receiver.join().unwrap();

    assert_eq!(delivered, expected());
    assert_eq!(rx_stats.rejects_sent, 1);
    assert_eq!(tx_stats.rejects_received, 1);
}

#[test]
fn test_lost_header_byte_is_ignored() {
    let (tx_port, rx_port) = Pipe::pair();
    // without BCC1 the header never validates, the receiver stays silent
    let tx_port = tx_port.with_fault(|index, frame| {
        if index == 1 {
            frame.remove(3);
        }
        true
    });
    let receiver = spawn_receiver(rx_port);

    let tx_stats = transmit(tx_port, &PAYLOADS);
    let (delivered, rx_stats) = receiver.join().unwrap();

    assert_eq!(delivered, expected());
    assert_eq!(tx_stats.timeouts, 1);
    assert_eq!(rx_stats.rejects_sent, 0);
    assert_eq!(rx_stats.duplicates, 0);
}

#[test]
fn test_acknowledgment_without_opening_flag() {
    let (tx_port, rx_port) = Pipe::pair();
    // write 1 acknowledges "hello"; it arrives headless and must not count
    let rx_port = rx_port.with_fault(|index, frame| {
        if index == 1 {
            frame.remove(0);
        }
        true
    });
    let receiver = spawn_receiver(rx_port);

    let tx_stats = transmit(tx_port, &PAYLOADS);
    let (delivered, rx_stats) = receiver.join().unwrap();

    assert_eq!(delivered, expected());
    assert_eq!(tx_stats.timeouts, 1);
    assert_eq!(rx_stats.duplicates, 1);
}

#[test]
fn test_lost_set_is_retried() {
    let (tx_port, rx_port) = Pipe::pair();
    let tx_port = tx_port.with_fault(|index, _| index != 0);
    let receiver = spawn_receiver(rx_port);

    let tx_stats = transmit(tx_port, &PAYLOADS[..1]);
    let (delivered, _) = receiver.join().unwrap();

    assert_eq!(delivered, vec![b"hello".to_vec()]);
    assert_eq!(tx_stats.retransmissions, 1);
}

#[test]
fn test_lost_ua_is_answered_while_receiving() {
    let (tx_port, rx_port) = Pipe::pair();
    let rx_port = rx_port.with_fault(|index, _| index != 0);
    let receiver = spawn_receiver(rx_port);

    let tx_stats = transmit(tx_port, &PAYLOADS[..2]);
    let (delivered, _) = receiver.join().unwrap();

    assert_eq!(delivered, expected()[..2].to_vec());
    assert_eq!(tx_stats.retransmissions, 1);
}

#[test]
fn test_dead_line_exhausts_handshake() {
    let (tx_port, _rx_port) = Pipe::pair();
    let tx_port = tx_port.with_fault(|_, _| false);

    match Link::open(Box::new(tx_port), config(Role::Transmitter)) {
        Err(LinkError::HandshakeTimeout { attempts: 4, .. }) => {}
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("handshake succeeded on a dead line"),
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("hdlink-it-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_file_transfer_with_lost_final_acknowledgment() {
    let src = scratch_dir("src");
    let dst = scratch_dir("dst");

    let contents: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let path = src.join("payload.bin");
    std::fs::write(&path, &contents).unwrap();

    // 1000 bytes in 60-byte blocks: UA, START ack, 17 DATA acks, then END ack
    let (tx_port, rx_port) = Pipe::pair();
    let rx_port = rx_port.with_fault(|index, _| index != 19);

    let out = dst.clone();
    let receiver = thread::spawn(move || {
        let mut link = Link::open(Box::new(rx_port), config(Role::Receiver)).expect("receiver open");
        let written = app::receive_file(&mut link, &out).expect("receive file");
        app::wait_for_disconnect(&mut link).expect("wait for disconnect");
        link.close().expect("receiver close");
        written
    });

    let mut link = Link::open(Box::new(tx_port), config(Role::Transmitter)).expect("transmitter open");
    assert_eq!(app::send_file(&mut link, &path).expect("send file"), 1000);
    let stats = link.close().expect("transmitter close");

    let written = receiver.join().unwrap();
    assert_eq!(written, dst.join("payload.bin"));
    assert_eq!(std::fs::read(&written).unwrap(), contents);
    assert_eq!(stats.retransmissions, 1);

    std::fs::remove_dir_all(&src).unwrap();
    std::fs::remove_dir_all(&dst).unwrap();
}
