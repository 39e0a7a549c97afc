//! Scripted serial port and delay used by the session tests.
#![allow(dead_code)]

use core::convert::Infallible;
use std::collections::VecDeque;

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{ErrorType, Read, ReadReady, Write};

use crate::{
    Command, DeviceID, FrameKind, InboundFrame, COMMAND_FRAME_LEN, REPLY_FRAME_LEN,
};

/// Serial port double: records what the driver writes and hands out queued bytes.
///
/// Every `write` call releases the next scripted reply (if any) into the receive queue,
/// which mirrors a sensor answering each command frame.
#[derive(Debug)]
pub struct MockSerial {
    pub written: Vec<u8>,
    pub rx: VecDeque<u8>,
    pub replies: VecDeque<Vec<u8>>,
    /// Largest number of bytes handed out by one `read`.
    pub chunk: usize,
}

impl Default for MockSerial {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            written: Vec::new(),
            rx: VecDeque::new(),
            replies: VecDeque::new(),
            chunk: 64,
        }
    }

    /// Bytes already waiting before any command is sent.
    pub fn pending(mut self, bytes: &[u8]) -> Self {
        self.rx.extend(bytes.iter().copied());
        self
    }

    /// Bytes released after the next command frame is written.
    pub fn reply(mut self, bytes: &[u8]) -> Self {
        self.replies.push_back(bytes.to_vec());
        self
    }

    pub fn chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    /// Commands written so far, with the id they were addressed to.
    pub fn commands(&self) -> Vec<(Command, DeviceID)> {
        self.written
            .chunks(COMMAND_FRAME_LEN)
            .map(|chunk| {
                let frame: [u8; COMMAND_FRAME_LEN] = chunk.try_into().unwrap();
                Command::decode(&frame).unwrap()
            })
            .collect()
    }
}

impl ErrorType for MockSerial {
    type Error = Infallible;
}

impl Read for MockSerial {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let n = buf.len().min(self.chunk).min(self.rx.len());
        for slot in buf[..n].iter_mut() {
            *slot = self.rx.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Infallible> {
        Ok(!self.rx.is_empty())
    }
}

impl Write for MockSerial {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        self.written.extend_from_slice(buf);
        if let Some(reply) = self.replies.pop_front() {
            self.rx.extend(reply);
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Delay that returns immediately and counts how often it was awaited.
#[derive(Debug, Default)]
pub struct MockDelay {
    pub calls: usize,
}

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, _ns: u32) {
        self.calls += 1;
    }

    async fn delay_ms(&mut self, _ms: u32) {
        self.calls += 1;
    }
}

pub fn measurement_frame(pm2_5: u16, pm10: u16, id: DeviceID) -> [u8; REPLY_FRAME_LEN] {
    let [a, b] = pm2_5.to_le_bytes();
    let [c, d] = pm10.to_le_bytes();
    InboundFrame::new(FrameKind::Measurement, [a, b, c, d, id.id1, id.id2]).to_bytes()
}

pub fn reply_frame(code: u8, data: [u8; 3], id: DeviceID) -> [u8; REPLY_FRAME_LEN] {
    InboundFrame::new(
        FrameKind::ConfigReply,
        [code, data[0], data[1], data[2], id.id1, id.id2],
    )
    .to_bytes()
}
