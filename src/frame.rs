use log::{debug, warn};

use crate::constants::*;
use crate::{DeviceID, DeviceMode, Error, OperationalState};

/// Sum modulo 256 used by both command and reply frames.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// The two families of frames the sensor sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Data report (`0xC0`), unsolicited in active mode or the answer to a query.
    Measurement,
    /// Configuration reply (`0xC5`).
    ConfigReply,
}

impl FrameKind {
    fn from_class(byte: u8) -> Option<Self> {
        match byte {
            DATA_REPORT_ID => Some(FrameKind::Measurement),
            REPLY_ID => Some(FrameKind::ConfigReply),
            _ => None,
        }
    }

    /// Class byte found at position 1 of the frame.
    pub fn class(self) -> u8 {
        match self {
            FrameKind::Measurement => DATA_REPORT_ID,
            FrameKind::ConfigReply => REPLY_ID,
        }
    }
}

/// A validated 10-byte frame received from the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundFrame {
    pub kind: FrameKind,
    /// DATA1..DATA6, i.e. frame bytes 2..=7.
    pub payload: [u8; REPLY_PAYLOAD_LEN],
}

/// Represents a single data sample read from the SDS011 sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// PM2.5 concentration in µg/m³.
    pub pm2_5: f32,
    /// PM10 concentration in µg/m³.
    pub pm10: f32,
    /// Id of the reporting sensor.
    pub id: DeviceID,
}

/// Firmware build date, as reported by the sensor (`year` is two digits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub year: u8,
    pub month: u8,
    pub day: u8,
}

/// The typed content of an inbound frame.
///
/// Configuration replies are keyed by the command code they echo. `set` tells whether the
/// reply answers a write (`true`) or a read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    Measurement(Measurement),
    ReportingMode {
        set: bool,
        mode: DeviceMode,
        id: DeviceID,
    },
    DeviceId {
        id: DeviceID,
    },
    WorkState {
        set: bool,
        state: OperationalState,
        id: DeviceID,
    },
    Firmware {
        version: FirmwareVersion,
        id: DeviceID,
    },
    WorkingPeriod {
        set: bool,
        minutes: u8,
        id: DeviceID,
    },
}

impl InboundFrame {
    pub fn new(kind: FrameKind, payload: [u8; REPLY_PAYLOAD_LEN]) -> Self {
        InboundFrame { kind, payload }
    }

    /// Wire representation, checksum and tail included.
    pub fn to_bytes(&self) -> [u8; REPLY_FRAME_LEN] {
        let mut bytes = [0u8; REPLY_FRAME_LEN];
        bytes[0] = HEAD;
        bytes[1] = self.kind.class();
        bytes[2..8].copy_from_slice(&self.payload);
        bytes[8] = checksum(&self.payload);
        bytes[9] = TAIL;
        bytes
    }

    /// Command code echoed by a configuration reply.
    pub fn echoed_command(&self) -> Option<u8> {
        match self.kind {
            FrameKind::ConfigReply => Some(self.payload[0]),
            FrameKind::Measurement => None,
        }
    }

    /// Id carried in the last two payload bytes. For a device id reply this is the new id.
    pub fn device_id(&self) -> DeviceID {
        DeviceID::new(self.payload[4], self.payload[5])
    }

    pub fn measurement(&self) -> Option<Measurement> {
        match self.kind {
            FrameKind::Measurement => Some(Measurement {
                pm2_5: concentration(self.payload[0], self.payload[1]),
                pm10: concentration(self.payload[2], self.payload[3]),
                id: self.device_id(),
            }),
            FrameKind::ConfigReply => None,
        }
    }

    /// Interprets the payload according to the frame kind and echoed command.
    pub fn reply(&self) -> Result<Reply, Error> {
        if let Some(measurement) = self.measurement() {
            return Ok(Reply::Measurement(measurement));
        }
        let p = &self.payload;
        let id = self.device_id();
        let set = || match p[1] {
            ACTION_QUERY => Ok(false),
            ACTION_SET => Ok(true),
            _ => Err(Error::Malformed),
        };
        let reply = match p[0] {
            CMD_REPORTING_MODE => Reply::ReportingMode {
                set: set()?,
                mode: DeviceMode::from_byte(p[2]).ok_or(Error::Malformed)?,
                id,
            },
            CMD_SET_DEVICE_ID => Reply::DeviceId { id },
            CMD_WORK_STATE => Reply::WorkState {
                set: set()?,
                state: OperationalState::from_byte(p[2]).ok_or(Error::Malformed)?,
                id,
            },
            CMD_FIRMWARE => Reply::Firmware {
                version: FirmwareVersion {
                    year: p[1],
                    month: p[2],
                    day: p[3],
                },
                id,
            },
            CMD_WORKING_PERIOD => Reply::WorkingPeriod {
                set: set()?,
                minutes: p[2],
                id,
            },
            other => {
                debug!("Reply echoes unknown command {:02X}", other);
                return Err(Error::UnexpectedFrame);
            }
        };
        Ok(reply)
    }
}

fn concentration(low: u8, high: u8) -> f32 {
    (u16::from(low) | (u16::from(high) << 8)) as f32 / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekHeader,
    SeekClass,
    CollectPayload { kind: FrameKind, len: usize },
    VerifyChecksum { kind: FrameKind },
    SeekTail { kind: FrameKind },
}

/// Outcome of pushing one byte into the [`Decoder`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoded {
    /// The byte was consumed, no frame is complete yet.
    Pending,
    /// The byte completed a valid frame.
    Frame(InboundFrame),
    /// The byte invalidated the current candidate frame.
    Discarded(Error),
}

/// Byte-at-a-time frame synchronizer.
///
/// State is kept between calls, so bytes may be pushed as they trickle in from the serial
/// port. A candidate frame that fails any position check is dropped and every byte it
/// swallowed after its header is scanned again, so a real frame hidden behind a stray
/// `0xAA 0xC0` is still found.
#[derive(Debug, Clone)]
pub struct Decoder {
    state: State,
    payload: [u8; REPLY_PAYLOAD_LEN],
    sum: u8,
    // Raw bytes of the current candidate, header included.
    candidate: [u8; REPLY_FRAME_LEN],
    candidate_len: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub const fn new() -> Self {
        Decoder {
            state: State::SeekHeader,
            payload: [0; REPLY_PAYLOAD_LEN],
            sum: 0,
            candidate: [0; REPLY_FRAME_LEN],
            candidate_len: 0,
        }
    }

    /// Drops any partially received frame.
    pub fn reset(&mut self) {
        self.state = State::SeekHeader;
        self.candidate_len = 0;
    }

    /// True when no candidate frame is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == State::SeekHeader
    }

    pub fn push(&mut self, byte: u8) -> Decoded {
        if self.state == State::SeekHeader {
            if byte == HEAD {
                self.state = State::SeekClass;
                self.candidate[0] = byte;
                self.candidate_len = 1;
            }
            return Decoded::Pending;
        }

        self.candidate[self.candidate_len] = byte;
        self.candidate_len += 1;

        match self.state {
            State::SeekHeader => Decoded::Pending,
            State::SeekClass => match FrameKind::from_class(byte) {
                Some(kind) => {
                    self.sum = 0;
                    self.state = State::CollectPayload { kind, len: 0 };
                    Decoded::Pending
                }
                None => self.discard(Error::Malformed),
            },
            State::CollectPayload { kind, len } => {
                self.payload[len] = byte;
                self.sum = self.sum.wrapping_add(byte);
                self.state = if len + 1 == REPLY_PAYLOAD_LEN {
                    State::VerifyChecksum { kind }
                } else {
                    State::CollectPayload { kind, len: len + 1 }
                };
                Decoded::Pending
            }
            State::VerifyChecksum { kind } => {
                if byte == self.sum {
                    self.state = State::SeekTail { kind };
                    Decoded::Pending
                } else {
                    let reason = Error::ChecksumMismatch {
                        expected: self.sum,
                        actual: byte,
                    };
                    self.discard(reason)
                }
            }
            State::SeekTail { kind } => {
                if byte == TAIL {
                    self.state = State::SeekHeader;
                    self.candidate_len = 0;
                    Decoded::Frame(InboundFrame::new(kind, self.payload))
                } else {
                    self.discard(Error::Malformed)
                }
            }
        }
    }

    // Drops the candidate and rescans what followed its header. At most nine bytes are
    // replayed, too few to hold a whole frame, so the replay never completes one.
    fn discard(&mut self, reason: Error) -> Decoded {
        let swallowed = self.candidate;
        let len = self.candidate_len;
        warn!(
            "Dropping candidate frame {:02X?}: {:?}",
            &swallowed[..len],
            reason
        );
        self.reset();
        for &byte in &swallowed[1..len] {
            let _ = self.push(byte);
        }
        Decoded::Discarded(reason)
    }

    /// Iterates over the frames completed by `bytes`.
    pub fn feed<'a>(&'a mut self, bytes: &'a [u8]) -> Frames<'a> {
        Frames {
            decoder: self,
            bytes: bytes.iter(),
        }
    }
}

/// Iterator returned by [`Decoder::feed`].
pub struct Frames<'a> {
    decoder: &'a mut Decoder,
    bytes: core::slice::Iter<'a, u8>,
}

impl Iterator for Frames<'_> {
    type Item = InboundFrame;

    fn next(&mut self) -> Option<InboundFrame> {
        for &byte in self.bytes.by_ref() {
            if let Decoded::Frame(frame) = self.decoder.push(byte) {
                return Some(frame);
            }
        }
        None
    }
}
