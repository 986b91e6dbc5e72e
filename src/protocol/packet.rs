//! Packet structure and header bit-packing.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{ProtocolError, Result};

use super::{HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// Error code reported by a device in the response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ErrorCode {
    /// No error.
    #[default]
    Okay = 0,
    /// A request parameter was out of range.
    InvalidParameter = 1,
    /// The device does not implement the requested function.
    FunctionNotSupported = 2,
    /// Reserved by the protocol.
    Reserved = 3,
}

impl ErrorCode {
    /// Decode from the top two bits of the flags byte (already shifted down).
    pub fn from_bits(v: u8) -> Self {
        match v & 0x03 {
            0 => Self::Okay,
            1 => Self::InvalidParameter,
            2 => Self::FunctionNotSupported,
            _ => Self::Reserved,
        }
    }

    /// Check if this code signals success.
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Okay)
    }

    /// Translate a non-okay code into the corresponding error.
    pub fn as_error(self) -> Option<ProtocolError> {
        match self {
            Self::Okay | Self::Reserved => None,
            Self::InvalidParameter => Some(ProtocolError::InvalidParameter),
            Self::FunctionNotSupported => Some(ProtocolError::FunctionNotSupported),
        }
    }
}

/// A single protocol packet, either an outbound request or an inbound
/// response/callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    uid: u32,
    function: u8,
    sequence: u8,
    response_expected: bool,
    error_code: ErrorCode,
    callback: bool,
    payload: Vec<u8>,
}

impl Packet {
    /// Create a new request packet.
    ///
    /// The sequence number is assigned by the connection when the packet is
    /// transmitted. Fails if the payload does not fit in a frame.
    pub fn new(
        uid: u32,
        function: u8,
        response_expected: bool,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            }
            .into());
        }

        Ok(Self {
            uid,
            function,
            sequence: 0,
            response_expected,
            error_code: ErrorCode::Okay,
            callback: false,
            payload,
        })
    }

    /// Decode a packet from a complete frame.
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        if frame.len() < HEADER_SIZE {
            return Err(ProtocolError::TruncatedFrame {
                needed: HEADER_SIZE,
                got: frame.len(),
            }
            .into());
        }

        let mut header = &frame[..HEADER_SIZE];
        let uid = header.read_u32::<LittleEndian>()?;
        let length = header.read_u8()? as usize;
        let function = header.read_u8()?;
        let seq_and_flags = header.read_u8()?;
        let flags = header.read_u8()?;

        if length < HEADER_SIZE {
            return Err(ProtocolError::TruncatedFrame {
                needed: HEADER_SIZE,
                got: length,
            }
            .into());
        }
        if frame.len() < length {
            return Err(ProtocolError::TruncatedFrame {
                needed: length,
                got: frame.len(),
            }
            .into());
        }

        let sequence = seq_and_flags >> 4;

        Ok(Self {
            uid,
            function,
            sequence,
            response_expected: seq_and_flags & 0x08 != 0,
            error_code: ErrorCode::from_bits(flags >> 6),
            callback: sequence == 0,
            payload: frame[HEADER_SIZE..length].to_vec(),
        })
    }

    /// Encode the packet with the given sequence number.
    ///
    /// Callers never set error bits on outbound packets; the flags byte
    /// carries zeros there.
    pub fn encode(&self, sequence: u8) -> Result<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            }
            .into());
        }

        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.write_u32::<LittleEndian>(self.uid)?;
        buf.write_u8(self.total_len())?;
        buf.write_u8(self.function)?;
        let mut seq_and_flags = (sequence & 0x0F) << 4;
        if self.response_expected {
            seq_and_flags |= 0x08;
        }
        buf.write_u8(seq_and_flags)?;
        buf.write_u8((self.error_code as u8) << 6)?;
        buf.extend_from_slice(&self.payload);

        Ok(buf)
    }

    /// Device UID this packet is addressed to (or originates from).
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// Function code.
    pub fn function(&self) -> u8 {
        self.function
    }

    /// Sequence number (0 for callbacks and not-yet-transmitted requests).
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Whether the sender expects (or expected) a reply.
    pub fn response_expected(&self) -> bool {
        self.response_expected
    }

    /// Error code from the response header.
    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }

    /// Error corresponding to a non-okay error code, if any.
    pub fn error(&self) -> Option<ProtocolError> {
        self.error_code.as_error()
    }

    /// Whether this is a device-initiated callback.
    pub fn is_callback(&self) -> bool {
        self.callback
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the packet and return the payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Typed little-endian reader over the payload.
    pub fn reader(&self) -> super::PayloadReader<'_> {
        super::PayloadReader::new(&self.payload)
    }

    /// Total frame length (header + payload).
    pub fn total_len(&self) -> u8 {
        (HEADER_SIZE + self.payload.len()) as u8
    }

    /// Stamp the sequence number assigned by the writer.
    pub(crate) fn with_sequence(mut self, sequence: u8) -> Self {
        self.sequence = sequence;
        self
    }
}
