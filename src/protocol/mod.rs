//! Wire protocol for the Tinkerforge brick daemon.
//!
//! Defines the packet format, the stream framer and the typed payload
//! serializer.
//!
//! ## Packet Format
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ UID (4, LE) │ Length (1) │ Function (1) │ Seq+Flags (1) │ Flags (1) │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ Payload (0..=247, little-endian fields)                          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Length` counts the whole frame (header + payload). The `Seq+Flags` byte
//! carries the 4-bit sequence number in bits 7..4 and the response-expected
//! flag in bit 3; the trailing `Flags` byte carries the device error code in
//! bits 7..6. A sequence number of 0 on an inbound packet marks a
//! device-initiated callback.

mod codec;
mod packet;
mod payload;

pub use codec::PacketCodec;
pub use packet::{ErrorCode, Packet};
pub use payload::{PayloadReader, PayloadWriter};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 8;

/// Offset of the length byte within the header.
pub const LENGTH_OFFSET: usize = 4;

/// Maximum payload size (total frame length must fit in one byte).
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize - HEADER_SIZE;

/// First sequence number handed out for outbound requests.
pub const FIRST_SEQUENCE: u8 = 1;

/// Largest sequence number (the field is 4 bits wide, 0 is reserved
/// for callbacks).
pub const MAX_SEQUENCE: u8 = 15;
