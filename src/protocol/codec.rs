//! Stream framing for the packet protocol.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use super::{Packet, HEADER_SIZE, LENGTH_OFFSET};
use crate::error::{Error, ProtocolError};

/// Tokio codec that frames the byte stream into packets.
///
/// The length byte at offset 4 delimits frames; the decoder waits until a
/// whole frame is buffered before emitting it. Frames that carry a valid
/// length but fail to decode are logged and skipped; a claimed length below
/// the header size leaves the stream unsynchronizable and aborts it.
#[derive(Debug, Default)]
pub struct PacketCodec;

impl PacketCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Need the header up to and including the length byte
            if src.len() <= LENGTH_OFFSET {
                return Ok(None);
            }

            let claimed = src[LENGTH_OFFSET] as usize;
            if claimed < HEADER_SIZE {
                return Err(ProtocolError::TruncatedFrame {
                    needed: HEADER_SIZE,
                    got: claimed,
                }
                .into());
            }

            // Wait for the complete frame
            if src.len() < claimed {
                src.reserve(claimed - src.len());
                return Ok(None);
            }

            let frame = src.split_to(claimed);
            match Packet::from_frame(&frame) {
                Ok(packet) => return Ok(Some(packet)),
                Err(e) => {
                    warn!(error = %e, frame_len = frame.len(), "skipping undecodable frame");
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(packet) => Ok(Some(packet)),
            None if src.is_empty() => Ok(None),
            None => {
                // End of stream inside a frame
                let needed = if src.len() > LENGTH_OFFSET {
                    src[LENGTH_OFFSET] as usize
                } else {
                    HEADER_SIZE
                };
                Err(ProtocolError::TruncatedFrame {
                    needed,
                    got: src.len(),
                }
                .into())
            }
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let encoded = item.encode(item.sequence())?;
        dst.reserve(encoded.len());
        dst.put_slice(&encoded);
        Ok(())
    }
}
