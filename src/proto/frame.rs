//! Frame assembly: combines the varint length prefix with the optional
//! compression envelope into the single unit the proxy core reads and
//! writes.

use crate::error::{RelayError, Result};
use crate::proto::compression::Compression;
use crate::proto::varint::VarInt;

/// Outcome of attempting to peek a frame's length prefix out of a buffer
/// that may not yet hold the whole frame.
pub enum FrameLength {
    /// Not enough bytes yet; try again once more arrive.
    Incomplete,
    /// The length prefix decoded to `prefix_len` bytes announcing `payload_len`
    /// bytes of payload to follow.
    Known {
        /// Size in bytes of the varint length prefix itself.
        prefix_len: usize,
        /// Size in bytes of the payload that follows the prefix.
        payload_len: usize,
    },
}

/// Peeks the length-prefix varint at the front of `buf` without consuming
/// anything.
pub fn peek_frame_length(buf: &[u8]) -> Result<FrameLength> {
    match VarInt::peek(buf)? {
        None => Ok(FrameLength::Incomplete),
        Some((value, prefix_len)) => {
            if value < 0 {
                return Err(RelayError::Protocol("negative frame length".into()));
            }
            Ok(FrameLength::Known {
                prefix_len,
                payload_len: value as usize,
            })
        }
    }
}

/// Strips the compression envelope (if `compression` is armed) from a
/// frame's payload, returning `(packet_id, fields_bytes)`. Fields bytes are
/// the raw remainder after the packet-id varint, ready for a packet's own
/// `read`.
pub fn decode_payload(
    payload: &[u8],
    compression: Option<&mut Compression>,
) -> Result<(i32, Vec<u8>)> {
    let raw = match compression {
        Some(c) => c.decompress_packet(payload)?,
        None => payload.to_vec(),
    };

    let mut cursor = std::io::Cursor::new(&raw);
    let packet_id = VarInt::read(&mut cursor)?;
    let id_len = cursor.position() as usize;
    Ok((packet_id.0, raw[id_len..].to_vec()))
}

/// Concatenates a packet id varint with its already-serialized fields, with
/// no length prefix and no compression envelope. This is the shape stored
/// by the replay recorder and the binary capture sink, both of which record
/// the logical packet rather than the bytes that happened to cross the wire.
pub fn encode_id_fields(packet_id: i32, fields: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(fields.len() + VarInt::MAX_SIZE);
    VarInt(packet_id).write(&mut out)?;
    out.extend_from_slice(fields);
    Ok(out)
}

/// Builds a complete frame (length prefix included) from a packet id and
/// its already-serialized fields, applying the compression envelope if
/// `compression` is armed.
pub fn encode_frame(
    packet_id: i32,
    fields: &[u8],
    compression: Option<&mut Compression>,
) -> Result<Vec<u8>> {
    let mut uncompressed = Vec::with_capacity(fields.len() + VarInt::MAX_SIZE);
    VarInt(packet_id).write(&mut uncompressed)?;
    uncompressed.extend_from_slice(fields);

    let payload = match compression {
        Some(c) => c.compress_packet(&uncompressed)?,
        None => uncompressed,
    };

    let mut frame = Vec::with_capacity(payload.len() + VarInt::MAX_SIZE);
    VarInt(payload.len() as i32).write(&mut frame)?;
    frame.extend_from_slice(&payload);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_without_compression() {
        let frame = encode_frame(0x00, &[0xAB, 0xCD], None).unwrap();
        // length prefix (1 byte) + id (1 byte) + 2 field bytes
        assert_eq!(frame, vec![0x03, 0x00, 0xAB, 0xCD]);

        let payload_len = match peek_frame_length(&frame).unwrap() {
            FrameLength::Known { prefix_len, payload_len } => {
                assert_eq!(prefix_len, 1);
                payload_len
            }
            FrameLength::Incomplete => panic!("expected known length"),
        };
        let payload = &frame[1..1 + payload_len];
        let (id, fields) = decode_payload(payload, None).unwrap();
        assert_eq!(id, 0x00);
        assert_eq!(fields, vec![0xAB, 0xCD]);
    }

    #[test]
    fn incomplete_length_prefix_is_reported() {
        let buf = [0x80u8];
        assert!(matches!(
            peek_frame_length(&buf).unwrap(),
            FrameLength::Incomplete
        ));
    }
}
