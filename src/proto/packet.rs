//! The packet trait every concrete packet type implements.

use crate::error::Result;
use crate::proto::varint::VarInt;
use std::io::{Read, Write};

/// A single Minecraft packet: knows its numeric id and how to serialize
/// itself to/from the byte layout that follows the frame's length and
/// compression envelopes.
pub trait Packet: Sized {
    /// The packet's wire id within its `(ConnectionState, Direction)` table.
    const ID: i32;

    /// Deserializes the packet body (everything after the id varint).
    fn read<R: Read>(reader: &mut R) -> Result<Self>;

    /// Serializes the packet body (the id varint is written separately by
    /// the frame codec).
    fn write<W: Write>(&self, writer: &mut W) -> Result<()>;

    /// The id as a [`VarInt`], convenient when building a frame.
    fn id() -> VarInt {
        VarInt(Self::ID)
    }

    /// Serializes just the field bytes (no id, no frame), a convenience for
    /// callers that need the size before deciding on compression.
    fn to_field_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }
}

/// Marker for packets flowing server -> client.
pub trait ClientboundPacket: Packet {}

/// Marker for packets flowing client -> server.
pub trait ServerboundPacket: Packet {}
