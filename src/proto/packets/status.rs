//! Status-state packets (server list ping). None of these are rewritten by
//! any handler; they exist so the factory can produce a structured
//! descriptor for the text/binary logs instead of falling back to the
//! "NULL MESSAGE" pass-through path.

use crate::error::Result;
use crate::proto::packet::{ClientboundPacket, Packet, ServerboundPacket};
use crate::proto::types::McString;
use std::io::{Read, Write};

/// `StatusRequest` (serverbound) — empty body, asks for the JSON status.
#[derive(Debug, Clone, Default)]
pub struct StatusRequestPacket;

impl Packet for StatusRequestPacket {
    const ID: i32 = 0x00;

    fn read<R: Read>(_reader: &mut R) -> Result<Self> {
        Ok(StatusRequestPacket)
    }

    fn write<W: Write>(&self, _writer: &mut W) -> Result<()> {
        Ok(())
    }
}

impl ServerboundPacket for StatusRequestPacket {}

/// `StatusResponse` (clientbound) — a single JSON document describing MOTD,
/// player counts, and version.
#[derive(Debug, Clone)]
pub struct StatusResponsePacket {
    /// Raw JSON status document, forwarded verbatim.
    pub json: String,
}

impl Packet for StatusResponsePacket {
    const ID: i32 = 0x00;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(StatusResponsePacket {
            json: McString::read(reader)?.0,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        McString::from(self.json.as_str()).write(writer)
    }
}

impl ClientboundPacket for StatusResponsePacket {}

/// `PingRequest` (serverbound) — an opaque payload echoed back by the server.
#[derive(Debug, Clone)]
pub struct PingRequestPacket {
    /// Client-chosen payload, echoed verbatim in the response.
    pub payload: i64,
}

impl Packet for PingRequestPacket {
    const ID: i32 = 0x01;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(PingRequestPacket {
            payload: crate::proto::types::read_long(reader)?,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        crate::proto::types::write_long(self.payload, writer)
    }
}

impl ServerboundPacket for PingRequestPacket {}

/// `PongResponse` (clientbound) — the echoed payload.
#[derive(Debug, Clone)]
pub struct PongResponsePacket {
    /// Echoed payload from the matching [`PingRequestPacket`].
    pub payload: i64,
}

impl Packet for PongResponsePacket {
    const ID: i32 = 0x01;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(PongResponsePacket {
            payload: crate::proto::types::read_long(reader)?,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        crate::proto::types::write_long(self.payload, writer)
    }
}

impl ClientboundPacket for PongResponsePacket {}
