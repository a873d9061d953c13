//! Handshake-state packets. Only one packet exists in this state.

use crate::error::{RelayError, Result};
use crate::proto::packet::{Packet, ServerboundPacket};
use crate::proto::types::McString;
use crate::proto::varint::VarInt;
use std::io::{Read, Write};

/// The declared purpose of a handshake, carried in `ClientIntention.intent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Server list ping.
    Status,
    /// Normal login.
    Login,
    /// Transfer from another server (protocol > 765 only).
    Transfer,
}

impl TryFrom<i32> for Intent {
    type Error = RelayError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            1 => Ok(Intent::Status),
            2 => Ok(Intent::Login),
            3 => Ok(Intent::Transfer),
            other => Err(RelayError::Protocol(format!(
                "invalid handshake intent: {other}"
            ))),
        }
    }
}

impl From<Intent> for i32 {
    fn from(intent: Intent) -> Self {
        match intent {
            Intent::Status => 1,
            Intent::Login => 2,
            Intent::Transfer => 3,
        }
    }
}

/// `ClientIntention` — the sole handshake packet, announcing protocol
/// version, target address, and purpose.
#[derive(Debug, Clone)]
pub struct ClientIntentionPacket {
    /// Protocol version the client wants to use.
    pub protocol_version: i32,
    /// Hostname/IP the client dialed. May carry a mod-loader suffix after a
    /// NUL byte (FML convention); callers that rewrite this field must
    /// preserve any such suffix.
    pub server_address: String,
    /// Port the client dialed.
    pub server_port: u16,
    /// Declared purpose of the connection.
    pub intent: i32,
}

impl Packet for ClientIntentionPacket {
    const ID: i32 = 0x00;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let protocol_version = VarInt::read(reader)?.0;
        let server_address = McString::read_with_max_length(reader, 255)?.0;

        let mut port_bytes = [0u8; 2];
        reader.read_exact(&mut port_bytes)?;
        let server_port = u16::from_be_bytes(port_bytes);

        let intent = VarInt::read(reader)?.0;

        Ok(ClientIntentionPacket {
            protocol_version,
            server_address,
            server_port,
            intent,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        VarInt(self.protocol_version).write(writer)?;
        McString::from(self.server_address.as_str()).write(writer)?;
        writer.write_all(&self.server_port.to_be_bytes())?;
        VarInt(self.intent).write(writer)?;
        Ok(())
    }
}

impl ServerboundPacket for ClientIntentionPacket {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips() {
        let packet = ClientIntentionPacket {
            protocol_version: 763,
            server_address: "proxy.local".into(),
            server_port: 12345,
            intent: 2,
        };

        let mut buf = Vec::new();
        packet.write(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded = ClientIntentionPacket::read(&mut cursor).unwrap();
        assert_eq!(decoded.protocol_version, 763);
        assert_eq!(decoded.server_address, "proxy.local");
        assert_eq!(decoded.server_port, 12345);
        assert_eq!(decoded.intent, 2);
    }
}
