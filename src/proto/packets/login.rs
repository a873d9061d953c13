//! Login-state packets. This build targets a single protocol version
//! (770, > 765), so only the modern field layouts are implemented — no
//! `#if PROTOCOL_VERSION` ladders, per the REDESIGN FLAGS guidance.

use crate::error::Result;
use crate::proto::packet::{ClientboundPacket, Packet, ServerboundPacket};
use crate::proto::types::{self, McString, McUuid};
use crate::proto::varint::VarInt;
use std::io::{Read, Write};

/// `ServerboundHello` ("Login Start") — name plus profile UUID.
#[derive(Debug, Clone)]
pub struct ServerboundHelloPacket {
    /// Display name the client wants to play as.
    pub name: String,
    /// Profile UUID (offline or authenticated, depending on mode).
    pub profile_id: McUuid,
}

impl Packet for ServerboundHelloPacket {
    const ID: i32 = 0x00;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let name = McString::read_with_max_length(reader, 16)?.0;
        let profile_id = types::read_uuid(reader)?;
        Ok(ServerboundHelloPacket { name, profile_id })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        McString::from(self.name.as_str()).write(writer)?;
        types::write_uuid(&self.profile_id, writer)
    }
}

impl ServerboundPacket for ServerboundHelloPacket {}

/// `ClientboundHello` ("Encryption Request") — key-agreement challenge.
#[derive(Debug, Clone)]
pub struct ClientboundHelloPacket {
    /// Session-server identifier string used in the `joinserver` call.
    pub server_id: String,
    /// DER-encoded X.509 RSA public key of the upstream server.
    pub public_key: Vec<u8>,
    /// Random challenge the client must echo back encrypted.
    pub challenge: Vec<u8>,
    /// Whether the upstream server requires online-mode authentication.
    pub should_authenticate: bool,
}

impl Packet for ClientboundHelloPacket {
    const ID: i32 = 0x01;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let server_id = McString::read_with_max_length(reader, 20)?.0;
        let public_key = types::read_byte_array(reader)?;
        let challenge = types::read_byte_array(reader)?;
        let should_authenticate = types::read_bool(reader)?;
        Ok(ClientboundHelloPacket {
            server_id,
            public_key,
            challenge,
            should_authenticate,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        McString::from(self.server_id.as_str()).write(writer)?;
        types::write_byte_array(&self.public_key, writer)?;
        types::write_byte_array(&self.challenge, writer)?;
        types::write_bool(self.should_authenticate, writer)
    }
}

impl ClientboundPacket for ClientboundHelloPacket {}

/// `ServerboundKey` ("Encryption Response") — the encrypted shared secret
/// and echoed challenge.
#[derive(Debug, Clone)]
pub struct ServerboundKeyPacket {
    /// RSA-encrypted shared secret.
    pub encrypted_shared_secret: Vec<u8>,
    /// RSA-encrypted verify challenge, echoed back unchanged to prove
    /// possession of the shared secret.
    pub encrypted_challenge: Vec<u8>,
}

impl Packet for ServerboundKeyPacket {
    const ID: i32 = 0x01;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let encrypted_shared_secret = types::read_byte_array(reader)?;
        let encrypted_challenge = types::read_byte_array(reader)?;
        Ok(ServerboundKeyPacket {
            encrypted_shared_secret,
            encrypted_challenge,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        types::write_byte_array(&self.encrypted_shared_secret, writer)?;
        types::write_byte_array(&self.encrypted_challenge, writer)
    }
}

impl ServerboundPacket for ServerboundKeyPacket {}

/// `LoginCompression` ("Set Compression") — arms the compression envelope.
#[derive(Debug, Clone)]
pub struct LoginCompressionPacket {
    /// Packets at or above this serialized size get zlib-compressed.
    pub threshold: i32,
}

impl Packet for LoginCompressionPacket {
    const ID: i32 = 0x03;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(LoginCompressionPacket {
            threshold: VarInt::read(reader)?.0,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        VarInt(self.threshold).write(writer)
    }
}

impl ClientboundPacket for LoginCompressionPacket {}

/// A single signed property on a [`GameProfilePacket`] (e.g. skin texture).
#[derive(Debug, Clone)]
pub struct ProfileProperty {
    /// Property key, e.g. `"textures"`.
    pub name: String,
    /// Property value, often base64-encoded JSON.
    pub value: String,
    /// Optional Mojang signature over `value`.
    pub signature: Option<String>,
}

impl ProfileProperty {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let name = McString::read(reader)?.0;
        let value = McString::read(reader)?.0;
        let signature = if types::read_bool(reader)? {
            Some(McString::read(reader)?.0)
        } else {
            None
        };
        Ok(ProfileProperty {
            name,
            value,
            signature,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        McString::from(self.name.as_str()).write(writer)?;
        McString::from(self.value.as_str()).write(writer)?;
        types::write_bool(self.signature.is_some(), writer)?;
        if let Some(sig) = &self.signature {
            McString::from(sig.as_str()).write(writer)?;
        }
        Ok(())
    }
}

/// `GameProfile` ("Login Success") — finalizes authentication, carries the
/// resolved UUID/username/skin the server assigned to this session.
#[derive(Debug, Clone)]
pub struct GameProfilePacket {
    /// Final UUID the server assigned this session.
    pub uuid: McUuid,
    /// Final username.
    pub username: String,
    /// Signed profile properties (skin, cape, ...).
    pub properties: Vec<ProfileProperty>,
}

impl Packet for GameProfilePacket {
    const ID: i32 = 0x02;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let uuid = types::read_uuid(reader)?;
        let username = McString::read_with_max_length(reader, 16)?.0;
        let count = VarInt::read(reader)?.0;
        let mut properties = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            properties.push(ProfileProperty::read(reader)?);
        }
        Ok(GameProfilePacket {
            uuid,
            username,
            properties,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        types::write_uuid(&self.uuid, writer)?;
        McString::from(self.username.as_str()).write(writer)?;
        VarInt(self.properties.len() as i32).write(writer)?;
        for property in &self.properties {
            property.write(writer)?;
        }
        Ok(())
    }
}

impl ClientboundPacket for GameProfilePacket {}

/// `LoginAcknowledged` (serverbound) — empty body; transitions Login ->
/// Configuration for protocol > 763.
#[derive(Debug, Clone, Default)]
pub struct LoginAcknowledgedPacket;

impl Packet for LoginAcknowledgedPacket {
    const ID: i32 = 0x03;

    fn read<R: Read>(_reader: &mut R) -> Result<Self> {
        Ok(LoginAcknowledgedPacket)
    }

    fn write<W: Write>(&self, _writer: &mut W) -> Result<()> {
        Ok(())
    }
}

impl ServerboundPacket for LoginAcknowledgedPacket {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn hello_round_trips() {
        let packet = ServerboundHelloPacket {
            name: "Steve".into(),
            profile_id: McUuid::nil(),
        };
        let mut buf = Vec::new();
        packet.write(&mut buf).unwrap();
        let decoded = ServerboundHelloPacket::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded.name, "Steve");
    }

    #[test]
    fn encryption_request_round_trips() {
        let packet = ClientboundHelloPacket {
            server_id: String::new(),
            public_key: vec![1, 2, 3],
            challenge: vec![4, 5, 6, 7],
            should_authenticate: true,
        };
        let mut buf = Vec::new();
        packet.write(&mut buf).unwrap();
        let decoded = ClientboundHelloPacket::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded.public_key, vec![1, 2, 3]);
        assert_eq!(decoded.challenge, vec![4, 5, 6, 7]);
        assert!(decoded.should_authenticate);
    }
}
