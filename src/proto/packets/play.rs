//! Play-state packets the proxy actively rewrites or whose fields the
//! chat-signing handlers need to inspect. Every other Play packet
//! (the overwhelming majority of the protocol's surface: entity movement,
//! block updates, inventories, sounds...) has no factory entry and is
//! forwarded byte-exact by the default "unknown id" path in
//! [`crate::proxy::minecraft`] — parsing those would add bulk without
//! changing proxy behavior, since none of them are rewritten.
//!
//! A handful of structs here (`ClientboundLoginPlayPacket`,
//! `ClientboundPlayerChatPacket`) only decode their leading fields and keep
//! the remainder as an opaque `tail`, because the proxy only ever needs to
//! read a prefix of them (to trigger a handler) and re-emits the rest
//! byte-exact.

use crate::error::{RelayError, Result};
use crate::proto::packet::{ClientboundPacket, Packet, ServerboundPacket};
use crate::proto::types::{self, McString, McUuid};
use crate::proto::varint::VarInt;
use std::io::{Read, Write};

fn read_to_end<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut tail = Vec::new();
    reader.read_to_end(&mut tail)?;
    Ok(tail)
}

/// A chat-signature entry as exchanged in `last_seen`/`last_received`
/// fields: a profile UUID plus its 256-byte RSA signature. This models the
/// "full update" shape `Authentifier`/`ChatContext` build; it simplifies
/// vanilla's compact index-or-literal encoding, which the proxy never needs
/// to interpret beyond acknowledgement bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastSeenEntry {
    /// Sender profile UUID.
    pub profile_id: McUuid,
    /// 256-byte RSA-SHA256 signature.
    pub signature: [u8; 256],
}

impl LastSeenEntry {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let profile_id = types::read_uuid(reader)?;
        let signature = types::read_fixed_bytes::<_, 256>(reader)?;
        Ok(LastSeenEntry {
            profile_id,
            signature,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        types::write_uuid(&self.profile_id, writer)?;
        writer.write_all(&self.signature)?;
        Ok(())
    }
}

fn read_last_seen<R: Read>(reader: &mut R) -> Result<Vec<LastSeenEntry>> {
    let count = VarInt::read(reader)?.0;
    if !(0..=4096).contains(&count) {
        return Err(RelayError::Protocol("invalid last-seen count".into()));
    }
    (0..count).map(|_| LastSeenEntry::read(reader)).collect()
}

fn write_last_seen<W: Write>(entries: &[LastSeenEntry], writer: &mut W) -> Result<()> {
    VarInt(entries.len() as i32).write(writer)?;
    for entry in entries {
        entry.write(writer)?;
    }
    Ok(())
}

/// `ClientboundLogin` ("Login (play)") — joins the world. The proxy only
/// cares that this packet exists (to trigger the chat-session handler);
/// its large field list (dimension, view distance, game rules...) is kept
/// as an opaque tail and forwarded unchanged.
#[derive(Debug, Clone)]
pub struct ClientboundLoginPlayPacket {
    /// Entity id assigned to the player.
    pub entity_id: i32,
    /// Everything after `entity_id`, unparsed.
    pub tail: Vec<u8>,
}

impl Packet for ClientboundLoginPlayPacket {
    const ID: i32 = 0x2B;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = [0u8; 4];
        reader.read_exact(&mut bytes)?;
        let entity_id = i32::from_be_bytes(bytes);
        let tail = read_to_end(reader)?;
        Ok(ClientboundLoginPlayPacket { entity_id, tail })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.entity_id.to_be_bytes())?;
        writer.write_all(&self.tail)?;
        Ok(())
    }
}

impl ClientboundPacket for ClientboundLoginPlayPacket {}

/// `ServerboundChatSessionUpdate` — announces the proxy's synthesized chat
/// session UUID and signing key to the server, sent in response to the
/// `ClientboundLogin` handler's synthesized session.
#[derive(Debug, Clone)]
pub struct ServerboundChatSessionUpdatePacket {
    /// Freshly generated chat session UUID.
    pub session_id: McUuid,
    /// Unix ms timestamp the signing key was generated/expires.
    pub key_expiry_ms: i64,
    /// DER-encoded RSA public signing key.
    pub public_key: Vec<u8>,
    /// Mojang signature over the public key.
    pub key_signature: Vec<u8>,
}

impl Packet for ServerboundChatSessionUpdatePacket {
    const ID: i32 = 0x08;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let session_id = types::read_uuid(reader)?;
        let key_expiry_ms = types::read_long(reader)?;
        let public_key = types::read_byte_array(reader)?;
        let key_signature = types::read_byte_array(reader)?;
        Ok(ServerboundChatSessionUpdatePacket {
            session_id,
            key_expiry_ms,
            public_key,
            key_signature,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        types::write_uuid(&self.session_id, writer)?;
        types::write_long(self.key_expiry_ms, writer)?;
        types::write_byte_array(&self.public_key, writer)?;
        types::write_byte_array(&self.key_signature, writer)
    }
}

impl ServerboundPacket for ServerboundChatSessionUpdatePacket {}

/// `ServerboundChat` — a regular chat message, re-signed by the
/// `ServerboundChat` handler.
#[derive(Debug, Clone)]
pub struct ServerboundChatPacket {
    /// Plain chat text.
    pub message: String,
    /// Signing timestamp (ms since epoch).
    pub timestamp: i64,
    /// Signing salt.
    pub salt: i64,
    /// Message signature, absent only for unsigned/system-relayed chat.
    pub signature: Option<[u8; 256]>,
    /// Messages the sender acknowledges having seen.
    pub last_seen: Vec<LastSeenEntry>,
}

impl Packet for ServerboundChatPacket {
    const ID: i32 = 0x06;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let message = McString::read_with_max_length(reader, 256)?.0;
        let timestamp = types::read_long(reader)?;
        let salt = types::read_long(reader)?;
        let has_signature = types::read_bool(reader)?;
        let signature = if has_signature {
            Some(types::read_fixed_bytes::<_, 256>(reader)?)
        } else {
            None
        };
        let last_seen = read_last_seen(reader)?;
        Ok(ServerboundChatPacket {
            message,
            timestamp,
            salt,
            signature,
            last_seen,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        McString::from(self.message.as_str()).write(writer)?;
        types::write_long(self.timestamp, writer)?;
        types::write_long(self.salt, writer)?;
        types::write_bool(self.signature.is_some(), writer)?;
        if let Some(sig) = &self.signature {
            writer.write_all(sig)?;
        }
        write_last_seen(&self.last_seen, writer)
    }
}

impl ServerboundPacket for ServerboundChatPacket {}

/// `ServerboundChatCommandSigned` — a `/command` invocation with per-argument
/// signatures, used for protocol > 765 (the post-1.20.4 variant).
#[derive(Debug, Clone)]
pub struct ServerboundChatCommandSignedPacket {
    /// Command text, without the leading `/`.
    pub command: String,
    /// Signing timestamp.
    pub timestamp: i64,
    /// Signing salt.
    pub salt: i64,
    /// Per-argument signatures, forwarded unchanged.
    pub argument_signatures: Vec<(String, [u8; 256])>,
    /// Messages the sender acknowledges having seen; rewritten by the
    /// handler while argument signatures pass through untouched.
    pub last_seen: Vec<LastSeenEntry>,
}

impl Packet for ServerboundChatCommandSignedPacket {
    const ID: i32 = 0x05;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let command = McString::read_with_max_length(reader, 256)?.0;
        let timestamp = types::read_long(reader)?;
        let salt = types::read_long(reader)?;

        let arg_count = VarInt::read(reader)?.0;
        if !(0..=256).contains(&arg_count) {
            return Err(RelayError::Protocol("invalid argument signature count".into()));
        }
        let mut argument_signatures = Vec::with_capacity(arg_count as usize);
        for _ in 0..arg_count {
            let name = McString::read_with_max_length(reader, 16)?.0;
            let sig = types::read_fixed_bytes::<_, 256>(reader)?;
            argument_signatures.push((name, sig));
        }

        let last_seen = read_last_seen(reader)?;

        Ok(ServerboundChatCommandSignedPacket {
            command,
            timestamp,
            salt,
            argument_signatures,
            last_seen,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        McString::from(self.command.as_str()).write(writer)?;
        types::write_long(self.timestamp, writer)?;
        types::write_long(self.salt, writer)?;

        VarInt(self.argument_signatures.len() as i32).write(writer)?;
        for (name, sig) in &self.argument_signatures {
            McString::from(name.as_str()).write(writer)?;
            writer.write_all(sig)?;
        }

        write_last_seen(&self.last_seen, writer)
    }
}

impl ServerboundPacket for ServerboundChatCommandSignedPacket {}

/// `ClientboundPlayerChat` — a chat message broadcast to this client. Only
/// the sender UUID, index and optional signature are decoded; the rest
/// (formatted content, chat type) is kept as an opaque tail.
#[derive(Debug, Clone)]
pub struct ClientboundPlayerChatPacket {
    /// Sending player's UUID.
    pub sender: McUuid,
    /// Monotonic per-session message index.
    pub index: i32,
    /// Message signature, if this chat was cryptographically signed.
    pub signature: Option<[u8; 256]>,
    /// Remaining fields (body, formatting, chat type), unparsed.
    pub tail: Vec<u8>,
}

impl Packet for ClientboundPlayerChatPacket {
    const ID: i32 = 0x3A;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let sender = types::read_uuid(reader)?;
        let index = VarInt::read(reader)?.0;
        let has_signature = types::read_bool(reader)?;
        let signature = if has_signature {
            Some(types::read_fixed_bytes::<_, 256>(reader)?)
        } else {
            None
        };
        let tail = read_to_end(reader)?;
        Ok(ClientboundPlayerChatPacket {
            sender,
            index,
            signature,
            tail,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        types::write_uuid(&self.sender, writer)?;
        VarInt(self.index).write(writer)?;
        types::write_bool(self.signature.is_some(), writer)?;
        if let Some(sig) = &self.signature {
            writer.write_all(sig)?;
        }
        writer.write_all(&self.tail)?;
        Ok(())
    }
}

impl ClientboundPacket for ClientboundPlayerChatPacket {}

/// `ServerboundChatAck` — acknowledges having seen `offset` more messages
/// since the last acknowledgement.
#[derive(Debug, Clone)]
pub struct ServerboundChatAckPacket {
    /// Number of additional messages seen since the last ack.
    pub offset: i32,
}

impl Packet for ServerboundChatAckPacket {
    const ID: i32 = 0x07;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(ServerboundChatAckPacket {
            offset: VarInt::read(reader)?.0,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        VarInt(self.offset).write(writer)
    }
}

impl ServerboundPacket for ServerboundChatAckPacket {}

/// `ClientboundTransfer` (Play state) — redirects the client to another
/// server (protocol > 765).
#[derive(Debug, Clone)]
pub struct ClientboundTransferPacket {
    /// Target hostname.
    pub host: String,
    /// Target port.
    pub port: i32,
}

impl Packet for ClientboundTransferPacket {
    const ID: i32 = 0x0B;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let host = McString::read(reader)?.0;
        let port = VarInt::read(reader)?.0;
        Ok(ClientboundTransferPacket { host, port })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        McString::from(self.host.as_str()).write(writer)?;
        VarInt(self.port).write(writer)
    }
}

impl ClientboundPacket for ClientboundTransferPacket {}

/// `ClientboundTransferConfiguration` (Configuration state) — same
/// semantics as [`ClientboundTransferPacket`] but sent while still in the
/// Configuration phase.
#[derive(Debug, Clone)]
pub struct ClientboundTransferConfigurationPacket {
    /// Target hostname.
    pub host: String,
    /// Target port.
    pub port: i32,
}

impl Packet for ClientboundTransferConfigurationPacket {
    const ID: i32 = 0x0E;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let host = McString::read(reader)?.0;
        let port = VarInt::read(reader)?.0;
        Ok(ClientboundTransferConfigurationPacket { host, port })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        McString::from(self.host.as_str()).write(writer)?;
        VarInt(self.port).write(writer)
    }
}

impl ClientboundPacket for ClientboundTransferConfigurationPacket {}

/// `ServerboundCustomPayload` ("Plugin Message") — an opaque plugin-channel
/// message. Never rewritten; modeled only so the logger/statistics layer
/// can suffix its bucket key with the channel identifier per §3's
/// `NetworkRecapItem` note.
#[derive(Debug, Clone)]
pub struct ServerboundCustomPayloadPacket {
    /// Plugin channel identifier, e.g. `"minecraft:brand"`.
    pub channel: String,
    /// Opaque channel payload.
    pub data: Vec<u8>,
}

impl Packet for ServerboundCustomPayloadPacket {
    const ID: i32 = 0x19;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let channel = McString::read_with_max_length(reader, 32767)?.0;
        let data = read_to_end(reader)?;
        Ok(ServerboundCustomPayloadPacket { channel, data })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        McString::from(self.channel.as_str()).write(writer)?;
        writer.write_all(&self.data)?;
        Ok(())
    }
}

impl ServerboundPacket for ServerboundCustomPayloadPacket {}

/// `ClientboundCustomPayload` ("Plugin Message") — clientbound counterpart
/// of [`ServerboundCustomPayloadPacket`]. Same rationale: never rewritten,
/// modeled only for the channel-identifier statistics suffix.
#[derive(Debug, Clone)]
pub struct ClientboundCustomPayloadPacket {
    /// Plugin channel identifier.
    pub channel: String,
    /// Opaque channel payload.
    pub data: Vec<u8>,
}

impl Packet for ClientboundCustomPayloadPacket {
    const ID: i32 = 0x18;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let channel = McString::read_with_max_length(reader, 32767)?.0;
        let data = read_to_end(reader)?;
        Ok(ClientboundCustomPayloadPacket { channel, data })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        McString::from(self.channel.as_str()).write(writer)?;
        writer.write_all(&self.data)?;
        Ok(())
    }
}

impl ClientboundPacket for ClientboundCustomPayloadPacket {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn custom_payload_round_trips() {
        let packet = ServerboundCustomPayloadPacket {
            channel: "minecraft:brand".into(),
            data: vec![0x07, b'f', b'a', b'b', b'r', b'i', b'c'],
        };
        let mut buf = Vec::new();
        packet.write(&mut buf).unwrap();
        let decoded = ServerboundCustomPayloadPacket::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded.channel, "minecraft:brand");
        assert_eq!(decoded.data, vec![0x07, b'f', b'a', b'b', b'r', b'i', b'c']);
    }

    #[test]
    fn chat_ack_round_trips() {
        let packet = ServerboundChatAckPacket { offset: 65 };
        let mut buf = Vec::new();
        packet.write(&mut buf).unwrap();
        let decoded = ServerboundChatAckPacket::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded.offset, 65);
    }

    #[test]
    fn transfer_round_trips() {
        let packet = ClientboundTransferPacket {
            host: "other.server".into(),
            port: 25570,
        };
        let mut buf = Vec::new();
        packet.write(&mut buf).unwrap();
        let decoded = ClientboundTransferPacket::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded.host, "other.server");
        assert_eq!(decoded.port, 25570);
    }

    #[test]
    fn chat_round_trips_with_empty_last_seen() {
        let packet = ServerboundChatPacket {
            message: "hi".into(),
            timestamp: 0,
            salt: 0,
            signature: Some([7u8; 256]),
            last_seen: vec![],
        };
        let mut buf = Vec::new();
        packet.write(&mut buf).unwrap();
        let decoded = ServerboundChatPacket::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded.message, "hi");
        assert_eq!(decoded.signature, Some([7u8; 256]));
        assert!(decoded.last_seen.is_empty());
    }
}
