//! Packet factory (component D support): given a connection's current
//! state, the direction of travel, and a packet id, decides whether a
//! concrete Rust type exists for that packet and decodes it.
//!
//! Returning `Ok(None)` is the common case and is not an error: it means
//! "no handler cares about this packet", and [`crate::proxy::minecraft`]
//! forwards the original bytes byte-exact without further interpretation,
//! mirroring vanilla's pass-through-by-default behavior for anything
//! unparseable or simply unmodeled.

use std::io::Cursor;

use crate::error::Result;
use crate::proto::packet::Packet;
use crate::proto::packets::configuration::{
    ClientboundFinishConfigurationPacket, ClientboundTransferConfigurationPacket,
    ServerboundConfigurationAcknowledgedPacket, ServerboundFinishConfigurationPacket,
};
use crate::proto::packets::handshake::ClientIntentionPacket;
use crate::proto::packets::login::{
    ClientboundHelloPacket, GameProfilePacket, LoginAcknowledgedPacket, LoginCompressionPacket,
    ServerboundHelloPacket, ServerboundKeyPacket,
};
use crate::proto::packets::play::{
    ClientboundLoginPlayPacket, ClientboundPlayerChatPacket, ClientboundTransferPacket,
    ServerboundChatAckPacket, ServerboundChatCommandSignedPacket, ServerboundChatPacket,
    ServerboundChatSessionUpdatePacket,
};
use crate::proto::packets::status::{
    PingRequestPacket, PongResponsePacket, StatusRequestPacket, StatusResponsePacket,
};
use crate::proto::{ConnectionState, Direction};

/// Any packet the factory knows how to decode, tagged by its concrete type.
/// Handlers in [`crate::proxy::handlers`] match on this rather than probing
/// ids themselves.
#[derive(Debug, Clone)]
pub enum DecodedPacket {
    Intention(ClientIntentionPacket),
    StatusRequest(StatusRequestPacket),
    StatusResponse(StatusResponsePacket),
    PingRequest(PingRequestPacket),
    PongResponse(PongResponsePacket),
    Hello(ServerboundHelloPacket),
    ClientboundHello(ClientboundHelloPacket),
    Key(ServerboundKeyPacket),
    LoginCompression(LoginCompressionPacket),
    GameProfile(GameProfilePacket),
    LoginAcknowledged(LoginAcknowledgedPacket),
    ClientboundFinishConfiguration(ClientboundFinishConfigurationPacket),
    ServerboundFinishConfiguration(ServerboundFinishConfigurationPacket),
    ConfigurationAcknowledged(ServerboundConfigurationAcknowledgedPacket),
    TransferConfiguration(ClientboundTransferConfigurationPacket),
    LoginPlay(ClientboundLoginPlayPacket),
    ChatSessionUpdate(ServerboundChatSessionUpdatePacket),
    Chat(ServerboundChatPacket),
    ChatCommandSigned(ServerboundChatCommandSignedPacket),
    PlayerChat(ClientboundPlayerChatPacket),
    ChatAck(ServerboundChatAckPacket),
    Transfer(ClientboundTransferPacket),
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn last_seen_json(entries: &[crate::proto::packets::play::LastSeenEntry]) -> serde_json::Value {
    serde_json::Value::Array(
        entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "profile_id": e.profile_id.to_string(),
                    "signature": hex(&e.signature),
                })
            })
            .collect(),
    )
}

impl DecodedPacket {
    /// A structured field dump used by the Logger's "detailed" sink variant
    /// (§4.7): `serde_json::to_string_pretty` of this value. Not a faithful
    /// `Serialize` derive over the packet structs themselves, since a couple
    /// of fields (256-byte signature arrays) fall outside what serde's
    /// blanket array impls cover; fields meaningful to a human reading the
    /// log are surfaced explicitly instead, with bulk opaque tails omitted.
    pub fn describe(&self) -> serde_json::Value {
        match self {
            DecodedPacket::Intention(p) => serde_json::json!({
                "protocol_version": p.protocol_version,
                "server_address": p.server_address,
                "server_port": p.server_port,
                "intent": p.intent,
            }),
            DecodedPacket::StatusRequest(_) => serde_json::json!({}),
            DecodedPacket::StatusResponse(p) => serde_json::json!({ "json": p.json }),
            DecodedPacket::PingRequest(p) => serde_json::json!({ "payload": p.payload }),
            DecodedPacket::PongResponse(p) => serde_json::json!({ "payload": p.payload }),
            DecodedPacket::Hello(p) => serde_json::json!({
                "name": p.name,
                "profile_id": p.profile_id.to_string(),
            }),
            DecodedPacket::ClientboundHello(p) => serde_json::json!({
                "server_id": p.server_id,
                "public_key_len": p.public_key.len(),
                "challenge": hex(&p.challenge),
                "should_authenticate": p.should_authenticate,
            }),
            DecodedPacket::Key(p) => serde_json::json!({
                "encrypted_shared_secret_len": p.encrypted_shared_secret.len(),
                "encrypted_challenge_len": p.encrypted_challenge.len(),
            }),
            DecodedPacket::LoginCompression(p) => serde_json::json!({ "threshold": p.threshold }),
            DecodedPacket::GameProfile(p) => serde_json::json!({
                "uuid": p.uuid.to_string(),
                "username": p.username,
                "property_count": p.properties.len(),
            }),
            DecodedPacket::LoginAcknowledged(_) => serde_json::json!({}),
            DecodedPacket::ClientboundFinishConfiguration(_) => serde_json::json!({}),
            DecodedPacket::ServerboundFinishConfiguration(_) => serde_json::json!({}),
            DecodedPacket::ConfigurationAcknowledged(_) => serde_json::json!({}),
            DecodedPacket::TransferConfiguration(p) => serde_json::json!({
                "host": p.host,
                "port": p.port,
            }),
            DecodedPacket::LoginPlay(p) => serde_json::json!({
                "entity_id": p.entity_id,
                "tail_len": p.tail.len(),
            }),
            DecodedPacket::ChatSessionUpdate(p) => serde_json::json!({
                "session_id": p.session_id.to_string(),
                "key_expiry_ms": p.key_expiry_ms,
                "public_key_len": p.public_key.len(),
            }),
            DecodedPacket::Chat(p) => serde_json::json!({
                "message": p.message,
                "timestamp": p.timestamp,
                "salt": p.salt,
                "signed": p.signature.is_some(),
                "last_seen": last_seen_json(&p.last_seen),
            }),
            DecodedPacket::ChatCommandSigned(p) => serde_json::json!({
                "command": p.command,
                "timestamp": p.timestamp,
                "salt": p.salt,
                "argument_count": p.argument_signatures.len(),
                "last_seen": last_seen_json(&p.last_seen),
            }),
            DecodedPacket::PlayerChat(p) => serde_json::json!({
                "sender": p.sender.to_string(),
                "index": p.index,
                "signed": p.signature.is_some(),
                "tail_len": p.tail.len(),
            }),
            DecodedPacket::ChatAck(p) => serde_json::json!({ "offset": p.offset }),
            DecodedPacket::Transfer(p) => serde_json::json!({
                "host": p.host,
                "port": p.port,
            }),
        }
    }

    /// The packet's stable name, used as a Logger/statistics key and in text
    /// log lines.
    pub fn name(&self) -> &'static str {
        match self {
            DecodedPacket::Intention(_) => "ClientIntention",
            DecodedPacket::StatusRequest(_) => "StatusRequest",
            DecodedPacket::StatusResponse(_) => "StatusResponse",
            DecodedPacket::PingRequest(_) => "PingRequest",
            DecodedPacket::PongResponse(_) => "PongResponse",
            DecodedPacket::Hello(_) => "ServerboundHello",
            DecodedPacket::ClientboundHello(_) => "ClientboundHello",
            DecodedPacket::Key(_) => "ServerboundKey",
            DecodedPacket::LoginCompression(_) => "LoginCompression",
            DecodedPacket::GameProfile(_) => "GameProfile",
            DecodedPacket::LoginAcknowledged(_) => "LoginAcknowledged",
            DecodedPacket::ClientboundFinishConfiguration(_) => "ClientboundFinishConfiguration",
            DecodedPacket::ServerboundFinishConfiguration(_) => "ServerboundFinishConfiguration",
            DecodedPacket::ConfigurationAcknowledged(_) => "ConfigurationAcknowledged",
            DecodedPacket::TransferConfiguration(_) => "ClientboundTransferConfiguration",
            DecodedPacket::LoginPlay(_) => "ClientboundLoginPlay",
            DecodedPacket::ChatSessionUpdate(_) => "ServerboundChatSessionUpdate",
            DecodedPacket::Chat(_) => "ServerboundChat",
            DecodedPacket::ChatCommandSigned(_) => "ServerboundChatCommandSigned",
            DecodedPacket::PlayerChat(_) => "ClientboundPlayerChat",
            DecodedPacket::ChatAck(_) => "ServerboundChatAck",
            DecodedPacket::Transfer(_) => "ClientboundTransfer",
        }
    }
}

/// Decodes `body` into a [`DecodedPacket`] if `(state, direction, id)`
/// names a packet the proxy actively handles, else `Ok(None)`.
pub fn decode(
    state: ConnectionState,
    direction: Direction,
    id: i32,
    body: &[u8],
) -> Result<Option<DecodedPacket>> {
    use ConnectionState::*;
    use Direction::*;

    let mut cursor = Cursor::new(body);

    let packet = match (state, direction, id) {
        (Handshake, Serverbound, ClientIntentionPacket::ID) => {
            DecodedPacket::Intention(ClientIntentionPacket::read(&mut cursor)?)
        }

        (Status, Serverbound, StatusRequestPacket::ID) => {
            DecodedPacket::StatusRequest(StatusRequestPacket::read(&mut cursor)?)
        }
        (Status, Clientbound, StatusResponsePacket::ID) => {
            DecodedPacket::StatusResponse(StatusResponsePacket::read(&mut cursor)?)
        }
        (Status, Serverbound, PingRequestPacket::ID) => {
            DecodedPacket::PingRequest(PingRequestPacket::read(&mut cursor)?)
        }
        (Status, Clientbound, PongResponsePacket::ID) => {
            DecodedPacket::PongResponse(PongResponsePacket::read(&mut cursor)?)
        }

        (Login, Serverbound, ServerboundHelloPacket::ID) => {
            DecodedPacket::Hello(ServerboundHelloPacket::read(&mut cursor)?)
        }
        (Login, Clientbound, ClientboundHelloPacket::ID) => {
            DecodedPacket::ClientboundHello(ClientboundHelloPacket::read(&mut cursor)?)
        }
        (Login, Serverbound, ServerboundKeyPacket::ID) => {
            DecodedPacket::Key(ServerboundKeyPacket::read(&mut cursor)?)
        }
        (Login, Clientbound, LoginCompressionPacket::ID) => {
            DecodedPacket::LoginCompression(LoginCompressionPacket::read(&mut cursor)?)
        }
        (Login, Clientbound, GameProfilePacket::ID) => {
            DecodedPacket::GameProfile(GameProfilePacket::read(&mut cursor)?)
        }
        (Login, Serverbound, LoginAcknowledgedPacket::ID) => {
            DecodedPacket::LoginAcknowledged(LoginAcknowledgedPacket::read(&mut cursor)?)
        }

        (Configuration, Clientbound, ClientboundFinishConfigurationPacket::ID) => {
            DecodedPacket::ClientboundFinishConfiguration(
                ClientboundFinishConfigurationPacket::read(&mut cursor)?,
            )
        }
        (Configuration, Serverbound, ServerboundFinishConfigurationPacket::ID) => {
            DecodedPacket::ServerboundFinishConfiguration(
                ServerboundFinishConfigurationPacket::read(&mut cursor)?,
            )
        }
        (Configuration, Clientbound, ClientboundTransferConfigurationPacket::ID) => {
            DecodedPacket::TransferConfiguration(ClientboundTransferConfigurationPacket::read(
                &mut cursor,
            )?)
        }
        (Play, Serverbound, ServerboundConfigurationAcknowledgedPacket::ID) => {
            DecodedPacket::ConfigurationAcknowledged(
                ServerboundConfigurationAcknowledgedPacket::read(&mut cursor)?,
            )
        }

        (Play, Clientbound, ClientboundLoginPlayPacket::ID) => {
            DecodedPacket::LoginPlay(ClientboundLoginPlayPacket::read(&mut cursor)?)
        }
        (Play, Serverbound, ServerboundChatSessionUpdatePacket::ID) => {
            DecodedPacket::ChatSessionUpdate(ServerboundChatSessionUpdatePacket::read(
                &mut cursor,
            )?)
        }
        (Play, Serverbound, ServerboundChatPacket::ID) => {
            DecodedPacket::Chat(ServerboundChatPacket::read(&mut cursor)?)
        }
        (Play, Serverbound, ServerboundChatCommandSignedPacket::ID) => {
            DecodedPacket::ChatCommandSigned(ServerboundChatCommandSignedPacket::read(
                &mut cursor,
            )?)
        }
        (Play, Clientbound, ClientboundPlayerChatPacket::ID) => {
            DecodedPacket::PlayerChat(ClientboundPlayerChatPacket::read(&mut cursor)?)
        }
        (Play, Serverbound, ServerboundChatAckPacket::ID) => {
            DecodedPacket::ChatAck(ServerboundChatAckPacket::read(&mut cursor)?)
        }
        (Play, Clientbound, ClientboundTransferPacket::ID) => {
            DecodedPacket::Transfer(ClientboundTransferPacket::read(&mut cursor)?)
        }

        _ => return Ok(None),
    };

    Ok(Some(packet))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmodeled_packet_decodes_to_none() {
        let decoded = decode(ConnectionState::Play, Direction::Clientbound, 0x7F, &[]).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn status_request_decodes() {
        let decoded = decode(ConnectionState::Status, Direction::Serverbound, 0x00, &[]).unwrap();
        assert!(matches!(decoded, Some(DecodedPacket::StatusRequest(_))));
    }
}
