//! `MinecraftProxy` (components E/F): the protocol-aware [`ProcessData`]
//! implementation plugged into [`crate::proxy::base::ProxyCore`]. Owns the
//! per-session protocol state machine, the compression envelope, the chat
//! signing/acknowledgement bookkeeping, and the handles to the domain
//! Logger and replay recorder every decoded frame is reported to.
//!
//! One frame at a time: [`ProcessData::process_data`] loops over whatever
//! got handed to it, decoding and dispatching complete frames and leaving a
//! trailing partial frame for the next call, mirroring `BaseProxy.cpp`'s own
//! "consume everything you can, leave the remainder" contract.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::auth::{Authenticator, ChatContext};
use crate::capture::logger::{LogItem, LoggerHandle};
use crate::capture::replay::ReplayHandle;
use crate::capture::stats;
use crate::error::Result;
use crate::proto::compression::Compression;
use crate::proto::factory::{self, DecodedPacket};
use crate::proto::frame::{self, FrameLength};
use crate::proto::packet::Packet;
use crate::proto::types::{McString, McUuid};
use crate::proto::{ConnectionState, Direction, Endpoint, ProtocolState, MAX_COMPRESSED_PACKET_LEN};
use crate::proxy::base::{ProcessData, ProxyContext};

/// Shared table a `MinecraftProxy` populates when it handles a transfer
/// packet, and the listener consults on each new accepted connection to
/// decide which upstream host/port to dial for a client that was
/// previously redirected. Keyed by the real client's IP, since a transfer
/// always causes the client to reconnect to this same proxy port.
pub type TransferTable = Arc<Mutex<HashMap<IpAddr, (String, u16)>>>;

/// Protocol-aware per-session proxy state.
pub struct MinecraftProxy {
    pub(crate) protocol: ProtocolState,
    pub(crate) compression: Option<Compression>,
    pub(crate) authenticator: Arc<dyn Authenticator>,
    pub(crate) chat_context: ChatContext,
    pub(crate) chat_session_uuid: Option<McUuid>,
    pub(crate) message_sent_index: i64,
    logger: LoggerHandle,
    replay: Option<ReplayHandle>,
    pub(crate) real_server_host: String,
    pub(crate) real_server_port: u16,
    pub(crate) proxy_public_host: String,
    pub(crate) proxy_public_port: u16,
    pub(crate) transfer_table: TransferTable,
    pub(crate) client_ip: IpAddr,
    transmit_original_packet: bool,
}

impl MinecraftProxy {
    /// Builds a fresh, pre-handshake session. `real_server_host`/`_port` is
    /// the upstream the listener already dialed for this session;
    /// `proxy_public_host`/`_port` is the address a transferred client
    /// should reconnect to (this proxy's own listening address).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_ip: IpAddr,
        real_server_host: String,
        real_server_port: u16,
        proxy_public_host: String,
        proxy_public_port: u16,
        authenticator: Arc<dyn Authenticator>,
        logger: LoggerHandle,
        replay: Option<ReplayHandle>,
        transfer_table: TransferTable,
    ) -> Self {
        MinecraftProxy {
            protocol: ProtocolState::new(),
            compression: None,
            authenticator,
            chat_context: ChatContext::new(),
            chat_session_uuid: None,
            message_sent_index: 0,
            logger,
            replay,
            real_server_host,
            real_server_port,
            proxy_public_host,
            proxy_public_port,
            transfer_table,
            client_ip,
            transmit_original_packet: true,
        }
    }

    /// Builds a complete frame (length prefix, compression envelope if
    /// armed) from a packet id and its field bytes.
    pub(crate) fn build_frame(&mut self, packet_id: i32, fields: &[u8]) -> Result<Vec<u8>> {
        frame::encode_frame(packet_id, fields, self.compression.as_mut())
    }

    /// Suppresses the frame currently being processed: the raw bytes will
    /// not be forwarded, and the Logger will tag this entry as consumed by
    /// the proxy rather than genuinely observed.
    pub(crate) fn suppress_original(&mut self) {
        self.transmit_original_packet = false;
    }

    /// Logs a packet this session injected itself, rather than one observed
    /// on the wire: zero bandwidth, origin tagged
    /// `SniffcraftToServer`/`SniffcraftToClient`. `fields` are the
    /// serialized packet body, carried through so the binary sink can
    /// capture synthesized packets exactly like genuinely observed ones.
    pub(crate) fn log_injected(&self, key: &str, id: i32, origin: Endpoint, fields: Vec<u8>) {
        self.logger.log(LogItem {
            key: key.to_string(),
            id,
            state: self.protocol.state,
            origin,
            bandwidth_bytes: 0,
            detail: None,
            raw_frame: Some(fields),
            timestamp: SystemTime::now(),
        });
    }

    /// Records an injected clientbound packet into the replay capture, same
    /// as a genuine server packet would be, since a replacement is still
    /// part of what the real client actually saw.
    pub(crate) fn record_replay(&self, id: i32, fields: &[u8]) {
        if let (Some(replay), Ok(id_fields)) = (&self.replay, frame::encode_id_fields(id, fields)) {
            replay.record(id_fields);
        }
    }

    fn dispatch(&mut self, ctx: &ProxyContext, packet: &DecodedPacket) {
        match packet {
            DecodedPacket::Intention(p) => self.handle_client_intention(ctx, p),
            DecodedPacket::Hello(p) => self.handle_serverbound_hello(ctx, p),
            DecodedPacket::LoginCompression(p) => self.handle_login_compression(p),
            DecodedPacket::GameProfile(_) => self.handle_game_profile(),
            DecodedPacket::LoginAcknowledged(_) => {
                self.protocol.transition_to(ConnectionState::Configuration)
            }
            DecodedPacket::ClientboundHello(p) => self.handle_clientbound_hello(ctx, p),
            DecodedPacket::LoginPlay(_) => self.handle_clientbound_login_play(ctx),
            DecodedPacket::ServerboundFinishConfiguration(_) => {
                self.protocol.transition_to(ConnectionState::Play)
            }
            DecodedPacket::ConfigurationAcknowledged(_) => {
                self.protocol.transition_to(ConnectionState::Configuration)
            }
            DecodedPacket::Chat(p) => self.handle_serverbound_chat(ctx, p),
            DecodedPacket::ChatCommandSigned(p) => self.handle_serverbound_chat_command(ctx, p),
            DecodedPacket::PlayerChat(p) => self.handle_clientbound_player_chat(ctx, p),
            DecodedPacket::TransferConfiguration(p) => {
                self.handle_clientbound_transfer_configuration(ctx, p)
            }
            DecodedPacket::Transfer(p) => self.handle_clientbound_transfer(ctx, p),
            _ => {}
        }
    }

    /// Parses and dispatches exactly one complete frame from the front of
    /// `data`, returning its total byte size, or `0` if `data` doesn't yet
    /// hold a complete frame.
    fn process_one_frame(&mut self, ctx: &ProxyContext, origin: Endpoint, data: &[u8]) -> usize {
        let (prefix_len, payload_len) = match frame::peek_frame_length(data) {
            Ok(FrameLength::Incomplete) => return 0,
            Ok(FrameLength::Known {
                prefix_len,
                payload_len,
            }) => (prefix_len, payload_len),
            Err(e) => {
                tracing::warn!(error = %e, "malformed frame length prefix, closing connection");
                ctx.client.close();
                ctx.server.close();
                return data.len();
            }
        };

        let total = prefix_len + payload_len;
        if data.len() < total {
            return 0;
        }

        if payload_len > MAX_COMPRESSED_PACKET_LEN {
            tracing::warn!(payload_len, "frame exceeds maximum size, closing connection");
            ctx.client.close();
            ctx.server.close();
            return total;
        }

        let payload = &data[prefix_len..total];
        let (packet_id, fields) = match frame::decode_payload(payload, self.compression.as_mut()) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "fatal frame decompression error, closing connection");
                ctx.client.close();
                ctx.server.close();
                return total;
            }
        };

        let direction = match origin {
            Endpoint::Client => Direction::Serverbound,
            Endpoint::Server => Direction::Clientbound,
            _ => return total,
        };

        let state_before = self.protocol.state;
        let decoded = match factory::decode(state_before, direction, packet_id, &fields) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, packet_id, "failed to parse known packet, forwarding unchanged");
                None
            }
        };

        self.transmit_original_packet = true;
        if let Some(packet) = &decoded {
            self.dispatch(ctx, packet);
        }

        let key = match &decoded {
            Some(p) => stats::stats_key(p.name(), None),
            None => custom_payload_key(state_before, direction, packet_id, &fields)
                .unwrap_or_else(|| format!("Unknown(0x{packet_id:02x})")),
        };

        let logged_origin = if self.transmit_original_packet {
            origin
        } else {
            match origin {
                Endpoint::Client => Endpoint::ClientToSniffcraft,
                Endpoint::Server => Endpoint::ServerToSniffcraft,
                other => other,
            }
        };

        if self.transmit_original_packet && origin == Endpoint::Server {
            if let (Some(replay), Ok(id_fields)) = (&self.replay, frame::encode_id_fields(packet_id, &fields)) {
                replay.record(id_fields);
            }
        }

        self.logger.log(LogItem {
            key,
            id: packet_id,
            state: state_before,
            origin: logged_origin,
            bandwidth_bytes: total as u64,
            detail: decoded.as_ref().map(|p| p.describe()),
            raw_frame: Some(fields),
            timestamp: SystemTime::now(),
        });

        if self.transmit_original_packet {
            let raw = data[..total].to_vec();
            match origin {
                Endpoint::Client => ctx.server.write(raw, true),
                Endpoint::Server => ctx.client.write(raw, true),
                _ => {}
            }
        }

        total
    }
}

/// Peeks a plugin-channel identifier out of an unmodeled `CustomPayload`
/// frame so the statistics/logger key can carry it, without promoting the
/// packet to a [`DecodedPacket`] variant (the proxy never rewrites these).
fn custom_payload_key(
    state: ConnectionState,
    direction: Direction,
    packet_id: i32,
    fields: &[u8],
) -> Option<String> {
    use crate::proto::packets::play::{ClientboundCustomPayloadPacket, ServerboundCustomPayloadPacket};

    if state != ConnectionState::Play {
        return None;
    }

    let mut cursor = std::io::Cursor::new(fields);
    let (name, channel) = match (direction, packet_id) {
        (Direction::Serverbound, id) if id == ServerboundCustomPayloadPacket::ID => {
            ("ServerboundCustomPayload", McString::read(&mut cursor).ok()?.0)
        }
        (Direction::Clientbound, id) if id == ClientboundCustomPayloadPacket::ID => {
            ("ClientboundCustomPayload", McString::read(&mut cursor).ok()?.0)
        }
        _ => return None,
    };

    Some(stats::stats_key(name, Some(&channel)))
}

impl ProcessData for MinecraftProxy {
    fn process_data(&mut self, ctx: &ProxyContext, origin: Endpoint, data: &[u8]) -> usize {
        let mut offset = 0;
        loop {
            let consumed = self.process_one_frame(ctx, origin, &data[offset..]);
            if consumed == 0 {
                break;
            }
            offset += consumed;
        }
        offset
    }
}

/// Runs an `async` authenticator call from inside the synchronous
/// [`ProcessData::process_data`] path. Blocks this session's single parser
/// task until the call resolves; acceptable since it only happens during
/// login and chat signing, both low-frequency, and never blocks other
/// sessions' tasks.
pub(crate) fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
}
