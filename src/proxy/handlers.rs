//! Packet-rewriting handlers (component F): one function per packet that
//! needs more than plain forwarding — key agreement, identity substitution,
//! chat re-signing, and transfer redirection. Each handler either leaves
//! the triggering frame to flow through [`MinecraftProxy::process_one_frame`]'s
//! default forwarding, or calls [`MinecraftProxy::suppress_original`] and
//! injects its own replacement onto the connection that needs it.

use uuid::Uuid;

use crate::crypto::cipher::Aes128Cfb8DataProcessor;
use crate::crypto::rsa_util;
use crate::proto::packet::Packet;
use crate::proto::packets::configuration::ClientboundTransferConfigurationPacket as ConfigTransfer;
use crate::proto::packets::handshake::{ClientIntentionPacket, Intent};
use crate::proto::packets::login::{
    ClientboundHelloPacket, LoginCompressionPacket, ServerboundHelloPacket, ServerboundKeyPacket,
};
use crate::proto::packets::play::{
    ClientboundPlayerChatPacket, ClientboundTransferPacket, LastSeenEntry, ServerboundChatAckPacket,
    ServerboundChatCommandSignedPacket, ServerboundChatPacket,
};
use crate::proto::{ConnectionState, Endpoint};
use crate::proxy::base::ProxyContext;
use crate::proxy::minecraft::{block_on, MinecraftProxy};

impl MinecraftProxy {
    /// Always suppressed: the real client's handshake is replaced with one
    /// pointing at the actual upstream server the listener dialed, carrying
    /// forward the protocol version and intent, and preserving any
    /// mod-loader NUL-suffix on the address.
    pub(crate) fn handle_client_intention(&mut self, ctx: &ProxyContext, p: &ClientIntentionPacket) {
        self.suppress_original();
        self.protocol.set_protocol_version(p.protocol_version);

        // The address/port the real client dialed us on, before we rewrite
        // it to point at the real upstream: this is what a later transfer
        // redirect sends the client back to.
        let public_host = p
            .server_address
            .split_once('\0')
            .map_or(p.server_address.as_str(), |(host, _)| host);
        self.proxy_public_host = public_host.to_string();
        self.proxy_public_port = p.server_port;

        let new_state = match Intent::try_from(p.intent) {
            Ok(Intent::Status) => ConnectionState::Status,
            Ok(Intent::Login) | Ok(Intent::Transfer) => ConnectionState::Login,
            Err(_) => {
                tracing::error!(intent = p.intent, "unknown handshake intent, closing connection");
                ctx.client.close();
                ctx.server.close();
                return;
            }
        };
        self.protocol.transition_to(new_state);

        let suffix = p
            .server_address
            .split_once('\0')
            .map(|(_, suffix)| format!("\0{suffix}"));
        let server_address = match suffix {
            Some(suffix) => format!("{}{}", self.real_server_host, suffix),
            None => self.real_server_host.clone(),
        };

        let replacement = ClientIntentionPacket {
            protocol_version: p.protocol_version,
            server_address,
            server_port: self.real_server_port,
            intent: p.intent,
        };

        self.forward_to_server(ctx, "ServerboundIntention", ClientIntentionPacket::ID, &replacement);
    }

    /// Replaces the player identity offered to the server with the
    /// authenticator's cached profile when running in online mode;
    /// otherwise the original packet passes through untouched.
    pub(crate) fn handle_serverbound_hello(&mut self, ctx: &ProxyContext, _p: &ServerboundHelloPacket) {
        if !self.authenticator.is_online() {
            return;
        }

        self.suppress_original();
        let replacement = ServerboundHelloPacket {
            name: self.authenticator.player_display_name().to_string(),
            profile_id: self.authenticator.player_uuid(),
        };
        self.forward_to_server(ctx, "ServerboundHello", ServerboundHelloPacket::ID, &replacement);
    }

    /// Forwarded unchanged; just arms the shared compression envelope for
    /// both directions from this point on.
    pub(crate) fn handle_login_compression(&mut self, p: &LoginCompressionPacket) {
        self.protocol.enable_compression(p.threshold);
        self.compression = Some(crate::proto::compression::Compression::new(p.threshold));
    }

    /// Forwarded unchanged. Pre-Configuration-phase servers go straight
    /// from Login to Play on this packet; newer ones wait for the client's
    /// `LoginAcknowledged`.
    pub(crate) fn handle_game_profile(&mut self) {
        if !self.protocol.has_configuration_phase() {
            self.protocol.transition_to(ConnectionState::Play);
        }
    }

    /// Performs the encryption handshake transparently on the real client's
    /// behalf: generates a fresh shared secret, authenticates with Mojang's
    /// session server if the upstream requires it, installs the AES-CFB8
    /// cipher on the server connection, and replies with a synthesized
    /// `ServerboundKey`. The real client never sees this exchange at all.
    pub(crate) fn handle_clientbound_hello(&mut self, ctx: &ProxyContext, p: &ClientboundHelloPacket) {
        self.suppress_original();

        let public_key = match rsa_util::parse_public_key(&p.public_key) {
            Ok(k) => k,
            Err(e) => {
                tracing::error!(error = %e, "could not parse server's RSA public key, closing connection");
                ctx.client.close();
                ctx.server.close();
                return;
            }
        };

        let secret = rsa_util::generate_shared_secret();
        let (encrypted_shared_secret, encrypted_challenge) = match (
            rsa_util::encrypt(&public_key, &secret),
            rsa_util::encrypt(&public_key, &p.challenge),
        ) {
            (Ok(secret), Ok(challenge)) => (secret, challenge),
            _ => {
                tracing::error!("failed to RSA-encrypt shared secret/challenge, closing connection");
                ctx.client.close();
                ctx.server.close();
                return;
            }
        };

        if !self.authenticator.is_online() {
            tracing::error!("server requires encryption but no online credentials are configured, not authenticated");
            ctx.client.close();
            ctx.server.close();
            return;
        }
        let join = block_on(self.authenticator.join_server(&p.server_id, &secret, &p.public_key));
        if let Err(e) = join {
            tracing::error!(error = %e, "Mojang session server rejected join, closing connection");
            ctx.client.close();
            ctx.server.close();
            return;
        }

        let key_packet = ServerboundKeyPacket {
            encrypted_shared_secret,
            encrypted_challenge,
        };
        let fields = match key_packet.to_field_bytes() {
            Ok(f) => f,
            Err(_) => return,
        };
        let frame = match self.build_frame(ServerboundKeyPacket::ID, &fields) {
            Ok(f) => f,
            Err(_) => return,
        };
        // This reply itself must cross the wire in the clear; encryption
        // engages for everything sent after it.
        ctx.server.write(frame, false);
        ctx.server.set_data_processor(Box::new(Aes128Cfb8DataProcessor::new(&secret)));
    }

    /// Forwarded unchanged; additionally opens a fresh chat session and
    /// announces its signing key to the server on the real client's behalf,
    /// when running authenticated.
    pub(crate) fn handle_clientbound_login_play(&mut self, ctx: &ProxyContext) {
        if !self.authenticator.is_online() {
            return;
        }
        let (Some(public_key), Some(key_timestamp), Some(key_signature)) = (
            self.authenticator.public_key(),
            self.authenticator.key_timestamp(),
            self.authenticator.key_signature(),
        ) else {
            return;
        };

        let session_id = Uuid::new_v4();
        self.chat_session_uuid = Some(session_id);

        let replacement = crate::proto::packets::play::ServerboundChatSessionUpdatePacket {
            session_id,
            key_expiry_ms: key_timestamp,
            public_key: public_key.to_vec(),
            key_signature: key_signature.to_vec(),
        };
        self.forward_to_server(
            ctx,
            "ServerboundChatSessionUpdate",
            crate::proto::packets::play::ServerboundChatSessionUpdatePacket::ID,
            &replacement,
        );
    }

    /// Suppresses the client's raw chat message and replaces it with one
    /// re-signed under the proxy's own chat session, on its own place in
    /// the message-index sequence. Offline sessions pass chat through
    /// untouched, since unsigned servers don't validate it anyway.
    pub(crate) fn handle_serverbound_chat(&mut self, ctx: &ProxyContext, p: &ServerboundChatPacket) {
        if !self.authenticator.is_online() {
            return;
        }
        let Some(session_uuid) = self.chat_session_uuid else {
            tracing::error!("chat message sent before a chat session was established, closing connection");
            ctx.client.close();
            ctx.server.close();
            return;
        };

        self.suppress_original();
        let seen = self.chat_context.last_seen_entries();
        let index = self.message_sent_index;
        let signed = block_on(self.authenticator.sign_message(&p.message, index, session_uuid, &seen));
        let signed = match signed {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to sign chat message, closing connection");
                ctx.client.close();
                ctx.server.close();
                return;
            }
        };
        if signed.signature.is_empty() {
            tracing::error!("authenticator produced an empty chat signature, closing connection");
            ctx.client.close();
            ctx.server.close();
            return;
        }
        let signature: [u8; 256] = match signed.signature.try_into() {
            Ok(sig) => sig,
            Err(_) => {
                tracing::error!("chat signature had an unexpected length, closing connection");
                ctx.client.close();
                ctx.server.close();
                return;
            }
        };

        self.message_sent_index += 1;
        let replacement = ServerboundChatPacket {
            message: p.message.clone(),
            timestamp: signed.timestamp_ms,
            salt: signed.salt,
            signature: Some(signature),
            last_seen: seen,
        };
        self.forward_to_server(ctx, "ServerboundChat", ServerboundChatPacket::ID, &replacement);
    }

    /// Re-injects the command with a fresh last-seen window; the
    /// per-argument signatures the client produced pass through untouched,
    /// since only the acknowledgement window is this proxy's to rewrite.
    pub(crate) fn handle_serverbound_chat_command(
        &mut self,
        ctx: &ProxyContext,
        p: &ServerboundChatCommandSignedPacket,
    ) {
        if !self.authenticator.is_online() {
            return;
        }
        self.suppress_original();
        let replacement = ServerboundChatCommandSignedPacket {
            command: p.command.clone(),
            timestamp: p.timestamp,
            salt: p.salt,
            argument_signatures: p.argument_signatures.clone(),
            last_seen: self.chat_context.last_seen_entries(),
        };
        self.forward_to_server(
            ctx,
            "ServerboundChatCommandSigned",
            ServerboundChatCommandSignedPacket::ID,
            &replacement,
        );
    }

    /// Forwarded unchanged; tracks the message in the acknowledgement
    /// window and synthesizes a `ServerboundChatAck` once the pending
    /// offset crosses the threshold the server expects to see acked.
    pub(crate) fn handle_clientbound_player_chat(&mut self, ctx: &ProxyContext, p: &ClientboundPlayerChatPacket) {
        let entry = p.signature.map(|signature| LastSeenEntry {
            profile_id: p.sender,
            signature,
        });
        self.chat_context.observe(entry);

        if let Some(offset) = self.chat_context.take_pending_ack() {
            let ack = ServerboundChatAckPacket { offset };
            self.forward_to_server(ctx, "ServerboundChatAck", ServerboundChatAckPacket::ID, &ack);
        }
    }

    /// Suppresses the server's transfer request, remembers the real target
    /// for this client's next connection, and redirects the client to
    /// reconnect to this proxy instead.
    pub(crate) fn handle_clientbound_transfer_configuration(&mut self, ctx: &ProxyContext, p: &ConfigTransfer) {
        self.suppress_original();
        self.remember_transfer(p.host.clone(), p.port as u16);
        let replacement = ConfigTransfer {
            host: self.proxy_public_host.clone(),
            port: self.proxy_public_port as i32,
        };
        self.forward_to_client(ctx, "ClientboundTransferConfiguration", ConfigTransfer::ID, &replacement);
    }

    /// Play-state counterpart of [`Self::handle_clientbound_transfer_configuration`].
    pub(crate) fn handle_clientbound_transfer(&mut self, ctx: &ProxyContext, p: &ClientboundTransferPacket) {
        self.suppress_original();
        self.remember_transfer(p.host.clone(), p.port as u16);
        let replacement = ClientboundTransferPacket {
            host: self.proxy_public_host.clone(),
            port: self.proxy_public_port as i32,
        };
        self.forward_to_client(ctx, "ClientboundTransfer", ClientboundTransferPacket::ID, &replacement);
    }

    fn remember_transfer(&self, host: String, port: u16) {
        if let Ok(mut table) = self.transfer_table.lock() {
            table.insert(self.client_ip, (host, port));
        }
    }

    /// Builds, logs and forwards a packet this session synthesized for the
    /// upstream server, in place of whatever the real client originally sent.
    fn forward_to_server(&mut self, ctx: &ProxyContext, key: &str, id: i32, packet: &impl Packet) {
        let Ok(fields) = packet.to_field_bytes() else {
            return;
        };
        let Ok(frame) = self.build_frame(id, &fields) else {
            return;
        };
        self.log_injected(key, id, Endpoint::SniffcraftToServer, fields);
        ctx.server.write(frame, true);
    }

    /// Builds, logs, replay-records and forwards a packet this session
    /// synthesized for the real client, in place of whatever the upstream
    /// server originally sent.
    fn forward_to_client(&mut self, ctx: &ProxyContext, key: &str, id: i32, packet: &impl Packet) {
        let Ok(fields) = packet.to_field_bytes() else {
            return;
        };
        let Ok(frame) = self.build_frame(id, &fields) else {
            return;
        };
        self.record_replay(id, &fields);
        self.log_injected(key, id, Endpoint::SniffcraftToClient, fields);
        ctx.client.write(frame, true);
    }
}
