//! Wire protocol primitives: varints, field types, compression envelope,
//! connection state machine, and packet definitions.

pub mod compression;
pub mod factory;
pub mod frame;
pub mod packet;
pub mod packets;
pub mod types;
pub mod varint;

use serde::{Deserialize, Serialize};

/// Protocol version this binary targets. A single build targets one wire
/// version, per the REDESIGN FLAGS guidance against runtime multi-version
/// `#if` ladders.
pub const PROTOCOL_VERSION: i32 = 770;

/// Protocol version at which the Configuration phase was introduced.
pub const CONFIGURATION_PHASE_MIN_PROTOCOL: i32 = 764;

/// Protocol version at which transfer packets became valid.
pub const TRANSFER_MIN_PROTOCOL: i32 = 765;

/// Maximum size, in bytes, of an uncompressed frame payload.
pub const MAX_PACKET_SIZE: usize = 2 * 1024 * 1024;

/// Maximum size, in bytes, of a compressed frame payload. Frames larger than
/// this are rejected fatally to bound memory use.
pub const MAX_COMPRESSED_PACKET_LEN: usize = 200 * 1024;

/// Direction a packet travels: from the true client toward the server, or
/// the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client -> server.
    Serverbound,
    /// Server -> client.
    Clientbound,
}

/// Tags a byte stream or log entry with the direction of travel and whether
/// the proxy produced or merely observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// The true client, observed at proxy ingress.
    Client,
    /// The true server, observed at proxy ingress.
    Server,
    /// The proxy consumed bytes the client sent without forwarding them.
    ClientToSniffcraft,
    /// The proxy consumed bytes the server sent without forwarding them.
    ServerToSniffcraft,
    /// The proxy injected bytes the client never sent.
    SniffcraftToClient,
    /// The proxy injected bytes the server never sent.
    SniffcraftToServer,
}

impl Endpoint {
    /// Collapses the four proxy-role variants down to the two simple
    /// directions, for statistics and the replay recorder's capture filter.
    pub fn simple_origin(self) -> SimpleOrigin {
        match self {
            Endpoint::Client | Endpoint::ClientToSniffcraft | Endpoint::SniffcraftToClient => {
                SimpleOrigin::Client
            }
            Endpoint::Server | Endpoint::ServerToSniffcraft | Endpoint::SniffcraftToServer => {
                SimpleOrigin::Server
            }
        }
    }

    /// Whether this endpoint represents bytes the proxy itself produced
    /// (as opposed to bytes genuinely observed on the wire).
    pub fn is_injected(self) -> bool {
        matches!(
            self,
            Endpoint::SniffcraftToClient | Endpoint::SniffcraftToServer
        )
    }

    /// The direction the underlying packet travels, regardless of whether
    /// the proxy merely observed it, consumed it, or injected it. Used by
    /// the Logger's filters and statistics, which are keyed by direction
    /// rather than by which real peer the bytes came from.
    pub fn direction(self) -> Direction {
        match self {
            Endpoint::Client | Endpoint::ClientToSniffcraft | Endpoint::SniffcraftToServer => {
                Direction::Serverbound
            }
            Endpoint::Server | Endpoint::ServerToSniffcraft | Endpoint::SniffcraftToClient => {
                Direction::Clientbound
            }
        }
    }

    /// VarInt id used when serializing this tag into the binary capture
    /// format. Stable and arbitrary but must match the reader.
    pub fn wire_id(self) -> i32 {
        match self {
            Endpoint::Client => 0,
            Endpoint::Server => 1,
            Endpoint::ClientToSniffcraft => 2,
            Endpoint::ServerToSniffcraft => 3,
            Endpoint::SniffcraftToClient => 4,
            Endpoint::SniffcraftToServer => 5,
        }
    }
}

/// The two-valued collapse of [`Endpoint`] used by statistics and the log
/// filters, which are keyed per `(state, SimpleOrigin)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimpleOrigin {
    /// Originated with / destined for the real client.
    Client,
    /// Originated with / destined for the real server.
    Server,
}

/// Phase of the protocol state machine. Dictates which packet-id table
/// applies. `Configuration` only exists for protocol versions at or above
/// [`CONFIGURATION_PHASE_MIN_PROTOCOL`]; earlier versions skip straight from
/// `Login` to `Play`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No handshake performed yet.
    #[default]
    Handshake,
    /// Server list ping.
    Status,
    /// Authentication / encryption handshake.
    Login,
    /// Post-login, pre-play configuration exchange (protocol >= 764).
    Configuration,
    /// Normal gameplay.
    Play,
}

impl ConnectionState {
    /// Short name used in text log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Handshake => "Handshake",
            ConnectionState::Status => "Status",
            ConnectionState::Login => "Login",
            ConnectionState::Configuration => "Configuration",
            ConnectionState::Play => "Play",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable protocol bookkeeping layered above the raw byte pump: the current
/// state, whether/when compression kicked in, and the protocol version
/// negotiated at handshake.
#[derive(Debug, Clone)]
pub struct ProtocolState {
    /// Current connection state.
    pub state: ConnectionState,
    /// `None` means "no compression envelope"; `Some(threshold)` means the
    /// compression envelope is active with this threshold.
    pub compression_threshold: Option<i32>,
    /// Protocol version announced by the client's handshake packet.
    pub protocol_version: Option<i32>,
}

impl Default for ProtocolState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolState {
    /// Creates a fresh, pre-handshake state.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Handshake,
            compression_threshold: None,
            protocol_version: None,
        }
    }

    /// Transitions to a new state, logging the change.
    pub fn transition_to(&mut self, new_state: ConnectionState) {
        tracing::debug!(from = %self.state, to = %new_state, "protocol state transition");
        self.state = new_state;
    }

    /// Arms the compression envelope with the given threshold.
    pub fn enable_compression(&mut self, threshold: i32) {
        self.compression_threshold = Some(threshold);
    }

    /// Records the client's announced protocol version.
    pub fn set_protocol_version(&mut self, version: i32) {
        self.protocol_version = Some(version);
    }

    /// Whether the Configuration phase exists for the negotiated protocol
    /// version (falls back to the build's target version before handshake
    /// completes).
    pub fn has_configuration_phase(&self) -> bool {
        self.protocol_version.unwrap_or(PROTOCOL_VERSION) >= CONFIGURATION_PHASE_MIN_PROTOCOL
    }

    /// Whether transfer packets are valid for the negotiated protocol
    /// version.
    pub fn supports_transfer(&self) -> bool {
        self.protocol_version.unwrap_or(PROTOCOL_VERSION) > TRANSFER_MIN_PROTOCOL
    }
}
