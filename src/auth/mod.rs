//! Authentication, key agreement, and chat-message signing, modeled as an
//! external collaborator behind the [`Authenticator`] trait, with
//! [`mojang::MojangAuthenticator`] and [`offline::OfflineAuthenticator`] as
//! its two concrete implementations.

pub mod chat_session;
pub mod mojang;
pub mod offline;

use async_trait::async_trait;

use crate::error::Result;
use crate::proto::packets::play::LastSeenEntry;
use crate::proto::types::McUuid;

pub use chat_session::ChatContext;
pub use mojang::MojangAuthenticator;
pub use offline::OfflineAuthenticator;

/// A signature produced by [`Authenticator::sign_message`]: the raw
/// signature bytes, the salt, and the timestamp the caller must embed
/// alongside it in the outgoing packet.
#[derive(Debug, Clone)]
pub struct MessageSignature {
    pub signature: Vec<u8>,
    pub salt: i64,
    pub timestamp_ms: i64,
}

/// External authentication/signing collaborator. All operations that touch
/// the network or a private key are fallible and async; the proxy's
/// `ClientboundHello`/`ClientboundLogin`/`ServerboundChat` handlers in
/// [`crate::proxy::handlers`] are the only callers.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Whether this authenticator represents an online (Mojang/Microsoft)
    /// identity. `false` for [`OfflineAuthenticator`].
    fn is_online(&self) -> bool;

    /// The display name this session plays under.
    fn player_display_name(&self) -> &str;

    /// The profile UUID this session plays under.
    fn player_uuid(&self) -> McUuid;

    /// DER-encoded RSA public signing key, present only in online mode.
    fn public_key(&self) -> Option<&[u8]>;

    /// Unix-ms expiry timestamp of the signing key pair, present only in
    /// online mode.
    fn key_timestamp(&self) -> Option<i64>;

    /// Mojang's signature over the public signing key, present only in
    /// online mode.
    fn key_signature(&self) -> Option<&[u8]>;

    /// Performs the session-server `joinserver` handshake: proves to the
    /// authentication service that this client and the upstream server
    /// agree on `raw_secret`, keyed by `server_id`.
    async fn join_server(
        &self,
        server_id: &str,
        raw_secret: &[u8; 16],
        server_public_key: &[u8],
    ) -> Result<()>;

    /// Signs a chat message for re-injection toward the server. `index` is
    /// the caller's monotonic `message_sent_index`; `seen_signatures` is the
    /// acknowledgement window drawn from [`ChatContext`].
    async fn sign_message(
        &self,
        text: &str,
        index: i64,
        session_uuid: McUuid,
        seen_signatures: &[LastSeenEntry],
    ) -> Result<MessageSignature>;
}
