//! Offline-mode authenticator, used when the `Online` configuration key is
//! `false`: no network contact, and a deterministic UUID derived from the
//! player name.

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::{Authenticator, MessageSignature};
use crate::error::{RelayError, Result};
use crate::proto::packets::play::LastSeenEntry;
use crate::proto::types::McUuid;

/// Vanilla's offline-mode UUID namespace convention:
/// `UUID.nameUUIDFromBytes(("OfflinePlayer:" + name).getBytes(UTF_8))`,
/// a version-3 (MD5 name-based) UUID with no namespace UUID (an
/// all-zero namespace, matching `nameUUIDFromBytes`'s direct MD5-of-bytes
/// behavior rather than RFC 4122's namespace-prefixed variant).
fn offline_uuid(name: &str) -> McUuid {
    let bytes = format!("OfflinePlayer:{name}").into_bytes();
    Uuid::new_v3(&Uuid::nil(), &bytes)
}

/// [`Authenticator`] used when the proxy runs in offline mode: never
/// contacts the session server, and chat re-signing is a fatal error since
/// there is no signing key (callers only invoke `sign_message` when
/// `is_online()` is true).
pub struct OfflineAuthenticator {
    name: String,
    uuid: McUuid,
}

impl OfflineAuthenticator {
    /// Builds an offline identity for `name`, deriving its UUID the way
    /// vanilla does for offline-mode servers.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let uuid = offline_uuid(&name);
        Self { name, uuid }
    }
}

#[async_trait]
impl Authenticator for OfflineAuthenticator {
    fn is_online(&self) -> bool {
        false
    }

    fn player_display_name(&self) -> &str {
        &self.name
    }

    fn player_uuid(&self) -> McUuid {
        self.uuid
    }

    fn public_key(&self) -> Option<&[u8]> {
        None
    }

    fn key_timestamp(&self) -> Option<i64> {
        None
    }

    fn key_signature(&self) -> Option<&[u8]> {
        None
    }

    async fn join_server(
        &self,
        _server_id: &str,
        _raw_secret: &[u8; 16],
        _server_public_key: &[u8],
    ) -> Result<()> {
        Err(RelayError::Auth(
            "ClientboundHello received while not authenticated".into(),
        ))
    }

    async fn sign_message(
        &self,
        _text: &str,
        _index: i64,
        _session_uuid: McUuid,
        _seen_signatures: &[LastSeenEntry],
    ) -> Result<MessageSignature> {
        Err(RelayError::Auth(
            "cannot sign chat messages in offline mode".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_uuid_is_deterministic() {
        let a = offline_uuid("Steve");
        let b = offline_uuid("Steve");
        assert_eq!(a, b);
        assert_ne!(a, offline_uuid("Alex"));
    }
}
