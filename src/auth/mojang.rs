//! Online-mode authenticator: a cached Mojang/Microsoft profile plus the
//! `joinserver` session handshake and RSA-SHA256 chat-message signing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::auth::{Authenticator, MessageSignature};
use crate::error::{RelayError, Result};
use crate::proto::packets::play::LastSeenEntry;
use crate::proto::types::McUuid;

/// On-disk shape of the token cache file, keyed by
/// `MicrosoftAccountCacheKey`. Populated out-of-band by whatever Microsoft
/// OAuth flow the operator runs; this proxy only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedProfile {
    pub name: String,
    pub uuid: McUuid,
    pub access_token: String,
    /// DER-encoded RSA public signing key, base64.
    pub public_key_der_b64: String,
    /// PKCS#8 DER-encoded RSA private signing key, base64.
    pub private_key_der_b64: String,
    /// Mojang's signature over the public key, base64.
    pub key_signature_b64: String,
    pub key_expires_at_ms: i64,
}

/// Online-mode [`Authenticator`]: a cached profile plus the HTTP client used
/// for the `joinserver` call.
pub struct MojangAuthenticator {
    client: reqwest::Client,
    profile: CachedProfile,
    public_key_der: Vec<u8>,
    private_key: RsaPrivateKey,
    key_signature: Vec<u8>,
}

impl MojangAuthenticator {
    /// Loads a cached profile from `path` (JSON, see [`CachedProfile`]).
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RelayError::Auth(format!("reading token cache: {e}")))?;
        let profile: CachedProfile = serde_json::from_str(&contents)?;
        Self::from_profile(profile)
    }

    fn from_profile(profile: CachedProfile) -> Result<Self> {
        use base64::Engine;
        let engine = base64::engine::general_purpose::STANDARD;

        let public_key_der = engine
            .decode(&profile.public_key_der_b64)
            .map_err(|e| RelayError::Auth(format!("decoding cached public key: {e}")))?;
        let private_key_der = engine
            .decode(&profile.private_key_der_b64)
            .map_err(|e| RelayError::Auth(format!("decoding cached private key: {e}")))?;
        let key_signature = engine
            .decode(&profile.key_signature_b64)
            .map_err(|e| RelayError::Auth(format!("decoding cached key signature: {e}")))?;

        // Round-tripped purely to validate the cached DER before use.
        let _: RsaPublicKey = RsaPublicKey::from_public_key_der(&public_key_der)
            .map_err(|e| RelayError::Auth(format!("invalid cached public key: {e}")))?;
        let private_key = RsaPrivateKey::from_pkcs8_der(&private_key_der)
            .map_err(|e| RelayError::Auth(format!("invalid cached private key: {e}")))?;

        Ok(MojangAuthenticator {
            client: reqwest::Client::new(),
            profile,
            public_key_der,
            private_key,
            key_signature,
        })
    }

    /// The default token cache path, adjacent to the proxy's configuration.
    pub fn default_cache_path() -> PathBuf {
        PathBuf::from("mojang_profile.json")
    }
}

#[async_trait]
impl Authenticator for MojangAuthenticator {
    fn is_online(&self) -> bool {
        true
    }

    fn player_display_name(&self) -> &str {
        &self.profile.name
    }

    fn player_uuid(&self) -> McUuid {
        self.profile.uuid
    }

    fn public_key(&self) -> Option<&[u8]> {
        Some(&self.public_key_der)
    }

    fn key_timestamp(&self) -> Option<i64> {
        Some(self.profile.key_expires_at_ms)
    }

    fn key_signature(&self) -> Option<&[u8]> {
        Some(&self.key_signature)
    }

    async fn join_server(
        &self,
        server_id: &str,
        raw_secret: &[u8; 16],
        server_public_key: &[u8],
    ) -> Result<()> {
        let hash = server_hash(server_id, raw_secret, server_public_key);

        #[derive(Serialize)]
        struct JoinRequest<'a> {
            #[serde(rename = "accessToken")]
            access_token: &'a str,
            #[serde(rename = "selectedProfile")]
            selected_profile: String,
            #[serde(rename = "serverId")]
            server_id: String,
        }

        let response = self
            .client
            .post("https://sessionserver.mojang.com/session/minecraft/join")
            .json(&JoinRequest {
                access_token: &self.profile.access_token,
                selected_profile: self.profile.uuid.simple().to_string(),
                server_id: hash,
            })
            .send()
            .await
            .map_err(|e| RelayError::Auth(format!("joinserver request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(RelayError::Auth(format!(
                "joinserver rejected session: HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn sign_message(
        &self,
        text: &str,
        index: i64,
        session_uuid: McUuid,
        seen_signatures: &[LastSeenEntry],
    ) -> Result<MessageSignature> {
        let timestamp_ms = self.profile.key_expires_at_ms;
        let salt: i64 = rand::random();

        let mut body = Vec::new();
        body.extend_from_slice(&salt.to_be_bytes());
        body.extend_from_slice(&timestamp_ms.to_be_bytes());
        body.extend_from_slice(session_uuid.as_bytes());
        body.extend_from_slice(&index.to_be_bytes());
        body.extend_from_slice(text.as_bytes());
        for seen in seen_signatures {
            body.extend_from_slice(seen.profile_id.as_bytes());
            body.extend_from_slice(&seen.signature);
        }

        let hashed = Sha256::digest(&body);
        let signature = self
            .private_key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &hashed)
            .map_err(|e| RelayError::Auth(format!("signing chat message: {e}")))?;

        Ok(MessageSignature {
            signature,
            salt,
            timestamp_ms,
        })
    }
}

/// Vanilla's "server id hash": `SHA-1(server_id || shared_secret ||
/// server_public_key)`, formatted as a Java-compatible signed hex string
/// (leading `-` for a negative BigInteger interpretation, no leading zeros).
fn server_hash(server_id: &str, shared_secret: &[u8; 16], server_public_key: &[u8]) -> String {
    use sha1::{Digest, Sha1};

    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(shared_secret);
    hasher.update(server_public_key);
    let digest = hasher.finalize();

    java_hex_digest(&digest)
}

/// Reproduces `new BigInteger(digest).toString(16)`: two's-complement
/// negative numbers print with a leading `-` and no leading zero padding.
fn java_hex_digest(digest: &[u8]) -> String {
    let negative = digest[0] & 0x80 != 0;
    let mut bytes = digest.to_vec();

    if negative {
        // Two's complement negation: invert then add one.
        for byte in bytes.iter_mut() {
            *byte = !*byte;
        }
        for byte in bytes.iter_mut().rev() {
            let (value, carry) = byte.overflowing_add(1);
            *byte = value;
            if !carry {
                break;
            }
        }
    }

    let mut hex = String::new();
    let mut leading = true;
    for byte in &bytes {
        if leading && *byte == 0 {
            continue;
        }
        leading = false;
        hex.push_str(&format!("{byte:02x}"));
    }
    if hex.is_empty() {
        hex.push('0');
    } else if let Some(stripped) = hex.strip_prefix('0') {
        if hex.len() % 2 == 1 {
            hex = stripped.to_string();
        }
    }

    if negative {
        format!("-{hex}")
    } else {
        hex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_hash_matches_known_vanilla_vector() {
        // Reference vectors from wiki.vg's "Protocol Encryption" page.
        assert_eq!(
            java_hex_digest(&sha1_of("Notch")),
            "4ed1f46bbe04bc756bcb17c0c7ce3e4632f06a48"
        );
        assert_eq!(
            java_hex_digest(&sha1_of("jeb_")),
            "-7c9d5b0044c130109a5d7b5fb5c317c02b4e28c1"
        );
        assert_eq!(
            java_hex_digest(&sha1_of("simon")),
            "88e16a1019277b15d58faf0541e11910eb756f6"
        );
    }

    fn sha1_of(s: &str) -> Vec<u8> {
        use sha1::{Digest, Sha1};
        let mut hasher = Sha1::new();
        hasher.update(s.as_bytes());
        hasher.finalize().to_vec()
    }
}
