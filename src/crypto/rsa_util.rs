//! RSA helpers for the `ClientboundHello` key-agreement handler.
//!
//! The server advertises its public key as a DER-encoded X.509
//! `SubjectPublicKeyInfo` blob; vanilla Minecraft encrypts the shared secret
//! and verify challenge against it with PKCS#1 v1.5 padding.

use crate::error::{RelayError, Result};
use rand::rngs::OsRng;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};

/// Parses the server's DER/X.509-encoded RSA public key.
pub fn parse_public_key(der_bytes: &[u8]) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_der(der_bytes)
        .map_err(|e| RelayError::Crypto(format!("invalid server public key: {e}")))
}

/// Encrypts `plaintext` (the shared secret or verify challenge) against the
/// server's public key using PKCS#1 v1.5 padding, matching vanilla's scheme.
pub fn encrypt(public_key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    public_key
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext)
        .map_err(|e| RelayError::Crypto(format!("RSA encryption failed: {e}")))
}

/// Generates a fresh 16-byte shared secret for the AES-128-CFB8 stage.
pub fn generate_shared_secret() -> [u8; 16] {
    use rand::RngCore;
    let mut secret = [0u8; 16];
    OsRng.fill_bytes(&mut secret);
    secret
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePublicKey;
    use rsa::RsaPrivateKey;

    #[test]
    fn encrypts_against_a_real_key() {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public = private.to_public_key();
        let der = public.to_public_key_der().unwrap();

        let parsed = parse_public_key(der.as_bytes()).unwrap();
        let secret = generate_shared_secret();
        let encrypted = encrypt(&parsed, &secret).unwrap();
        assert!(!encrypted.is_empty());
    }
}
