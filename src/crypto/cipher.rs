//! An optional per-direction byte-stream transformer installed on the
//! server-side `Connection` once the key-agreement exchange completes.

use aes::Aes128;
use cfb8::cipher::{AsyncStreamCipher, KeyIvInit};
use cfb8::{Decryptor, Encryptor};

/// A byte-granular stream transformer applied to everything read from or
/// written to a `Connection`. Output length always equals input length.
pub trait DataProcessor: Send {
    /// Transforms bytes freshly read from the socket before they reach the
    /// connection's ready buffer.
    fn process_incoming(&mut self, bytes: &[u8]) -> Vec<u8>;

    /// Transforms bytes about to be written to the socket.
    fn process_outgoing(&mut self, bytes: &[u8]) -> Vec<u8>;
}

/// AES-128 in CFB-8 mode, keyed by the 16-byte shared secret (the secret
/// doubles as both key and IV, per vanilla Minecraft's convention). CFB-8
/// is a genuine stream cipher: each output byte
/// depends on the ciphertext history, so encryption and decryption keep
/// independent running state and must not be reset mid-connection.
pub struct Aes128Cfb8DataProcessor {
    encryptor: Encryptor<Aes128>,
    decryptor: Decryptor<Aes128>,
}

impl Aes128Cfb8DataProcessor {
    /// Builds a processor keyed by the raw 16-byte shared secret negotiated
    /// during the login handshake.
    pub fn new(shared_secret: &[u8; 16]) -> Self {
        Self {
            encryptor: Encryptor::<Aes128>::new(shared_secret.into(), shared_secret.into()),
            decryptor: Decryptor::<Aes128>::new(shared_secret.into(), shared_secret.into()),
        }
    }
}

impl DataProcessor for Aes128Cfb8DataProcessor {
    fn process_incoming(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut buf = bytes.to_vec();
        self.decryptor.decrypt(&mut buf);
        buf
    }

    fn process_outgoing(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut buf = bytes.to_vec();
        self.encryptor.encrypt(&mut buf);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_independent_instances() {
        let secret = [0x42u8; 16];
        let mut sender = Aes128Cfb8DataProcessor::new(&secret);
        let mut receiver = Aes128Cfb8DataProcessor::new(&secret);

        let plaintext = b"hello sniffcraft".to_vec();
        let ciphertext = sender.process_outgoing(&plaintext);
        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(ciphertext, plaintext);

        let decrypted = receiver.process_incoming(&ciphertext);
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn is_byte_granular_across_multiple_calls() {
        let secret = [0x11u8; 16];
        let mut sender = Aes128Cfb8DataProcessor::new(&secret);
        let mut receiver = Aes128Cfb8DataProcessor::new(&secret);

        let mut combined_cipher = Vec::new();
        for chunk in [b"abc".as_slice(), b"defgh".as_slice(), b"ij".as_slice()] {
            combined_cipher.extend(sender.process_outgoing(chunk));
        }

        let plain = receiver.process_incoming(&combined_cipher);
        assert_eq!(plain, b"abcdefghij");
    }
}
