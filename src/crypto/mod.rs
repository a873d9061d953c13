//! Cryptography: the per-connection stream cipher stage (component B) and
//! the RSA key-exchange helpers used by the `ClientboundHello` handler.

pub mod cipher;
pub mod rsa_util;

pub use cipher::{Aes128Cfb8DataProcessor, DataProcessor};
