//! Error handling for obsidian-relay

use thiserror::Error;

/// Top-level error type for the proxy
#[derive(Error, Debug)]
pub enum RelayError {
    /// IO error
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol framing or decode error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Compression error
    #[error("compression error: {0}")]
    Compression(#[from] flate2::CompressError),

    /// Decompression error
    #[error("decompression error: {0}")]
    Decompression(#[from] flate2::DecompressError),

    /// Cryptography error (RSA/AES key exchange)
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Authentication / session-server error
    #[error("authentication error: {0}")]
    Auth(String),

    /// Configuration file error
    #[error("config error: {0}")]
    Config(String),

    /// DNS SRV resolution error
    #[error("dns error: {0}")]
    Dns(String),

    /// ZIP / replay archive error
    #[error("archive error: {0}")]
    Archive(String),

    /// JSON (de)serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias
pub type Result<T> = std::result::Result<T, RelayError>;
