//! Error handling for the ledger node
//!
//! Errors are split by what the connection owner should do with them:
//! decode, protocol and transport failures end the connection, while a
//! validation failure only drops the offending message.

use std::fmt;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Error kinds raised by the ledger, the codec and the network layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// Malformed wire bytes, bad hex or bad key material
    Decode(String),
    /// Well-formed message with an unknown or unsupported name
    Protocol(String),
    /// Block or transaction failed hash, signature, linkage or proof-of-work checks
    Validation(String),
    /// I/O failure on a peer connection
    Transport(String),
    /// Signing or key handling errors
    Crypto(String),
    /// Configuration errors
    Config(String),
    /// Serialization errors on the outbound path
    Serialization(String),
    /// Local file I/O errors
    Io(String),
}

impl BlockchainError {
    /// Whether a connection that produced this error must be closed.
    pub fn tears_down_connection(&self) -> bool {
        matches!(
            self,
            BlockchainError::Decode(_) | BlockchainError::Protocol(_) | BlockchainError::Transport(_)
        )
    }
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Decode(msg) => write!(f, "Decode error: {msg}"),
            BlockchainError::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            BlockchainError::Validation(msg) => write!(f, "Validation error: {msg}"),
            BlockchainError::Transport(msg) => write!(f, "Transport error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Decode(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}
