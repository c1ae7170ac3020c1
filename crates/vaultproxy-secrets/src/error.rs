//! Error types for key records, crypto, and key sharing.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during crypto and key store operations.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Key record not found: {0}")]
    NotFound(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid provider id: {0}")]
    InvalidProvider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias for crypto and key store operations.
pub type Result<T> = std::result::Result<T, SecretError>;

/// Errors that reject a key-share bundle (or identity) as a whole.
///
/// Per-provider failures inside an otherwise valid bundle are not errors;
/// they are reported in [`crate::share::UnwrapOutcome::failed`].
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("Bundle expired at {expires_at}")]
    Expired { expires_at: DateTime<Utc> },

    #[error("Unsupported bundle version: {0}")]
    UnsupportedVersion(u32),

    #[error("Bundle is addressed to {expected}, not to this identity ({actual})")]
    WrongRecipient { expected: String, actual: String },

    #[error("Wrapped code could not be decrypted; bundle rejected")]
    WrappedCodeRejected,

    #[error("Unsupported bundle algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("No providers selected for sharing")]
    EmptySelection,

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error(transparent)]
    Crypto(#[from] SecretError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
