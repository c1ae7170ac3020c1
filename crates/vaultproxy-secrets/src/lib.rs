//! Encrypted key storage and key sharing for VaultProxy.
//!
//! Provider keys are sealed with AES-256-GCM under an Argon2id-derived key
//! and stored one record per provider. Key-share bundles wrap selected keys
//! for a recipient's RSA identity.

pub mod crypto;
pub mod encoding;
pub mod error;
pub mod share;
pub mod store;
pub mod types;

pub use crypto::{CryptoProvider, DefaultCrypto, KdfParams, SymmetricKey};
pub use error::{Result, SecretError, ShareError};
pub use store::{FileKeyStore, KeyStore, MemoryKeyStore, WritableKeyStore};
pub use types::EncryptedKeyRecord;
