//! Encrypted key records.
//!
//! A record holds everything needed to recover one provider key given the
//! user's password: the Argon2 salt, the AES-GCM IV, and the ciphertext. The
//! provider id is bound to the ciphertext as associated data, so a record
//! copied under another provider's name fails to decrypt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vaultproxy_core::SecretString;

use crate::crypto::{CryptoProvider, IV_SIZE, SALT_SIZE};
use crate::encoding::b64;
use crate::error::{Result, SecretError};

/// One provider's key, encrypted at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKeyRecord {
    /// Provider id the key belongs to.
    pub provider: String,

    /// Argon2id salt.
    #[serde(with = "b64")]
    pub salt: Vec<u8>,

    /// AES-GCM nonce.
    #[serde(with = "b64")]
    pub iv: Vec<u8>,

    /// AES-256-GCM ciphertext including the tag.
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,

    /// When the record was sealed.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl EncryptedKeyRecord {
    /// Encrypt `plaintext` for `provider` under a key derived from `password`.
    ///
    /// A fresh salt and IV are drawn for every call.
    pub fn seal(
        crypto: &dyn CryptoProvider,
        provider: &str,
        password: &SecretString,
        plaintext: &SecretString,
    ) -> Result<Self> {
        let salt = crypto.random_bytes(SALT_SIZE);
        let iv = crypto.random_bytes(IV_SIZE);

        let key = crypto.derive_key_from_password(password.as_bytes(), &salt)?;
        let ciphertext = crypto.aead_encrypt(&key, &iv, plaintext.as_bytes(), provider.as_bytes())?;

        Ok(Self {
            provider: provider.to_string(),
            salt,
            iv,
            ciphertext,
            created_at: Utc::now(),
        })
    }

    /// Decrypt the record with `password`.
    pub fn open(&self, crypto: &dyn CryptoProvider, password: &SecretString) -> Result<SecretString> {
        let key = crypto.derive_key_from_password(password.as_bytes(), &self.salt)?;
        let plaintext =
            crypto.aead_decrypt(&key, &self.iv, &self.ciphertext, self.provider.as_bytes())?;

        SecretString::from_utf8(plaintext.to_vec())
            .ok_or_else(|| SecretError::DecryptionFailed("invalid UTF-8".to_string()))
    }
}
