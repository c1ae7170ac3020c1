//! Key-share bundles: hybrid encryption of selected provider keys.
//!
//! `wrap` draws a random 256-bit code, derives an AES key from it with HKDF
//! (salted by `codeIv`), encrypts every selected key under its own IV with the
//! provider id as associated data, then RSA-OAEP-encrypts the code to the
//! recipient. The result is a self-contained JSON document: opening it needs
//! the recipient's private key and nothing else.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vaultproxy_core::provider::valid_provider_id;
use vaultproxy_core::SecretString;
use zeroize::Zeroizing;

use super::identity::{PublicIdentity, RecipientIdentity};
use crate::crypto::{CryptoProvider, IV_SIZE, KEY_SIZE};
use crate::encoding::b64;
use crate::error::{SecretError, ShareError};

/// Current bundle format version.
pub const BUNDLE_VERSION: u32 = 1;

const KEY_WRAP_ALG: &str = "RSA-OAEP-256";
const KDF_ALG: &str = "HKDF-SHA256";
const CIPHER_ALG: &str = "AES-256-GCM";
const HASH_ALG: &str = "SHA-256";

/// Length of the HKDF salt carried as `codeIv`.
const CODE_IV_SIZE: usize = 16;

/// Who produced the bundle. Informational only; nothing here is verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Algorithms used by the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionDescriptor {
    pub key_wrap: String,
    pub kdf: String,
    pub cipher: String,
    pub hash: String,
}

impl Default for EncryptionDescriptor {
    fn default() -> Self {
        Self {
            key_wrap: KEY_WRAP_ALG.to_string(),
            kdf: KDF_ALG.to_string(),
            cipher: CIPHER_ALG.to_string(),
            hash: HASH_ALG.to_string(),
        }
    }
}

impl EncryptionDescriptor {
    fn check_supported(&self) -> Result<(), ShareError> {
        let expected = Self::default();
        for (actual, wanted) in [
            (&self.key_wrap, &expected.key_wrap),
            (&self.kdf, &expected.kdf),
            (&self.cipher, &expected.cipher),
            (&self.hash, &expected.hash),
        ] {
            if actual != wanted {
                return Err(ShareError::UnsupportedAlgorithm(actual.clone()));
            }
        }
        Ok(())
    }
}

/// One provider's encrypted key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEntry {
    #[serde(with = "b64")]
    pub iv: Vec<u8>,

    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,

    /// Hex SHA-256 of the plaintext, checked again after decryption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plaintext_hash: Option<String>,
}

/// Encrypted material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlePayload {
    /// The share code, encrypted to the recipient's public key.
    #[serde(with = "b64")]
    pub wrapped_code: Vec<u8>,

    /// Salt for deriving the AES key from the code.
    #[serde(with = "b64")]
    pub code_iv: Vec<u8>,

    pub per_provider: BTreeMap<String, ProviderEntry>,
}

/// A self-describing key-share bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyShareBundle {
    pub version: u32,
    pub sender: SenderInfo,
    pub recipient_fingerprint: String,
    pub encryption: EncryptionDescriptor,
    pub payload: BundlePayload,
    pub expires_at: DateTime<Utc>,
}

impl KeyShareBundle {
    /// Providers carried by the bundle.
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.payload.per_provider.keys().map(String::as_str)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn to_json(&self) -> Result<String, ShareError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ShareError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Options for [`wrap`].
#[derive(Debug, Clone)]
pub struct WrapOptions {
    /// How long the bundle stays valid.
    pub ttl: Duration,

    /// Sender metadata.
    pub sender_name: Option<String>,
    pub sender_fingerprint: Option<String>,

    /// Include a plaintext hash per provider.
    pub include_hashes: bool,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(24),
            sender_name: None,
            sender_fingerprint: None,
            include_hashes: true,
        }
    }
}

/// Result of [`unwrap`]: per-provider success or failure.
#[derive(Debug, Default)]
pub struct UnwrapOutcome {
    pub succeeded: BTreeMap<String, SecretString>,
    pub failed: Vec<String>,
}

/// Encrypt `keys` for `recipient`.
pub fn wrap(
    crypto: &dyn CryptoProvider,
    keys: &BTreeMap<String, SecretString>,
    recipient: &PublicIdentity,
    options: &WrapOptions,
) -> Result<KeyShareBundle, ShareError> {
    if keys.is_empty() {
        return Err(ShareError::EmptySelection);
    }
    if let Some(bad) = keys.keys().find(|p| !valid_provider_id(p)) {
        return Err(SecretError::InvalidProvider(bad.clone()).into());
    }
    recipient.verify(crypto)?;

    let code = Zeroizing::new(crypto.random_bytes(KEY_SIZE));
    let code_iv = crypto.random_bytes(CODE_IV_SIZE);
    let key = crypto.derive_key_from_code(&code, &code_iv)?;

    let mut per_provider = BTreeMap::new();
    for (provider, plaintext) in keys {
        let iv = crypto.random_bytes(IV_SIZE);
        let ciphertext = crypto.aead_encrypt(&key, &iv, plaintext.as_bytes(), provider.as_bytes())?;
        let plaintext_hash = options
            .include_hashes
            .then(|| hex::encode(crypto.hash(plaintext.as_bytes())));

        per_provider.insert(
            provider.clone(),
            ProviderEntry {
                iv,
                ciphertext,
                plaintext_hash,
            },
        );
    }

    let wrapped_code = crypto.asymmetric_encrypt(&recipient.public_key, &code)?;
    let now = Utc::now();

    debug!(
        providers = per_provider.len(),
        recipient = recipient.short_fingerprint(),
        "wrapped key-share bundle"
    );

    Ok(KeyShareBundle {
        version: BUNDLE_VERSION,
        sender: SenderInfo {
            name: options.sender_name.clone(),
            fingerprint: options.sender_fingerprint.clone(),
            created_at: now,
        },
        recipient_fingerprint: recipient.fingerprint.clone(),
        encryption: EncryptionDescriptor::default(),
        payload: BundlePayload {
            wrapped_code,
            code_iv,
            per_provider,
        },
        expires_at: now + options.ttl,
    })
}

/// Open `bundle` with `identity`, checking expiry against the current time.
pub fn unwrap(
    crypto: &dyn CryptoProvider,
    bundle: &KeyShareBundle,
    identity: &RecipientIdentity,
) -> Result<UnwrapOutcome, ShareError> {
    unwrap_at(crypto, bundle, identity, Utc::now())
}

/// Open `bundle` as of `now`.
///
/// Whole-bundle checks run before any ciphertext is touched. Once the code is
/// recovered, each provider entry succeeds or fails on its own.
pub fn unwrap_at(
    crypto: &dyn CryptoProvider,
    bundle: &KeyShareBundle,
    identity: &RecipientIdentity,
    now: DateTime<Utc>,
) -> Result<UnwrapOutcome, ShareError> {
    if bundle.version != BUNDLE_VERSION {
        return Err(ShareError::UnsupportedVersion(bundle.version));
    }
    if bundle.is_expired_at(now) {
        return Err(ShareError::Expired {
            expires_at: bundle.expires_at,
        });
    }
    bundle.encryption.check_supported()?;
    if bundle.recipient_fingerprint != identity.fingerprint() {
        return Err(ShareError::WrongRecipient {
            expected: bundle.recipient_fingerprint.clone(),
            actual: identity.fingerprint().to_string(),
        });
    }

    let code = crypto
        .asymmetric_decrypt(identity.private_der(), &bundle.payload.wrapped_code)
        .map_err(|_| ShareError::WrappedCodeRejected)?;
    if code.len() != KEY_SIZE {
        return Err(ShareError::WrappedCodeRejected);
    }
    let key = crypto.derive_key_from_code(&code, &bundle.payload.code_iv)?;

    let mut outcome = UnwrapOutcome::default();
    for (provider, entry) in &bundle.payload.per_provider {
        match open_entry(crypto, &key, provider, entry) {
            Some(secret) => {
                outcome.succeeded.insert(provider.clone(), secret);
            }
            None => {
                warn!(provider = %provider, "key-share entry failed integrity check");
                outcome.failed.push(provider.clone());
            }
        }
    }

    debug!(
        succeeded = outcome.succeeded.len(),
        failed = outcome.failed.len(),
        "unwrapped key-share bundle"
    );
    Ok(outcome)
}

fn open_entry(
    crypto: &dyn CryptoProvider,
    key: &crate::crypto::SymmetricKey,
    provider: &str,
    entry: &ProviderEntry,
) -> Option<SecretString> {
    let plaintext = crypto
        .aead_decrypt(key, &entry.iv, &entry.ciphertext, provider.as_bytes())
        .ok()?;

    if let Some(expected) = &entry.plaintext_hash {
        if hex::encode(crypto.hash(&plaintext)) != *expected {
            return None;
        }
    }

    SecretString::from_utf8(plaintext.to_vec())
}
