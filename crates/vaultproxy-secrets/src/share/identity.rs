//! Recipient identities for key sharing.
//!
//! An identity is an RSA-2048 keypair. The private half stays in
//! `identity.json` on the recipient's machine; the public half is published
//! as a [`PublicIdentity`] together with its SHA-256 fingerprint so the sender
//! can confirm it out of band (the first 8 hex characters are enough for a
//! human check).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::CryptoProvider;
use crate::encoding::b64;
use crate::error::ShareError;

/// Number of fingerprint characters shown to humans.
pub const SHORT_FINGERPRINT_LEN: usize = 8;

const IDENTITY_FILE_VERSION: u32 = 1;

/// Hex SHA-256 of a DER-encoded public key.
pub fn fingerprint(crypto: &dyn CryptoProvider, public_der: &[u8]) -> String {
    hex::encode(crypto.hash(public_der))
}

/// The publishable half of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIdentity {
    /// SPKI DER public key.
    #[serde(with = "b64")]
    pub public_key: Vec<u8>,

    /// Hex SHA-256 of `public_key`.
    pub fingerprint: String,

    /// Optional human label, e.g. the owner's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl PublicIdentity {
    pub fn new(crypto: &dyn CryptoProvider, public_key: Vec<u8>, label: Option<String>) -> Self {
        let fingerprint = fingerprint(crypto, &public_key);
        Self {
            public_key,
            fingerprint,
            label,
        }
    }

    /// First characters of the fingerprint for out-of-band comparison.
    pub fn short_fingerprint(&self) -> &str {
        self.fingerprint
            .get(..SHORT_FINGERPRINT_LEN)
            .unwrap_or(&self.fingerprint)
    }

    /// Check that the advertised fingerprint matches the key.
    pub fn verify(&self, crypto: &dyn CryptoProvider) -> Result<(), ShareError> {
        let actual = fingerprint(crypto, &self.public_key);
        if actual == self.fingerprint {
            Ok(())
        } else {
            Err(ShareError::InvalidIdentity(format!(
                "fingerprint {} does not match public key ({})",
                self.fingerprint, actual
            )))
        }
    }

    pub fn load(path: &Path) -> Result<Self, ShareError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ShareError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// On-disk form of a full identity.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityFile {
    version: u32,
    #[serde(with = "b64")]
    private_key: Vec<u8>,
    public: PublicIdentity,
    created_at: DateTime<Utc>,
}

/// A recipient keypair. The private key is zeroized on drop.
pub struct RecipientIdentity {
    private_key: Zeroizing<Vec<u8>>,
    public: PublicIdentity,
    created_at: DateTime<Utc>,
}

impl std::fmt::Debug for RecipientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipientIdentity")
            .field("fingerprint", &self.public.fingerprint)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl RecipientIdentity {
    /// Generate a fresh identity.
    pub fn generate(crypto: &dyn CryptoProvider, label: Option<String>) -> Result<Self, ShareError> {
        let keypair = crypto.generate_keypair()?;
        let public = PublicIdentity::new(crypto, keypair.public_der, label);
        Ok(Self {
            private_key: keypair.private_der,
            public,
            created_at: Utc::now(),
        })
    }

    /// Rebuild an identity from a DER private key.
    pub fn from_private_der(
        crypto: &dyn CryptoProvider,
        private_der: Zeroizing<Vec<u8>>,
        label: Option<String>,
    ) -> Result<Self, ShareError> {
        let public_der = crypto.public_key_from_private(&private_der)?;
        Ok(Self {
            private_key: private_der,
            public: PublicIdentity::new(crypto, public_der, label),
            created_at: Utc::now(),
        })
    }

    pub fn public(&self) -> &PublicIdentity {
        &self.public
    }

    pub fn fingerprint(&self) -> &str {
        &self.public.fingerprint
    }

    pub(crate) fn private_der(&self) -> &[u8] {
        &self.private_key
    }

    /// Load an identity file, checking that both halves belong together.
    pub fn load(crypto: &dyn CryptoProvider, path: &Path) -> Result<Self, ShareError> {
        let data = Zeroizing::new(std::fs::read_to_string(path)?);
        let file: IdentityFile = serde_json::from_str(&data)?;
        if file.version != IDENTITY_FILE_VERSION {
            return Err(ShareError::InvalidIdentity(format!(
                "unsupported identity file version {}",
                file.version
            )));
        }

        let private_key = Zeroizing::new(file.private_key);
        let public_der = crypto.public_key_from_private(&private_key)?;
        if public_der != file.public.public_key {
            return Err(ShareError::InvalidIdentity(
                "public key does not match private key".to_string(),
            ));
        }
        file.public.verify(crypto)?;

        Ok(Self {
            private_key,
            public: file.public,
            created_at: file.created_at,
        })
    }

    /// Write the identity with owner-only permissions.
    pub fn save(&self, path: &Path) -> Result<(), ShareError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = IdentityFile {
            version: IDENTITY_FILE_VERSION,
            private_key: self.private_key.to_vec(),
            public: self.public.clone(),
            created_at: self.created_at,
        };
        let json = Zeroizing::new(serde_json::to_string_pretty(&file)?);
        file.private_key.zeroize();

        std::fs::write(path, json.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}
