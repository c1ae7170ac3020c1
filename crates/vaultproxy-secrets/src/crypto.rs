//! Crypto provider capability.
//!
//! Everything that touches key material goes through [`CryptoProvider`] so
//! the session and sharing logic can be exercised against any backend.
//! [`DefaultCrypto`] implements it with Argon2id for passwords, HKDF-SHA256
//! for share codes, AES-256-GCM for AEAD and RSA-OAEP(SHA-256) for key
//! wrapping.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;
use vaultproxy_core::config::KdfConfig;
use zeroize::{Zeroizing, ZeroizeOnDrop};

use crate::error::{Result, SecretError};

/// AES-GCM nonce length.
pub const IV_SIZE: usize = 12;
/// Salt length for password derivation.
pub const SALT_SIZE: usize = 16;
/// Symmetric key length (AES-256).
pub const KEY_SIZE: usize = 32;
/// RSA modulus size for share identities.
pub const RSA_BITS: usize = 2048;

/// HKDF info string used to domain-separate share-code keys.
const CODE_KDF_INFO: &[u8] = b"vaultproxy-share-code-v1";

/// A 256-bit symmetric key. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// DER-encoded asymmetric keypair (PKCS#8 private, SPKI public).
pub struct AsymmetricKeypair {
    pub private_der: Zeroizing<Vec<u8>>,
    pub public_der: Vec<u8>,
}

impl fmt::Debug for AsymmetricKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsymmetricKeypair")
            .field("private_der", &"[REDACTED]")
            .field("public_der_len", &self.public_der.len())
            .finish()
    }
}

/// Primitive operations required by the session and sharing layers.
pub trait CryptoProvider: Send + Sync {
    /// Derive a record key from a password and the record's salt.
    fn derive_key_from_password(&self, password: &[u8], salt: &[u8]) -> Result<SymmetricKey>;

    /// Derive a symmetric key from a high-entropy share code.
    fn derive_key_from_code(&self, code: &[u8], salt: &[u8]) -> Result<SymmetricKey>;

    /// AEAD-encrypt `plaintext` under `key` and `iv`, authenticating `aad`.
    fn aead_encrypt(
        &self,
        key: &SymmetricKey,
        iv: &[u8],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>>;

    /// Reverse of [`CryptoProvider::aead_encrypt`]; fails on any tampering.
    fn aead_decrypt(
        &self,
        key: &SymmetricKey,
        iv: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>>;

    /// Generate a fresh asymmetric keypair.
    fn generate_keypair(&self) -> Result<AsymmetricKeypair>;

    /// Encrypt a short message to a DER-encoded public key.
    fn asymmetric_encrypt(&self, public_der: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt with a DER-encoded private key.
    fn asymmetric_decrypt(
        &self,
        private_der: &[u8],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>>;

    /// Derive the public half from a DER-encoded private key.
    fn public_key_from_private(&self, private_der: &[u8]) -> Result<Vec<u8>>;

    /// Cryptographically secure random bytes.
    fn random_bytes(&self, len: usize) -> Vec<u8>;

    /// SHA-256.
    fn hash(&self, data: &[u8]) -> [u8; 32];
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::from(&KdfConfig::default())
    }
}

impl From<&KdfConfig> for KdfParams {
    fn from(config: &KdfConfig) -> Self {
        Self::new(config.memory_kib, config.iterations, config.parallelism)
    }
}

/// [`CryptoProvider`] backed by RustCrypto primitives.
#[derive(Debug, Clone, Default)]
pub struct DefaultCrypto {
    kdf: KdfParams,
}

impl DefaultCrypto {
    pub fn new(kdf: KdfParams) -> Self {
        Self { kdf }
    }

    fn cipher(key: &SymmetricKey) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| SecretError::InvalidKey(e.to_string()))
    }

    fn check_iv(iv: &[u8]) -> Result<()> {
        if iv.len() != IV_SIZE {
            return Err(SecretError::InvalidKey(format!(
                "iv must be {IV_SIZE} bytes, got {}",
                iv.len()
            )));
        }
        Ok(())
    }
}

impl CryptoProvider for DefaultCrypto {
    fn derive_key_from_password(&self, password: &[u8], salt: &[u8]) -> Result<SymmetricKey> {
        let params = Params::new(
            self.kdf.memory_kib,
            self.kdf.iterations,
            self.kdf.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| SecretError::KeyDerivation(e.to_string()))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut out = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(password, salt, &mut out)
            .map_err(|e| SecretError::KeyDerivation(e.to_string()))?;
        Ok(SymmetricKey(out))
    }

    fn derive_key_from_code(&self, code: &[u8], salt: &[u8]) -> Result<SymmetricKey> {
        let hk = Hkdf::<Sha256>::new(Some(salt), code);
        let mut out = [0u8; KEY_SIZE];
        hk.expand(CODE_KDF_INFO, &mut out)
            .map_err(|e| SecretError::KeyDerivation(e.to_string()))?;
        Ok(SymmetricKey(out))
    }

    fn aead_encrypt(
        &self,
        key: &SymmetricKey,
        iv: &[u8],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        Self::check_iv(iv)?;
        Self::cipher(key)?
            .encrypt(Nonce::from_slice(iv), Payload { msg: plaintext, aad })
            .map_err(|e| SecretError::EncryptionFailed(e.to_string()))
    }

    fn aead_decrypt(
        &self,
        key: &SymmetricKey,
        iv: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        Self::check_iv(iv)?;
        Self::cipher(key)?
            .decrypt(Nonce::from_slice(iv), Payload { msg: ciphertext, aad })
            .map(Zeroizing::new)
            .map_err(|_| SecretError::DecryptionFailed("authentication tag mismatch".to_string()))
    }

    fn generate_keypair(&self) -> Result<AsymmetricKeypair> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_BITS)
            .map_err(|e| SecretError::InvalidKey(e.to_string()))?;
        let public = RsaPublicKey::from(&private);

        let private_der = private
            .to_pkcs8_der()
            .map_err(|e| SecretError::InvalidKey(e.to_string()))?;
        let public_der = public
            .to_public_key_der()
            .map_err(|e| SecretError::InvalidKey(e.to_string()))?;

        Ok(AsymmetricKeypair {
            private_der: Zeroizing::new(private_der.as_bytes().to_vec()),
            public_der: public_der.as_bytes().to_vec(),
        })
    }

    fn asymmetric_encrypt(&self, public_der: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let public = RsaPublicKey::from_public_key_der(public_der)
            .map_err(|e| SecretError::InvalidKey(e.to_string()))?;
        public
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| SecretError::EncryptionFailed(e.to_string()))
    }

    fn asymmetric_decrypt(
        &self,
        private_der: &[u8],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let private = RsaPrivateKey::from_pkcs8_der(private_der)
            .map_err(|e| SecretError::InvalidKey(e.to_string()))?;
        private
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map(Zeroizing::new)
            .map_err(|e| SecretError::DecryptionFailed(e.to_string()))
    }

    fn public_key_from_private(&self, private_der: &[u8]) -> Result<Vec<u8>> {
        let private = RsaPrivateKey::from_pkcs8_der(private_der)
            .map_err(|e| SecretError::InvalidKey(e.to_string()))?;
        let public_der = RsaPublicKey::from(&private)
            .to_public_key_der()
            .map_err(|e| SecretError::InvalidKey(e.to_string()))?;
        Ok(public_der.as_bytes().to_vec())
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        OsRng.fill_bytes(&mut buf);
        buf
    }

    fn hash(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }
}
