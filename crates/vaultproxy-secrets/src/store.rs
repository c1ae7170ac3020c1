//! Encrypted key store backends.
//!
//! [`KeyStore`] is the read contract the session layer depends on: it hands
//! out encrypted records and never sees a password or plaintext.
//! [`WritableKeyStore`] adds the save/remove path used by the CLI.
//! [`FileKeyStore`] keeps one JSON file per provider under
//! `~/.vaultproxy/keys/`; [`MemoryKeyStore`] is for embedding and tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use vaultproxy_core::provider::valid_provider_id;

use crate::error::{Result, SecretError};
use crate::types::EncryptedKeyRecord;

/// Read access to encrypted key records.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// All records keyed by provider id.
    async fn get_all(&self) -> Result<BTreeMap<String, EncryptedKeyRecord>>;

    /// One record, or `None` if the provider has no stored key.
    async fn get(&self, provider: &str) -> Result<Option<EncryptedKeyRecord>> {
        Ok(self.get_all().await?.remove(provider))
    }

    /// Sorted provider ids that have a stored record.
    async fn list_providers(&self) -> Result<Vec<String>> {
        Ok(self.get_all().await?.into_keys().collect())
    }
}

/// Save and remove records.
#[async_trait]
pub trait WritableKeyStore: KeyStore {
    /// Insert or replace the record for `record.provider`.
    async fn put(&self, record: EncryptedKeyRecord) -> Result<()>;

    /// Remove a provider's record.
    async fn delete(&self, provider: &str) -> Result<()>;
}

/// Validate that a provider id is safe to use as a file name.
fn validate_provider(provider: &str) -> Result<()> {
    if valid_provider_id(provider) {
        Ok(())
    } else {
        Err(SecretError::InvalidProvider(provider.to_string()))
    }
}

/// In-memory key store.
#[derive(Default)]
pub struct MemoryKeyStore {
    records: RwLock<BTreeMap<String, EncryptedKeyRecord>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get_all(&self) -> Result<BTreeMap<String, EncryptedKeyRecord>> {
        Ok(self.records.read().await.clone())
    }

    async fn get(&self, provider: &str) -> Result<Option<EncryptedKeyRecord>> {
        Ok(self.records.read().await.get(provider).cloned())
    }
}

#[async_trait]
impl WritableKeyStore for MemoryKeyStore {
    async fn put(&self, record: EncryptedKeyRecord) -> Result<()> {
        validate_provider(&record.provider)?;
        self.records
            .write()
            .await
            .insert(record.provider.clone(), record);
        Ok(())
    }

    async fn delete(&self, provider: &str) -> Result<()> {
        self.records
            .write()
            .await
            .remove(provider)
            .map(|_| ())
            .ok_or_else(|| SecretError::NotFound(provider.to_string()))
    }
}

/// A file-system-backed key store.
///
/// Each record is stored at `{base_dir}/{provider}.json`. Files are created
/// with mode `0600` on Unix and the directory with `0700`.
pub struct FileKeyStore {
    base_dir: PathBuf,
}

impl FileKeyStore {
    /// Create a new store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Directory holding the record files.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Ensure the base directory exists with restrictive permissions.
    async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            tokio::fs::set_permissions(&self.base_dir, perms).await?;
        }

        Ok(())
    }

    fn record_path(&self, provider: &str) -> PathBuf {
        self.base_dir.join(format!("{provider}.json"))
    }

    async fn read_record(path: &Path) -> Result<EncryptedKeyRecord> {
        let data = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// Write `data` to `path` with mode 0600 on Unix.
async fn write_record_file(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp, perms).await?;
    }

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn get_all(&self) -> Result<BTreeMap<String, EncryptedKeyRecord>> {
        let mut records = BTreeMap::new();
        if !self.base_dir.exists() {
            return Ok(records);
        }

        let mut entries = tokio::fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !valid_provider_id(stem) {
                continue;
            }

            match Self::read_record(&path).await {
                Ok(record) if record.provider == stem => {
                    records.insert(stem.to_string(), record);
                }
                Ok(record) => {
                    warn!(
                        path = %path.display(),
                        provider = %record.provider,
                        "skipping key record whose provider does not match its file name"
                    );
                }
                Err(e) => {
                    warn!(path = %path.display(), "skipping unreadable key record: {e}");
                }
            }
        }

        Ok(records)
    }

    async fn get(&self, provider: &str) -> Result<Option<EncryptedKeyRecord>> {
        validate_provider(provider)?;
        let path = self.record_path(provider);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path).await.map(Some)
    }
}

#[async_trait]
impl WritableKeyStore for FileKeyStore {
    async fn put(&self, record: EncryptedKeyRecord) -> Result<()> {
        validate_provider(&record.provider)?;
        self.ensure_dir().await?;

        let json = serde_json::to_string_pretty(&record)?;
        let path = self.record_path(&record.provider);
        debug!(provider = %record.provider, path = %path.display(), "writing key record");
        write_record_file(&path, json.as_bytes()).await
    }

    async fn delete(&self, provider: &str) -> Result<()> {
        validate_provider(provider)?;

        let path = self.record_path(provider);
        if !path.exists() {
            return Err(SecretError::NotFound(provider.to_string()));
        }

        debug!(provider, path = %path.display(), "deleting key record");
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }
}
