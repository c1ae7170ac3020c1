//! CLI command implementations.

pub mod keys;
pub mod request;
pub mod serve;
pub mod share;
pub mod status;

use std::sync::Arc;

use anyhow::Context;
use vaultproxy_core::{Config, SecretString};
use vaultproxy_gateway::{Command, HandlerContext, MessageRouter};
use vaultproxy_secrets::{CryptoProvider, DefaultCrypto, FileKeyStore, KdfParams, KeyStore};

/// Environment variable consulted before prompting for the vault password.
pub const PASSWORD_ENV: &str = "VAULTPROXY_PASSWORD";

/// Crypto provider using the configured KDF cost.
pub fn crypto(config: &Config) -> Arc<dyn CryptoProvider> {
    Arc::new(DefaultCrypto::new(KdfParams::from(&config.kdf)))
}

/// File-backed key store at the configured location.
pub fn open_store(config: &Config) -> anyhow::Result<Arc<FileKeyStore>> {
    let dir = config.keys_dir().context("Failed to resolve key store directory")?;
    Ok(Arc::new(FileKeyStore::new(dir)))
}

/// A router over the file store, with its initial status derived.
pub async fn build_router(config: &Config) -> anyhow::Result<MessageRouter> {
    let context = HandlerContext::new(config, open_store(config)?, crypto(config))
        .context("Failed to initialize proxy")?;
    let router = MessageRouter::new(context);
    router.init().await.context("Failed to read key store")?;
    Ok(router)
}

/// Unlock `router`, printing any partial-failure warning.
pub async fn unlock(router: &MessageRouter, password: SecretString) -> anyhow::Result<()> {
    let envelope = router.dispatch(Command::Unlock { password }).await;
    if let Some(error) = envelope.error {
        anyhow::bail!("Unlock failed: {}", error.message);
    }

    let data = envelope.data.unwrap_or_default();
    if let Some(warning) = data.get("warning").and_then(|w| w.as_str()) {
        eprintln!("{} {}", console::style("!").yellow().bold(), warning);
    }
    Ok(())
}

/// Read the vault password from the environment or an interactive prompt.
pub fn read_password(prompt: &str) -> anyhow::Result<SecretString> {
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(value) => value,
        Err(_) => rpassword::prompt_password(prompt).context("Failed to read password")?,
    };

    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }
    Ok(SecretString::new(password))
}

/// Ensure `password` opens the records already in `store`.
///
/// Every record in a store is sealed under one password; adding a key under a
/// different one would leave it undecryptable at unlock. An empty store
/// accepts any password.
pub async fn check_store_password(
    store: &dyn KeyStore,
    crypto: &dyn CryptoProvider,
    password: &SecretString,
) -> anyhow::Result<()> {
    let records = store.get_all().await.context("Failed to read key store")?;
    if records.is_empty() || records.values().any(|r| r.open(crypto, password).is_ok()) {
        Ok(())
    } else {
        anyhow::bail!("Password does not match the keys already stored")
    }
}
