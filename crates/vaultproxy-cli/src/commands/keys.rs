//! Key management commands.
//!
//! Provides `vaultproxy keys add|list|remove` for managing the encrypted key
//! store. Keys are sealed under the vault password before they touch disk.

use anyhow::Context;
use clap::Args;
use vaultproxy_core::{Config, ProviderCatalog, SecretString};
use vaultproxy_secrets::{EncryptedKeyRecord, KeyStore, WritableKeyStore};

use super::{check_store_password, crypto, open_store, read_password};

/// Keys command arguments.
#[derive(Args)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[derive(clap::Subcommand)]
pub enum KeysCommand {
    /// Encrypt and store a provider key (prompts for the key)
    Add {
        /// Provider id, e.g. openai
        provider: String,

        /// Key value (if omitted, prompts for hidden input)
        #[arg(long)]
        key: Option<String>,
    },

    /// List stored providers (names only)
    List,

    /// Remove a stored key
    Remove {
        /// Provider id
        provider: String,
    },
}

/// Run the keys command.
pub async fn run(args: KeysArgs, config: &Config) -> anyhow::Result<()> {
    match args.command {
        KeysCommand::Add { provider, key } => {
            let key = match key {
                Some(k) => SecretString::new(k),
                None => SecretString::new(
                    rpassword::prompt_password(format!("Enter API key for '{provider}': "))
                        .context("Failed to read key")?,
                ),
            };
            let password = read_password("Vault password: ")?;

            add_key(config, &provider, key, &password).await?;
            println!("Key for '{}' stored successfully.", provider);
        }

        KeysCommand::List => {
            let store = open_store(config)?;
            let records = store.get_all().await.context("Failed to read key store")?;

            if records.is_empty() {
                println!("No keys stored.");
            } else {
                println!("{:<20} {}", "PROVIDER", "CREATED");
                println!("{}", "-".repeat(44));
                for record in records.values() {
                    println!(
                        "{:<20} {}",
                        record.provider,
                        record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
                println!("\n{} key(s) total.", records.len());
            }
        }

        KeysCommand::Remove { provider } => {
            remove_key(config, &provider).await?;
            println!("Key for '{}' removed.", provider);
        }
    }

    Ok(())
}

/// Seal `key` under `password` and store it for `provider`.
///
/// The provider must be in the catalog, otherwise no rule could ever use the
/// key.
pub async fn add_key(
    config: &Config,
    provider: &str,
    key: SecretString,
    password: &SecretString,
) -> anyhow::Result<()> {
    if key.is_empty() {
        anyhow::bail!("Key must not be empty");
    }

    let catalog = ProviderCatalog::from_config(config)?;
    if !catalog.contains(provider) {
        let known: Vec<&str> = catalog.ids().collect();
        anyhow::bail!(
            "Unknown provider: {}. Valid options: {}",
            provider,
            known.join(", ")
        );
    }

    let store = open_store(config)?;
    let crypto = crypto(config);
    check_store_password(store.as_ref(), crypto.as_ref(), password).await?;

    let record = EncryptedKeyRecord::seal(crypto.as_ref(), provider, password, &key)
        .context("Failed to encrypt key")?;
    store.put(record).await.context("Failed to save key")?;
    tracing::info!(provider, "stored key");
    Ok(())
}

/// Delete the stored key for `provider`.
pub async fn remove_key(config: &Config, provider: &str) -> anyhow::Result<()> {
    let store = open_store(config)?;
    store
        .delete(provider)
        .await
        .with_context(|| format!("Failed to remove key for '{provider}'"))?;
    tracing::info!(provider, "removed key");
    Ok(())
}
