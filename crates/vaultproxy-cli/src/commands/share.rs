//! Key-sharing commands.
//!
//! `share init` creates this machine's recipient identity and `share pubkey`
//! prints the public half for out-of-band delivery. `share wrap` encrypts
//! stored keys for someone else's public identity; `share import` opens a
//! bundle addressed to us and re-seals its keys under the local password.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use console::style;
use vaultproxy_core::{paths, Config, ProviderCatalog, SecretString};
use vaultproxy_secrets::share::{self, KeyShareBundle, PublicIdentity, RecipientIdentity, WrapOptions};
use vaultproxy_secrets::{CryptoProvider, EncryptedKeyRecord, KeyStore, WritableKeyStore};

use super::{check_store_password, crypto, open_store, read_password};

/// Share command arguments.
#[derive(Args)]
pub struct ShareArgs {
    #[command(subcommand)]
    pub command: ShareCommand,
}

#[derive(clap::Subcommand)]
pub enum ShareCommand {
    /// Create this machine's sharing identity
    Init {
        /// Replace an existing identity
        #[arg(long)]
        force: bool,

        /// Label published with the public identity
        #[arg(long)]
        label: Option<String>,
    },

    /// Print the public identity to send to key owners
    Pubkey {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Encrypt stored keys for a recipient
    Wrap {
        /// Recipient's public identity file
        #[arg(long)]
        to: PathBuf,

        /// Providers to share, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        providers: Vec<String>,

        /// Write the bundle to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Import keys from a bundle addressed to this identity
    Import {
        /// Bundle file
        bundle: PathBuf,

        /// Replace keys that are already stored
        #[arg(long)]
        overwrite: bool,
    },
}

/// What an import did with each provider in the bundle.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: Vec<String>,
    /// Already stored and not overwritten.
    pub skipped: Vec<String>,
    /// Not in the provider catalog.
    pub unknown: Vec<String>,
    /// Entries that failed to decrypt or verify.
    pub failed: Vec<String>,
}

/// Run the share command.
pub async fn run(args: ShareArgs, config: &Config) -> anyhow::Result<()> {
    let crypto = crypto(config);

    match args.command {
        ShareCommand::Init { force, label } => {
            let identity_path = paths::identity_file()?;
            let public_path = paths::public_identity_file()?;

            let identity =
                init_identity(crypto.as_ref(), &identity_path, &public_path, force, label)?;

            println!("{} Identity created", style("*").green());
            println!("  Private: {}", style(identity_path.display()).dim());
            println!("  Public:  {}", style(public_path.display()).dim());
            println!("  Fingerprint: {}", style(identity.public().short_fingerprint()).bold());
        }

        ShareCommand::Pubkey { out } => {
            let public = load_public_identity()?;
            let json = serde_json::to_string_pretty(&public)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("Public identity written to {}", path.display());
                }
                None => println!("{json}"),
            }
            eprintln!("Fingerprint: {}", style(public.short_fingerprint()).bold());
        }

        ShareCommand::Wrap { to, providers, out } => {
            let recipient = PublicIdentity::load(&to)
                .with_context(|| format!("Failed to read recipient identity {}", to.display()))?;
            eprintln!(
                "Recipient fingerprint: {} (confirm it with the recipient)",
                style(recipient.short_fingerprint()).bold()
            );

            let password = read_password("Vault password: ")?;
            let sender_fingerprint = load_public_identity().ok().map(|p| p.fingerprint);
            let bundle =
                wrap_keys(config, &recipient, &providers, &password, sender_fingerprint).await?;
            let json = bundle.to_json()?;

            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!(
                        "Bundle with {} key(s) written to {} (expires {})",
                        bundle.payload.per_provider.len(),
                        path.display(),
                        bundle.expires_at.format("%Y-%m-%d %H:%M UTC")
                    );
                }
                None => println!("{json}"),
            }
        }

        ShareCommand::Import { bundle, overwrite } => {
            let identity = RecipientIdentity::load(crypto.as_ref(), &paths::identity_file()?)
                .context("Failed to load identity; run 'vaultproxy share init' first")?;
            let data = std::fs::read_to_string(&bundle)
                .with_context(|| format!("Failed to read {}", bundle.display()))?;
            let bundle = KeyShareBundle::from_json(&data)?;

            if let Some(name) = &bundle.sender.name {
                eprintln!("Bundle from {}", style(name).bold());
            }
            let password = read_password("Vault password: ")?;
            let summary = import_bundle(config, &identity, &bundle, &password, overwrite).await?;

            for provider in &summary.imported {
                println!("  {} {}", style("*").green(), provider);
            }
            for provider in &summary.skipped {
                println!("  {} {} (already stored, use --overwrite)", style("-").dim(), provider);
            }
            for provider in &summary.unknown {
                println!("  {} {} (unknown provider)", style("!").yellow(), provider);
            }
            for provider in &summary.failed {
                println!("  {} {} (could not be decrypted)", style("x").red(), provider);
            }
            println!("\n{} key(s) imported.", summary.imported.len());
        }
    }

    Ok(())
}

/// Generate an identity and write both halves.
pub fn init_identity(
    crypto: &dyn CryptoProvider,
    identity_path: &Path,
    public_path: &Path,
    force: bool,
    label: Option<String>,
) -> anyhow::Result<RecipientIdentity> {
    if identity_path.exists() && !force {
        anyhow::bail!(
            "Identity already exists at {}; use --force to replace it",
            identity_path.display()
        );
    }

    let identity = RecipientIdentity::generate(crypto, label).context("Failed to generate identity")?;
    identity.save(identity_path)?;
    identity.public().save(public_path)?;
    tracing::info!(fingerprint = %identity.public().short_fingerprint(), "created sharing identity");
    Ok(identity)
}

fn load_public_identity() -> anyhow::Result<PublicIdentity> {
    let path = paths::public_identity_file()?;
    PublicIdentity::load(&path).context("No identity found; run 'vaultproxy share init' first")
}

/// Decrypt the selected stored keys and wrap them for `recipient`.
pub async fn wrap_keys(
    config: &Config,
    recipient: &PublicIdentity,
    providers: &[String],
    password: &SecretString,
    sender_fingerprint: Option<String>,
) -> anyhow::Result<KeyShareBundle> {
    let store = open_store(config)?;
    let crypto = crypto(config);

    let mut keys = BTreeMap::new();
    for provider in providers {
        let record = store
            .get(provider)
            .await?
            .with_context(|| format!("No key stored for '{provider}'"))?;
        let key = record
            .open(crypto.as_ref(), password)
            .with_context(|| format!("Could not decrypt the key for '{provider}'"))?;
        keys.insert(provider.clone(), key);
    }

    let options = WrapOptions {
        ttl: chrono::Duration::hours(i64::from(config.share.bundle_ttl_hours)),
        sender_name: config.share.sender_name.clone(),
        sender_fingerprint,
        ..WrapOptions::default()
    };
    let bundle = share::wrap(crypto.as_ref(), &keys, recipient, &options)?;
    tracing::info!(
        recipient = %recipient.short_fingerprint(),
        count = keys.len(),
        "wrapped keys for sharing"
    );
    Ok(bundle)
}

/// Open `bundle` and store its keys under the local `password`.
pub async fn import_bundle(
    config: &Config,
    identity: &RecipientIdentity,
    bundle: &KeyShareBundle,
    password: &SecretString,
    overwrite: bool,
) -> anyhow::Result<ImportSummary> {
    let store = open_store(config)?;
    let crypto = crypto(config);
    let catalog = ProviderCatalog::from_config(config)?;

    let outcome = share::unwrap(crypto.as_ref(), bundle, identity)?;
    check_store_password(store.as_ref(), crypto.as_ref(), password).await?;

    let mut summary = ImportSummary {
        failed: outcome.failed,
        ..ImportSummary::default()
    };
    for (provider, key) in outcome.succeeded {
        if !catalog.contains(&provider) {
            summary.unknown.push(provider);
            continue;
        }
        if !overwrite && store.get(&provider).await?.is_some() {
            summary.skipped.push(provider);
            continue;
        }

        let record = EncryptedKeyRecord::seal(crypto.as_ref(), &provider, password, &key)?;
        store.put(record).await?;
        summary.imported.push(provider);
    }

    tracing::info!(
        imported = summary.imported.len(),
        failed = summary.failed.len(),
        "imported shared keys"
    );
    Ok(summary)
}
