//! Session management.
//!
//! A [`SessionContext`] exists only between a successful unlock and the next
//! lock (or the end of the process). It is never persisted. Every change to
//! the session rebuilds the rule table from scratch.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use vaultproxy_core::SecretString;
use vaultproxy_secrets::{CryptoProvider, KeyStore};

use crate::error::GatewayError;
use crate::rules::RuleSynthesizer;
use crate::Result;

/// Password and decrypted keys for the current session.
#[derive(Debug)]
pub struct SessionContext {
    password: SecretString,
    decrypted: BTreeMap<String, SecretString>,
}

impl SessionContext {
    pub fn password(&self) -> &SecretString {
        &self.password
    }

    pub fn decrypted(&self) -> &BTreeMap<String, SecretString> {
        &self.decrypted
    }

    pub fn providers(&self) -> Vec<String> {
        self.decrypted.keys().cloned().collect()
    }

    pub fn key(&self, provider: &str) -> Option<&SecretString> {
        self.decrypted.get(provider)
    }
}

/// Outcome of an unlock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnlockReport {
    pub decrypted: Vec<String>,
    pub failed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl UnlockReport {
    /// Every stored key failed to decrypt.
    pub fn all_failed(&self) -> bool {
        self.decrypted.is_empty() && !self.failed.is_empty()
    }
}

/// Whether a provider's key can be used right now.
#[derive(Debug, Clone)]
pub enum KeyLookup {
    /// No session is active.
    NoSession,
    /// A session is active but has no key for the provider.
    NotDecrypted,
    /// The decrypted key.
    Available(SecretString),
}

/// Owns the session and drives rule rebuilds.
pub struct SessionManager {
    store: Arc<dyn KeyStore>,
    crypto: Arc<dyn CryptoProvider>,
    rules: RuleSynthesizer,
    session: RwLock<Option<SessionContext>>,
    // Serializes unlock and lock so a later call always wins.
    transition: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn KeyStore>,
        crypto: Arc<dyn CryptoProvider>,
        rules: RuleSynthesizer,
    ) -> Self {
        Self {
            store,
            crypto,
            rules,
            session: RwLock::new(None),
            transition: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyStore> {
        &self.store
    }

    pub fn rules(&self) -> &RuleSynthesizer {
        &self.rules
    }

    /// Try every stored record with `password`.
    ///
    /// A failing record never stops the others. The session is established
    /// when at least one record decrypts or the store is empty; when every
    /// record fails the previous session is dropped and no rules remain.
    pub async fn unlock(&self, password: SecretString) -> Result<UnlockReport> {
        let _transition = self.transition.lock().await;
        self.unlock_locked(password).await
    }

    /// Body of [`SessionManager::unlock`]; the caller holds `transition`.
    async fn unlock_locked(&self, password: SecretString) -> Result<UnlockReport> {
        let records = self.store.get_all().await?;
        let total = records.len();

        // Key derivation is CPU-bound; run it off the async workers.
        let crypto = Arc::clone(&self.crypto);
        let (decrypted, mut report, password) = tokio::task::spawn_blocking(move || {
            let mut decrypted = BTreeMap::new();
            let mut report = UnlockReport::default();
            for (provider, record) in records {
                match record.open(crypto.as_ref(), &password) {
                    Ok(key) => {
                        decrypted.insert(provider.clone(), key);
                        report.decrypted.push(provider);
                    }
                    Err(e) => {
                        warn!(provider = %provider, "failed to decrypt stored key: {e}");
                        report.failed.push(provider);
                    }
                }
            }
            (decrypted, report, password)
        })
        .await
        .map_err(|e| GatewayError::Internal(format!("unlock task failed: {e}")))?;

        if !report.failed.is_empty() {
            report.warning = Some(format!(
                "{} of {} stored key(s) could not be decrypted; check your password",
                report.failed.len(),
                total
            ));
        }

        let mut session = self.session.write().await;
        if report.all_failed() {
            *session = None;
            self.rules.clear();
        } else {
            let rule_count = self.rules.rebuild(&decrypted);
            *session = Some(SessionContext {
                password,
                decrypted,
            });
            info!(
                decrypted = report.decrypted.len(),
                failed = report.failed.len(),
                rules = rule_count,
                "session unlocked"
            );
        }

        Ok(report)
    }

    /// Drop the session and every rule. Safe to call without a session.
    pub async fn lock(&self) {
        let _transition = self.transition.lock().await;
        let mut session = self.session.write().await;
        let was_active = session.take().is_some();
        self.rules.clear();
        if was_active {
            info!("session locked");
        }
    }

    /// Re-run unlock with the current password, if there is a session.
    ///
    /// The password is read under the transition lock, so a concurrent lock
    /// is never undone.
    pub async fn refresh(&self) -> Result<Option<UnlockReport>> {
        let _transition = self.transition.lock().await;
        let password = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.password.clone());

        match password {
            Some(password) => self.unlock_locked(password).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Providers with a decrypted key, sorted.
    pub async fn decrypted_providers(&self) -> Vec<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(SessionContext::providers)
            .unwrap_or_default()
    }

    /// `(session active, decrypted count)`.
    pub async fn summary(&self) -> (bool, usize) {
        match self.session.read().await.as_ref() {
            Some(session) => (true, session.decrypted.len()),
            None => (false, 0),
        }
    }

    pub async fn key_for(&self, provider: &str) -> KeyLookup {
        match self.session.read().await.as_ref() {
            None => KeyLookup::NoSession,
            Some(session) => match session.key(provider) {
                Some(key) => KeyLookup::Available(key.clone()),
                None => KeyLookup::NotDecrypted,
            },
        }
    }
}
