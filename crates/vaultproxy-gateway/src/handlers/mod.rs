//! Command handlers.
//!
//! Each handler takes the shared [`HandlerContext`] and returns the `data`
//! half of a success envelope; errors are turned into envelopes by the router.

pub mod errors;
pub mod proxy;
pub mod session;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;
use vaultproxy_core::{Config, ErrorLog, ErrorRecord, ProviderCatalog};
use vaultproxy_secrets::{CryptoProvider, KeyStore};

use crate::error::GatewayError;
use crate::executor::FallbackExecutor;
use crate::rules::{InMemoryRuleTable, RuleSynthesizer, RuleTable};
use crate::session::SessionManager;
use crate::status::{Status, StatusEngine, StatusInputs};
use crate::Result;

/// Shared state for command handlers.
pub struct HandlerContext {
    pub catalog: Arc<ProviderCatalog>,
    pub sessions: Arc<SessionManager>,
    pub status: StatusEngine,
    pub errors: Mutex<ErrorLog>,
    pub executor: FallbackExecutor,
}

impl HandlerContext {
    /// Wire up every component from `config` with an in-memory rule table.
    pub fn new(
        config: &Config,
        store: Arc<dyn KeyStore>,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Result<Self> {
        Self::with_rule_table(config, store, crypto, Arc::new(InMemoryRuleTable::new()))
    }

    /// Same as [`HandlerContext::new`] with a caller-supplied rule table.
    pub fn with_rule_table(
        config: &Config,
        store: Arc<dyn KeyStore>,
        crypto: Arc<dyn CryptoProvider>,
        table: Arc<dyn RuleTable>,
    ) -> Result<Self> {
        let catalog = Arc::new(ProviderCatalog::from_config(config)?);
        let rules = RuleSynthesizer::new(catalog.clone(), table);
        let sessions = Arc::new(SessionManager::new(store, crypto, rules));
        let executor = FallbackExecutor::new(
            catalog.clone(),
            sessions.clone(),
            Duration::from_secs(config.proxy.request_timeout_secs),
        )?;

        Ok(Self {
            catalog,
            sessions,
            status: StatusEngine::new(Duration::from_secs(config.proxy.error_revert_secs)),
            errors: Mutex::new(ErrorLog::new(config.proxy.error_log_capacity)),
            executor,
        })
    }

    /// The active rule table.
    pub fn rules(&self) -> &Arc<dyn RuleTable> {
        self.sessions.rules().table()
    }

    /// Recompute the status inputs from the store and the session.
    pub async fn refresh_status(&self) -> Result<Status> {
        let stored_count = self.sessions.store().list_providers().await?.len();
        let (session_active, decrypted_count) = self.sessions.summary().await;
        Ok(self.status.update(StatusInputs {
            stored_count,
            session_active,
            decrypted_count,
        }))
    }

    /// Log `error`, append it to the error log and raise the error overlay.
    pub fn record_error(&self, error: &GatewayError) {
        warn!(code = %error.code(), "{error}");
        self.errors.lock().push(ErrorRecord::new(
            error.code(),
            error.to_string(),
            error.context(),
        ));
        self.status.set_error_overlay();
    }
}
