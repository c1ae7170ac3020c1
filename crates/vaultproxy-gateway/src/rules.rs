//! Redirect rules and their synthesis from the decrypted key set.
//!
//! The rule table is only ever written by [`RuleSynthesizer::rebuild`], which
//! swaps in a complete new rule set in one step. Readers always see either the
//! old set or the new one, never a mix, and an empty key set produces an empty
//! table.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};
use url::Url;
use vaultproxy_core::proxy_path::{match_pattern, ProxyPath};
use vaultproxy_core::{InjectedHeader, ProviderCatalog, SecretString};

/// One provider's redirect-and-inject instruction.
#[derive(Clone)]
pub struct RedirectRule {
    /// Allocated per rebuild: `1..=n` in provider order.
    pub id: u32,
    pub provider: String,
    /// Host-facing pattern, e.g. `*://*/proxy/openai/*`.
    pub match_pattern: String,
    /// Target with a `{path}` placeholder.
    pub target_template: String,
    pub injected_headers: Vec<InjectedHeader>,
}

impl std::fmt::Debug for RedirectRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header_names: Vec<&str> = self
            .injected_headers
            .iter()
            .map(|h| h.name.as_str())
            .collect();
        f.debug_struct("RedirectRule")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("match_pattern", &self.match_pattern)
            .field("target_template", &self.target_template)
            .field("injected_headers", &header_names)
            .finish()
    }
}

impl RedirectRule {
    /// Whether `path` is addressed to this rule's provider.
    pub fn matches(&self, path: &ProxyPath) -> bool {
        path.provider == self.provider
    }

    /// Rewrite a proxy URL into the target URL, or `None` if it does not match.
    pub fn apply(&self, url: &str) -> Option<Url> {
        let path = ProxyPath::parse(url)?;
        self.apply_path(&path)
    }

    /// Same as [`RedirectRule::apply`] for an already-parsed path.
    pub fn apply_path(&self, path: &ProxyPath) -> Option<Url> {
        if !self.matches(path) {
            return None;
        }
        let mut target = Url::parse(&self.target_template.replace("{path}", &path.rest)).ok()?;
        target.set_query(path.query.as_deref());
        Some(target)
    }
}

/// Storage for the active rule set.
pub trait RuleTable: Send + Sync {
    /// Atomically replace every rule.
    fn replace_all(&self, rules: Vec<RedirectRule>);

    /// The current rule set.
    fn snapshot(&self) -> Arc<[RedirectRule]>;

    fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The first rule matching `path`.
    fn find(&self, path: &ProxyPath) -> Option<RedirectRule> {
        self.snapshot().iter().find(|rule| rule.matches(path)).cloned()
    }
}

/// In-process rule table.
pub struct InMemoryRuleTable {
    rules: RwLock<Arc<[RedirectRule]>>,
}

impl Default for InMemoryRuleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRuleTable {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Arc::from(Vec::new())),
        }
    }
}

impl RuleTable for InMemoryRuleTable {
    fn replace_all(&self, rules: Vec<RedirectRule>) {
        *self.rules.write() = Arc::from(rules);
    }

    fn snapshot(&self) -> Arc<[RedirectRule]> {
        Arc::clone(&self.rules.read())
    }
}

/// Builds rules from decrypted keys and owns writes to the table.
#[derive(Clone)]
pub struct RuleSynthesizer {
    catalog: Arc<ProviderCatalog>,
    table: Arc<dyn RuleTable>,
}

impl RuleSynthesizer {
    pub fn new(catalog: Arc<ProviderCatalog>, table: Arc<dyn RuleTable>) -> Self {
        Self { catalog, table }
    }

    pub fn catalog(&self) -> &Arc<ProviderCatalog> {
        &self.catalog
    }

    pub fn table(&self) -> &Arc<dyn RuleTable> {
        &self.table
    }

    /// One rule per decrypted provider known to the catalog.
    pub fn synthesize(&self, decrypted: &BTreeMap<String, SecretString>) -> Vec<RedirectRule> {
        let mut rules = Vec::with_capacity(decrypted.len());
        for (provider, key) in decrypted {
            let Some(spec) = self.catalog.get(provider) else {
                warn!(provider = %provider, "no catalog entry for decrypted provider; no rule built");
                continue;
            };
            rules.push(RedirectRule {
                id: rules.len() as u32 + 1,
                provider: provider.clone(),
                match_pattern: match_pattern(provider),
                target_template: spec.target_template(),
                injected_headers: spec.auth_headers(key),
            });
        }
        rules
    }

    /// Replace the whole table with rules for `decrypted`. Returns the rule count.
    pub fn rebuild(&self, decrypted: &BTreeMap<String, SecretString>) -> usize {
        let rules = self.synthesize(decrypted);
        let count = rules.len();
        self.table.replace_all(rules);
        debug!(rules = count, "rule table rebuilt");
        count
    }

    /// Remove every rule.
    pub fn clear(&self) {
        self.table.replace_all(Vec::new());
        debug!("rule table cleared");
    }
}
