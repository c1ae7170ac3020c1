//! Provider catalog.
//!
//! Every provider has a real target origin and an auth scheme describing
//! which header carries the decrypted key. The built-in catalog covers the
//! common model APIs; the `providers` config section can override entries or
//! add new ones.

use crate::config::Config;
use crate::error::{ConfigError, Error, Result};
use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Maximum allowed length for a provider id.
const MAX_PROVIDER_ID_LEN: usize = 64;

/// How a decrypted key is presented to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`.
    Bearer,

    /// The raw key in a named header, e.g. `x-api-key: <key>`.
    Header { name: String },
}

/// A header to add to an outbound provider request.
///
/// Values are held as [`SecretString`] because auth headers carry the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedHeader {
    pub name: String,
    pub value: SecretString,
}

/// Target and auth description for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Real API origin (optionally with a base path), e.g. `https://api.openai.com`.
    pub target: String,

    /// Auth header scheme.
    pub auth: AuthScheme,

    /// Static, non-secret headers sent with every request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_headers: BTreeMap<String, String>,
}

impl ProviderSpec {
    /// Create a spec with no extra headers.
    pub fn new(target: impl Into<String>, auth: AuthScheme) -> Self {
        Self {
            target: target.into(),
            auth,
            extra_headers: BTreeMap::new(),
        }
    }

    /// Add a static header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    /// Headers to inject for `key`: the auth header first, then static extras.
    pub fn auth_headers(&self, key: &SecretString) -> Vec<InjectedHeader> {
        let auth = match &self.auth {
            AuthScheme::Bearer => InjectedHeader {
                name: "authorization".to_string(),
                value: SecretString::new(format!("Bearer {}", key.expose_secret())),
            },
            AuthScheme::Header { name } => InjectedHeader {
                name: name.to_ascii_lowercase(),
                value: key.clone(),
            },
        };

        std::iter::once(auth)
            .chain(self.extra_headers.iter().map(|(name, value)| InjectedHeader {
                name: name.to_ascii_lowercase(),
                value: SecretString::new(value.as_str()),
            }))
            .collect()
    }

    /// Template for the rewritten URL; `{path}` is the part after the provider segment.
    pub fn target_template(&self) -> String {
        format!("{}/{{path}}", self.target.trim_end_matches('/'))
    }

    /// Join `rest` (and an optional query string) onto the target.
    pub fn target_url(&self, rest: &str, query: Option<&str>) -> Result<Url> {
        let joined = format!("{}/{}", self.target.trim_end_matches('/'), rest);
        let mut url = Url::parse(&joined)?;
        url.set_query(query);
        Ok(url)
    }
}

/// Lookup table from provider id to [`ProviderSpec`].
#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    providers: BTreeMap<String, ProviderSpec>,
}

impl ProviderCatalog {
    /// The built-in providers.
    pub fn builtin() -> Self {
        let mut providers = BTreeMap::new();
        let mut add = |id: &str, spec: ProviderSpec| {
            providers.insert(id.to_string(), spec);
        };

        add("openai", ProviderSpec::new("https://api.openai.com", AuthScheme::Bearer));
        add(
            "anthropic",
            ProviderSpec::new(
                "https://api.anthropic.com",
                AuthScheme::Header {
                    name: "x-api-key".to_string(),
                },
            )
            .with_header("anthropic-version", "2023-06-01"),
        );
        add(
            "google",
            ProviderSpec::new(
                "https://generativelanguage.googleapis.com",
                AuthScheme::Header {
                    name: "x-goog-api-key".to_string(),
                },
            ),
        );
        add("mistral", ProviderSpec::new("https://api.mistral.ai", AuthScheme::Bearer));
        add("groq", ProviderSpec::new("https://api.groq.com/openai", AuthScheme::Bearer));
        add("openrouter", ProviderSpec::new("https://openrouter.ai/api", AuthScheme::Bearer));
        add("deepseek", ProviderSpec::new("https://api.deepseek.com", AuthScheme::Bearer));
        add("cohere", ProviderSpec::new("https://api.cohere.com", AuthScheme::Bearer));

        Self { providers }
    }

    /// Built-in providers with the config's `providers` section applied on top.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut catalog = Self::builtin();
        for (id, spec) in &config.providers {
            catalog.insert(id.clone(), spec.clone())?;
        }
        Ok(catalog)
    }

    /// Add or replace a provider.
    pub fn insert(&mut self, id: impl Into<String>, spec: ProviderSpec) -> Result<()> {
        let id = id.into();
        if !valid_provider_id(&id) {
            return Err(Error::Config(ConfigError::Validation(format!(
                "invalid provider id: {id}"
            ))));
        }
        Url::parse(&spec.target)?;
        self.providers.insert(id, spec);
        Ok(())
    }

    /// Look up a provider.
    pub fn get(&self, id: &str) -> Option<&ProviderSpec> {
        self.providers.get(id)
    }

    /// Whether the catalog knows `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Provider ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

/// Provider ids are lowercase ASCII alphanumerics, `-` and `_`.
pub fn valid_provider_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_PROVIDER_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_headers() {
        let catalog = ProviderCatalog::builtin();
        let headers = catalog
            .get("openai")
            .unwrap()
            .auth_headers(&SecretString::new("sk-test"));

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].name, "authorization");
        assert_eq!(headers[0].value.expose_secret(), "Bearer sk-test");
    }

    #[test]
    fn test_header_scheme_with_extras() {
        let catalog = ProviderCatalog::builtin();
        let headers = catalog
            .get("anthropic")
            .unwrap()
            .auth_headers(&SecretString::new("sk-ant"));

        let names: Vec<&str> = headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["x-api-key", "anthropic-version"]);
        assert_eq!(headers[0].value.expose_secret(), "sk-ant");
        assert_eq!(headers[1].value.expose_secret(), "2023-06-01");
    }

    #[test]
    fn test_target_url_keeps_base_path_and_query() {
        let catalog = ProviderCatalog::builtin();
        let url = catalog
            .get("groq")
            .unwrap()
            .target_url("v1/models", Some("limit=5"))
            .unwrap();
        assert_eq!(url.as_str(), "https://api.groq.com/openai/v1/models?limit=5");
    }

    #[test]
    fn test_target_template() {
        let spec = ProviderSpec::new("https://api.openai.com/", AuthScheme::Bearer);
        assert_eq!(spec.target_template(), "https://api.openai.com/{path}");
    }

    #[test]
    fn test_config_overrides_builtin() {
        let mut config = Config::default();
        config.providers.insert(
            "openai".to_string(),
            ProviderSpec::new("http://127.0.0.1:9999", AuthScheme::Bearer),
        );
        config.providers.insert(
            "internal".to_string(),
            ProviderSpec::new(
                "https://llm.internal.example",
                AuthScheme::Header {
                    name: "X-Token".to_string(),
                },
            ),
        );

        let catalog = ProviderCatalog::from_config(&config).unwrap();
        assert_eq!(catalog.get("openai").unwrap().target, "http://127.0.0.1:9999");
        assert!(catalog.contains("internal"));
        assert!(catalog.contains("anthropic"));

        let headers = catalog
            .get("internal")
            .unwrap()
            .auth_headers(&SecretString::new("t"));
        assert_eq!(headers[0].name, "x-token");
    }

    #[test]
    fn test_insert_rejects_bad_id() {
        let mut catalog = ProviderCatalog::default();
        let spec = ProviderSpec::new("https://example.com", AuthScheme::Bearer);
        assert!(catalog.insert("Has Space", spec.clone()).is_err());
        assert!(catalog.insert("../etc", spec.clone()).is_err());
        assert!(catalog.insert("ok-id_2", spec).is_ok());
    }

    #[test]
    fn test_valid_provider_id() {
        assert!(valid_provider_id("openai"));
        assert!(valid_provider_id("my-llm_2"));
        assert!(!valid_provider_id(""));
        assert!(!valid_provider_id("OpenAI"));
        assert!(!valid_provider_id(&"a".repeat(MAX_PROVIDER_ID_LEN + 1)));
    }
}
