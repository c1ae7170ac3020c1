//! Fallback proxy executor.
//!
//! Performs a proxied call directly when no redirect rule handled it. The
//! URL goes through the same [`ProxyPath`] parser the rules use, the session
//! decides which key (if any) is available, and the provider's auth headers
//! replace any the caller supplied.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;
use vaultproxy_core::{InjectedHeader, ProviderCatalog, ProxyPath};

use crate::error::GatewayError;
use crate::session::{KeyLookup, SessionManager};
use crate::Result;

/// Headers never forwarded from the caller.
const STRIPPED_REQUEST_HEADERS: &[&str] = &["host", "content-length", "connection"];

/// Response headers that describe the hop rather than the payload.
const HOP_BY_HOP_HEADERS: &[&str] = &["connection", "transfer-encoding", "keep-alive"];

/// A request to perform on the caller's behalf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl ProxyRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            ..Self::default()
        }
    }
}

/// A successful upstream response, passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl ProxyResponse {
    /// JSON form for the envelope; non-UTF-8 bodies are base64 encoded.
    pub fn to_json(&self) -> Value {
        let (body, encoding) = match std::str::from_utf8(&self.body) {
            Ok(text) => (text.to_string(), "utf8"),
            Err(_) => (STANDARD.encode(&self.body), "base64"),
        };
        json!({
            "status": self.status,
            "headers": self.headers,
            "body": body,
            "bodyEncoding": encoding,
        })
    }
}

/// Executes proxied calls with the session's keys.
pub struct FallbackExecutor {
    client: reqwest::Client,
    catalog: Arc<ProviderCatalog>,
    sessions: Arc<SessionManager>,
}

impl FallbackExecutor {
    /// Create an executor whose outbound calls time out after `timeout`.
    pub fn new(
        catalog: Arc<ProviderCatalog>,
        sessions: Arc<SessionManager>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            catalog,
            sessions,
        })
    }

    /// Resolve the key for `request` and perform it.
    pub async fn execute(&self, request: &ProxyRequest) -> Result<ProxyResponse> {
        let path = ProxyPath::parse(&request.url)
            .ok_or_else(|| GatewayError::NotProxyUrl(request.url.clone()))?;
        let provider = path.provider.clone();

        let spec = self
            .catalog
            .get(&provider)
            .ok_or_else(|| GatewayError::NoKey {
                provider: provider.clone(),
            })?;

        let key = match self.sessions.key_for(&provider).await {
            KeyLookup::Available(key) => key,
            KeyLookup::NoSession => {
                return Err(if self.is_stored(&provider).await? {
                    GatewayError::Locked { provider }
                } else {
                    GatewayError::NoKey { provider }
                });
            }
            KeyLookup::NotDecrypted => {
                return Err(if self.is_stored(&provider).await? {
                    GatewayError::DecryptFailed {
                        providers: vec![provider],
                    }
                } else {
                    GatewayError::NoKey { provider }
                });
            }
        };

        let target = spec.target_url(&path.rest, path.query.as_deref()).map_err(|e| {
            GatewayError::InvalidRequest(format!("cannot build target URL for '{provider}': {e}"))
        })?;
        let injected = spec.auth_headers(&key);

        self.send(&provider, target, request, &injected).await
    }

    /// Send `request` to `target` with `injected` headers replacing the caller's.
    pub async fn send(
        &self,
        provider: &str,
        target: Url,
        request: &ProxyRequest,
        injected: &[InjectedHeader],
    ) -> Result<ProxyResponse> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| GatewayError::InvalidRequest(format!("invalid method: {}", request.method)))?;
        let headers = build_headers(&request.headers, injected)?;

        debug!(provider, method = %method, target = %target, "forwarding proxied request");

        let mut builder = self.client.request(method, target).headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            warn!(provider, "proxied request failed: {e}");
            GatewayError::Network {
                provider: provider.to_string(),
                message: if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.without_url().to_string()
                },
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(provider, status = status.as_u16(), "provider returned an error status");
            return Err(GatewayError::Upstream {
                provider: provider.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = collect_headers(response.headers());
        let body = response.bytes().await.map_err(|e| GatewayError::Network {
            provider: provider.to_string(),
            message: e.without_url().to_string(),
        })?;

        Ok(ProxyResponse {
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
        })
    }

    async fn is_stored(&self, provider: &str) -> Result<bool> {
        Ok(self.sessions.store().get(provider).await?.is_some())
    }
}

/// Caller headers minus stripped and overridden names, then the injected ones.
fn build_headers(
    caller: &BTreeMap<String, String>,
    injected: &[InjectedHeader],
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    for (name, value) in caller {
        let lower = name.to_ascii_lowercase();
        if STRIPPED_REQUEST_HEADERS.contains(&lower.as_str())
            || injected.iter().any(|h| h.name == lower)
        {
            continue;
        }
        let name = HeaderName::from_bytes(lower.as_bytes())
            .map_err(|_| GatewayError::InvalidRequest(format!("invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| GatewayError::InvalidRequest(format!("invalid value for header {name}")))?;
        headers.insert(name, value);
    }

    for header in injected {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|_| GatewayError::Internal(format!("invalid injected header {}", header.name)))?;
        let mut value = HeaderValue::from_str(header.value.expose_secret()).map_err(|_| {
            GatewayError::InvalidRequest(format!("stored key for header {name} is not a valid header value"))
        })?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }

    Ok(headers)
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        let Ok(value) = value.to_str() else {
            continue;
        };
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}
