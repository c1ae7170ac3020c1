//! The proxy path convention.
//!
//! `<scheme>://<host>/proxy/<provider>/<rest>?<query>` addresses `<rest>` on
//! the provider's real target. Both the redirect rules and the fallback
//! executor parse URLs through [`ProxyPath::parse`] so the two paths can never
//! disagree about what a proxy URL is.

use crate::provider::valid_provider_id;
use url::Url;

/// First path segment of every proxy URL.
pub const PROXY_SEGMENT: &str = "proxy";

/// A URL that matched the proxy convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyPath {
    /// Provider id (second path segment).
    pub provider: String,

    /// Remaining path after the provider segment, without a leading slash.
    pub rest: String,

    /// Query string, if any.
    pub query: Option<String>,
}

impl ProxyPath {
    /// Parse `url`; returns `None` for anything that is not a proxy URL.
    pub fn parse(url: &str) -> Option<Self> {
        let url = Url::parse(url).ok()?;
        Self::from_url(&url)
    }

    /// Same as [`ProxyPath::parse`] for an already-parsed URL.
    pub fn from_url(url: &Url) -> Option<Self> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }

        let mut segments = url.path_segments()?;
        if segments.next()? != PROXY_SEGMENT {
            return None;
        }

        let provider = segments.next()?;
        if !valid_provider_id(provider) {
            return None;
        }

        let rest = segments.collect::<Vec<_>>().join("/");

        Some(Self {
            provider: provider.to_string(),
            rest,
            query: url.query().map(str::to_string),
        })
    }

    /// Parse a bare path such as `/proxy/openai/v1/models?x=1`.
    pub fn parse_path(path_and_query: &str) -> Option<Self> {
        Self::parse(&format!("http://localhost{path_and_query}"))
    }
}

/// Host-facing match pattern for a provider's proxy URLs.
pub fn match_pattern(provider: &str) -> String {
    format!("*://*/{PROXY_SEGMENT}/{provider}/*")
}
