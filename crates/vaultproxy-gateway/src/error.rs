//! Gateway error types.

use serde_json::{json, Value};
use thiserror::Error;
use vaultproxy_core::ErrorCode;
use vaultproxy_secrets::SecretError;

/// Errors surfaced by the router, the session manager and the fallback executor.
///
/// Messages and [`GatewayError::context`] never contain key material or
/// upstream response bodies.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The URL does not follow the `/proxy/<provider>/...` convention.
    #[error("Not a proxy URL: {0}")]
    NotProxyUrl(String),

    /// No key is stored for the provider, or the provider is unknown.
    #[error("No key configured for provider '{provider}'")]
    NoKey { provider: String },

    /// A key is stored but no session is active.
    #[error("VaultProxy is locked; unlock to use '{provider}'")]
    Locked { provider: String },

    /// Stored keys could not be decrypted with the session password.
    #[error("Failed to decrypt key(s) for: {}", .providers.join(", "))]
    DecryptFailed { providers: Vec<String> },

    /// Transport failure talking to the provider.
    #[error("Network error calling '{provider}': {message}")]
    Network { provider: String, message: String },

    /// The provider answered with a non-2xx status.
    #[error("Provider '{provider}' returned HTTP {status}")]
    Upstream { provider: String, status: u16 },

    /// Malformed command or request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Key store failure.
    #[error("Key store error: {0}")]
    Store(#[from] SecretError),

    /// Configuration or catalog error.
    #[error("Configuration error: {0}")]
    Config(#[from] vaultproxy_core::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error, including handler panics.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Caller-facing error class.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotProxyUrl(_) | Self::NoKey { .. } => ErrorCode::NoKey,
            Self::Locked { .. } => ErrorCode::Locked,
            Self::DecryptFailed { .. } => ErrorCode::DecryptFailed,
            Self::Network { .. } => ErrorCode::NetworkError,
            Self::Upstream { .. } => ErrorCode::UpstreamError,
            Self::InvalidRequest(_)
            | Self::Store(_)
            | Self::Config(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::Internal(_) => ErrorCode::Unknown,
        }
    }

    /// A short suggestion for the user, if there is one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotProxyUrl(_) => Some("Use a URL of the form <host>/proxy/<provider>/<path>"),
            Self::NoKey { .. } => Some("Add a key for this provider first"),
            Self::Locked { .. } => Some("Unlock with your password"),
            Self::DecryptFailed { .. } => Some("Re-check your password and unlock again"),
            Self::Network { .. } => Some("Check your network connection"),
            Self::Upstream { status, .. } => match status {
                401 | 403 => Some("The key may be invalid or expired"),
                429 => Some("Rate limited; wait or upgrade your plan"),
                500..=599 => Some("The provider is having problems; try again later"),
                _ => None,
            },
            _ => None,
        }
    }

    /// Structured context for the error envelope and the error log.
    pub fn context(&self) -> Value {
        let mut context = match self {
            Self::NoKey { provider } | Self::Locked { provider } => json!({ "provider": provider }),
            Self::DecryptFailed { providers } => json!({ "providers": providers }),
            Self::Network { provider, .. } => json!({ "provider": provider }),
            Self::Upstream { provider, status } => {
                json!({ "provider": provider, "status": status })
            }
            _ => json!({}),
        };

        if let (Some(hint), Some(map)) = (self.hint(), context.as_object_mut()) {
            map.insert("hint".to_string(), Value::from(hint));
        }
        context
    }
}
