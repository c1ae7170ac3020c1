//! Configuration schema definitions.

use crate::provider::ProviderSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main VaultProxy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Request interception and error reporting.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Password key derivation cost.
    #[serde(default)]
    pub kdf: KdfConfig,

    /// Key-sharing defaults.
    #[serde(default)]
    pub share: ShareConfig,

    /// Provider overrides and additions, keyed by provider id.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSpec>,

    /// Local HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Encrypted key store location.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Proxy configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Upper bound for an outbound provider call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long the error status overlay stays up before reverting.
    #[serde(default = "default_error_revert")]
    pub error_revert_secs: u64,

    /// Number of error records retained for `GET_ERRORS`.
    #[serde(default = "default_error_log_capacity")]
    pub error_log_capacity: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            error_revert_secs: default_error_revert(),
            error_log_capacity: default_error_log_capacity(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_error_revert() -> u64 {
    30
}

fn default_error_log_capacity() -> usize {
    50
}

/// Argon2id parameters used to turn a password into a record key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfConfig {
    /// Memory cost in KiB.
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,

    /// Number of passes.
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Degree of parallelism.
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

fn default_memory_kib() -> u32 {
    19 * 1024
}

fn default_iterations() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

/// Key-sharing configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareConfig {
    /// Lifetime of a freshly wrapped bundle.
    #[serde(default = "default_bundle_ttl")]
    pub bundle_ttl_hours: u32,

    /// Name embedded in bundles as sender metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            bundle_ttl_hours: default_bundle_ttl(),
            sender_name: None,
        }
    }
}

fn default_bundle_ttl() -> u32 {
    24
}

/// Local server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

/// Encrypted key store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one record file per provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}
