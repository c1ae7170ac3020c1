//! # vaultproxy-core
//!
//! Core types, configuration, and utilities for VaultProxy.
//!
//! This crate provides shared functionality used across all VaultProxy crates:
//!
//! - **Configuration**: Loading, validation, and persistence of the JSON5 config
//! - **Providers**: The built-in provider catalog and its auth schemes
//! - **Proxy paths**: Parsing of `/proxy/<provider>/<rest>` URLs
//! - **Errors**: The caller-facing error taxonomy and a bounded error log
//! - **Secrets**: A zero-on-drop string type that never prints its contents

pub mod config;
pub mod error;
pub mod error_log;
pub mod paths;
pub mod provider;
pub mod proxy_path;
pub mod secret;

// Re-exports for convenience
pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use error_log::{ErrorCode, ErrorLog, ErrorRecord};
pub use provider::{AuthScheme, InjectedHeader, ProviderCatalog, ProviderSpec};
pub use proxy_path::ProxyPath;
pub use secret::SecretString;
