//! Path resolution utilities.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the VaultProxy base directory (~/.vaultproxy).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".vaultproxy"))
}

/// Get the main config file path (~/.vaultproxy/vaultproxy.json5).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("vaultproxy.json5"))
}

/// Get the encrypted key store directory (~/.vaultproxy/keys).
pub fn keys_dir() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("keys"))
}

/// Get the key-sharing identity file (~/.vaultproxy/identity.json).
///
/// Holds the recipient's private key and must stay on this machine.
pub fn identity_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("identity.json"))
}

/// Get the publishable half of the identity (~/.vaultproxy/identity.pub.json).
pub fn public_identity_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("identity.pub.json"))
}
