//! Configuration loading and persistence.

use super::Config;
use crate::error::ConfigError;
use crate::paths;
use crate::provider::valid_provider_id;
use std::fs;
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Load from `path` (or the default location), falling back to defaults
    /// when no file exists. Parse and validation failures are reported.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => paths::config_file()?,
        };

        let config = match Self::load(&path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 doesn't have a serializer, so we use serde_json with pretty print
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        // 1. Timers and buffers must be non-zero
        if self.proxy.request_timeout_secs == 0 {
            errors.push("proxy.request_timeout_secs must be greater than 0".to_string());
        }
        if self.proxy.error_revert_secs == 0 {
            errors.push("proxy.error_revert_secs must be greater than 0".to_string());
        }
        if self.proxy.error_log_capacity == 0 {
            errors.push("proxy.error_log_capacity must be greater than 0".to_string());
        }

        // 2. Argon2 limits (m >= 8 * p, t >= 1, p >= 1)
        if self.kdf.iterations == 0 {
            errors.push("kdf.iterations must be at least 1".to_string());
        }
        if self.kdf.parallelism == 0 {
            errors.push("kdf.parallelism must be at least 1".to_string());
        }
        if self.kdf.memory_kib < 8 * self.kdf.parallelism.max(1) {
            errors.push(format!(
                "kdf.memory_kib must be at least 8 * parallelism, got {}",
                self.kdf.memory_kib
            ));
        }

        // 3. Bundle lifetime
        if self.share.bundle_ttl_hours == 0 {
            errors.push("share.bundle_ttl_hours must be greater than 0".to_string());
        }

        // 4. Server port
        if self.server.port == 0 {
            errors.push("server.port cannot be 0".to_string());
        }

        // 5. Provider overrides: safe ids and absolute http(s) targets
        for (id, spec) in &self.providers {
            if !valid_provider_id(id) {
                errors.push(format!(
                    "Provider '{}': id must be lowercase alphanumeric, '-' or '_'",
                    id
                ));
            }
            match url::Url::parse(&spec.target) {
                Ok(u) if u.scheme() == "https" || u.scheme() == "http" => {}
                Ok(u) => errors.push(format!(
                    "Provider '{}': unsupported target scheme '{}'",
                    id,
                    u.scheme()
                )),
                Err(e) => errors.push(format!(
                    "Provider '{}': invalid target '{}': {}",
                    id, spec.target, e
                )),
            }
        }

        // Return collected errors
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    /// Resolve the key store directory, honouring `store.dir`.
    pub fn keys_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.store.dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::keys_dir(),
        }
    }
}
