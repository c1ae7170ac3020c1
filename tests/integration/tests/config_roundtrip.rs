//! Config save/load roundtrip integration tests.
//!
//! These tests verify that configuration can be serialized, written to disk,
//! loaded back, and fed into the provider catalog and the router.

use std::path::Path;

use tempfile::TempDir;
use vaultproxy_core::config::Config;
use vaultproxy_core::provider::AuthScheme;
use vaultproxy_core::ProviderCatalog;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vaultproxy.json5");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.server.port, config.server.port);
    assert_eq!(loaded.server.bind, config.server.bind);
    assert_eq!(loaded.kdf, config.kdf);
    assert_eq!(loaded.proxy.error_revert_secs, config.proxy.error_revert_secs);
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vaultproxy.json5");

    let mut config = Config::default();
    config.server.port = 9090;
    config.share.sender_name = Some("alice".to_string());
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.server.port, 9090);
    assert_eq!(loaded.share.sender_name.as_deref(), Some("alice"));
}

#[test]
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/vaultproxy.json5"));
    assert!(result.is_err());

    // load_or_default treats a missing file as "use defaults".
    let config = Config::load_or_default(Some(Path::new("/nonexistent/vaultproxy.json5"))).unwrap();
    assert_eq!(config.server.port, 8787);
}

#[test]
fn test_config_parse_invalid() {
    assert!(Config::parse("not valid json").is_err());
}

#[test]
fn test_handwritten_json5_drives_catalog() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vaultproxy.json5");
    std::fs::write(
        &path,
        r#"{
            // Route openai through a company gateway.
            providers: {
                openai: { target: "https://llm-gateway.example.com/openai", auth: { type: "bearer" } },
                together: {
                    target: "https://api.together.xyz",
                    auth: { type: "header", name: "X-Api-Key" },
                },
            },
            proxy: { error_log_capacity: 10, },
        }"#,
    )
    .unwrap();

    let config = Config::load_or_default(Some(&path)).unwrap();
    assert_eq!(config.proxy.error_log_capacity, 10);

    let catalog = ProviderCatalog::from_config(&config).unwrap();
    assert_eq!(
        catalog.get("openai").unwrap().target,
        "https://llm-gateway.example.com/openai"
    );
    assert_eq!(
        catalog.get("together").unwrap().auth,
        AuthScheme::Header {
            name: "X-Api-Key".to_string()
        }
    );
    // Built-ins not mentioned survive.
    assert!(catalog.contains("anthropic"));
}

#[test]
fn test_invalid_values_are_all_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vaultproxy.json5");
    std::fs::write(
        &path,
        r#"{ server: { port: 0 }, kdf: { iterations: 0 }, providers: { "Bad Id": { target: "ftp://x", auth: { type: "bearer" } } } }"#,
    )
    .unwrap();

    let err = Config::load_or_default(Some(&path)).unwrap_err().to_string();
    assert!(err.contains("server.port"));
    assert!(err.contains("kdf.iterations"));
    assert!(err.contains("Bad Id"));
}
