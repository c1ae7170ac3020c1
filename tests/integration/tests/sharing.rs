//! Key sharing across two vaults.
//!
//! Alice wraps keys from her store for Bob's identity; Bob unwraps the
//! serialized bundle, re-seals the keys under his own password and unlocks
//! them through his own router.

use std::collections::BTreeMap;

use chrono::Duration;
use serde_json::json;
use tempfile::TempDir;
use vaultproxy_core::SecretString;
use vaultproxy_gateway::Command;
use vaultproxy_integration_tests::{crypto, data, memory_store, router, seed, test_config};
use vaultproxy_secrets::share::{self, KeyShareBundle, RecipientIdentity, WrapOptions};
use vaultproxy_secrets::{FileKeyStore, KeyStore, ShareError};

async fn alice_keys(providers: &[&str]) -> BTreeMap<String, SecretString> {
    let config = test_config();
    let store = memory_store(
        &config,
        &[("openai", "sk-alice-openai"), ("anthropic", "sk-alice-ant")],
        "alice-pw",
    )
    .await;

    let crypto = crypto(&config);
    let password = SecretString::new("alice-pw");
    let mut keys = BTreeMap::new();
    for provider in providers {
        let record = store.get(provider).await.unwrap().unwrap();
        keys.insert(
            provider.to_string(),
            record.open(crypto.as_ref(), &password).unwrap(),
        );
    }
    keys
}

#[tokio::test]
async fn test_bundle_imports_into_recipient_vault() {
    let config = test_config();
    let crypto = crypto(&config);
    let bob = RecipientIdentity::generate(crypto.as_ref(), Some("bob".to_string())).unwrap();

    let keys = alice_keys(&["openai", "anthropic"]).await;
    let bundle = share::wrap(crypto.as_ref(), &keys, bob.public(), &WrapOptions::default()).unwrap();
    let wire = bundle.to_json().unwrap();
    assert!(!wire.contains("sk-alice"));

    let received = KeyShareBundle::from_json(&wire).unwrap();
    let outcome = share::unwrap(crypto.as_ref(), &received, &bob).unwrap();
    assert!(outcome.failed.is_empty());

    // Bob stores what he received under his own password, on disk.
    let dir = TempDir::new().unwrap();
    let bob_store = std::sync::Arc::new(FileKeyStore::new(dir.path().join("keys")));
    for (provider, key) in &outcome.succeeded {
        seed(bob_store.as_ref(), &config, &[(provider.as_str(), key.expose_secret())], "bob-pw").await;
    }

    let bob_router = router(&config, bob_store).await;
    let report = data(
        bob_router
            .dispatch(Command::Unlock {
                password: SecretString::new("bob-pw"),
            })
            .await,
    );
    assert_eq!(report["decrypted"], json!(["anthropic", "openai"]));
    assert_eq!(bob_router.context().rules().len(), 2);
}

#[tokio::test]
async fn test_tampered_entry_fails_alone() {
    let config = test_config();
    let crypto = crypto(&config);
    let bob = RecipientIdentity::generate(crypto.as_ref(), None).unwrap();

    let keys = alice_keys(&["openai", "anthropic"]).await;
    let mut bundle =
        share::wrap(crypto.as_ref(), &keys, bob.public(), &WrapOptions::default()).unwrap();
    bundle
        .payload
        .per_provider
        .get_mut("anthropic")
        .unwrap()
        .ciphertext[0] ^= 0x01;

    let outcome = share::unwrap(crypto.as_ref(), &bundle, &bob).unwrap();
    assert_eq!(outcome.failed, vec!["anthropic"]);
    assert_eq!(
        outcome.succeeded["openai"].expose_secret(),
        "sk-alice-openai"
    );
}

#[tokio::test]
async fn test_bundle_for_someone_else_is_rejected() {
    let config = test_config();
    let crypto = crypto(&config);
    let bob = RecipientIdentity::generate(crypto.as_ref(), None).unwrap();
    let mallory = RecipientIdentity::generate(crypto.as_ref(), None).unwrap();

    let keys = alice_keys(&["openai"]).await;
    let bundle = share::wrap(crypto.as_ref(), &keys, bob.public(), &WrapOptions::default()).unwrap();

    let err = share::unwrap(crypto.as_ref(), &bundle, &mallory).unwrap_err();
    assert!(matches!(err, ShareError::WrongRecipient { .. }));
}

#[tokio::test]
async fn test_expired_bundle_is_rejected() {
    let config = test_config();
    let crypto = crypto(&config);
    let bob = RecipientIdentity::generate(crypto.as_ref(), None).unwrap();

    let options = WrapOptions {
        ttl: Duration::hours(1),
        ..WrapOptions::default()
    };
    let keys = alice_keys(&["openai"]).await;
    let bundle = share::wrap(crypto.as_ref(), &keys, bob.public(), &options).unwrap();

    let later = bundle.expires_at + Duration::seconds(1);
    let err = share::unwrap_at(crypto.as_ref(), &bundle, &bob, later).unwrap_err();
    assert!(matches!(err, ShareError::Expired { .. }));

    // Still valid just before expiry.
    let before = bundle.expires_at - Duration::seconds(1);
    assert!(share::unwrap_at(crypto.as_ref(), &bundle, &bob, before).is_ok());
}
