//! Secrets never leave the vault through envelopes, error records or logs.

use serde_json::json;
use vaultproxy_core::SecretString;
use vaultproxy_gateway::{Command, Envelope, ProxyRequest};
use vaultproxy_integration_tests::{config_with_target, memory_store, router, LogCapture};
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "sk-hygiene-4f9a1c";
const PASSWORD: &str = "correct horse battery";

fn assert_clean(label: &str, text: &str) {
    assert!(!text.contains(KEY), "{label} leaked the provider key: {text}");
    assert!(!text.contains(PASSWORD), "{label} leaked the password: {text}");
}

#[tokio::test]
async fn test_no_secret_in_any_output() {
    let (logs, _guard) = LogCapture::install();

    let server = MockServer::start().await;
    Mock::given(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
        .mount(&server)
        .await;
    Mock::given(path("/v1/forbidden"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let config = config_with_target("openai", &server.uri());
    let store = memory_store(&config, &[("openai", KEY)], PASSWORD).await;
    let router = router(&config, store).await;

    let mut envelopes: Vec<Envelope> = Vec::new();
    envelopes.push(
        router
            .dispatch(Command::Unlock {
                password: SecretString::new("not the password"),
            })
            .await,
    );
    envelopes.push(
        router
            .dispatch(Command::Unlock {
                password: SecretString::new(PASSWORD),
            })
            .await,
    );
    for url in [
        "http://localhost/proxy/openai/v1/models",
        "http://localhost/proxy/openai/v1/forbidden",
        "http://localhost/proxy/cohere/v1/chat",
    ] {
        envelopes.push(router.dispatch(Command::ProxyRequest(ProxyRequest::get(url))).await);
    }
    envelopes.push(router.dispatch(Command::GetStatus).await);
    envelopes.push(router.dispatch(Command::GetErrors).await);

    for envelope in &envelopes {
        assert_clean("envelope", &serde_json::to_string(envelope).unwrap());
    }

    assert_clean(
        "rule debug output",
        &format!("{:?}", router.context().rules().snapshot()),
    );
    assert_clean("error log", &format!("{:?}", router.context().errors.lock().records()));

    let output = logs.contents();
    assert!(!output.is_empty(), "expected some log output");
    assert_clean("logs", &output);
}

#[tokio::test]
async fn test_malformed_unlock_does_not_echo_password() {
    let (logs, _guard) = LogCapture::install();

    let config = config_with_target("openai", "http://127.0.0.1:9");
    let store = memory_store(&config, &[("openai", KEY)], PASSWORD).await;
    let router = router(&config, store).await;

    let numeric = router
        .handle_json(json!({"type": "UNLOCK", "password": 918273645}))
        .await;
    let nested = router
        .handle_json(json!({"type": "UNLOCK", "password": [PASSWORD]}))
        .await;

    for envelope in [&numeric, &nested] {
        assert!(!envelope.success);
        let text = serde_json::to_string(envelope).unwrap();
        assert!(!text.contains("918273645"), "envelope echoed the value: {text}");
        assert_clean("envelope", &text);
    }

    let records = format!("{:?}", router.context().errors.lock().records());
    assert!(!records.contains("918273645"));
    assert_clean("error log", &records);

    let output = logs.contents();
    assert!(!output.contains("918273645"));
    assert_clean("logs", &output);
}
