//! End-to-end session scenarios through the message router.
//!
//! Each test wires the real store, crypto, rule synthesizer, status engine
//! and executor together and talks to them only through router commands.

use std::time::Duration;

use serde_json::json;
use vaultproxy_core::{ErrorCode, SecretString};
use vaultproxy_gateway::{Command, ProxyRequest, Status};
use vaultproxy_integration_tests::{config_with_target, data, memory_store, router, test_config};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OPENAI_KEY: &str = "sk-openai-integration-secret";

fn unlock(password: &str) -> Command {
    Command::Unlock {
        password: SecretString::new(password),
    }
}

fn proxy(url: &str) -> Command {
    Command::ProxyRequest(ProxyRequest::get(url))
}

#[tokio::test]
async fn test_correct_password_unlocks_and_registers_rule() {
    let config = test_config();
    let store = memory_store(&config, &[("openai", OPENAI_KEY)], "pw1").await;
    let router = router(&config, store).await;

    let report = data(router.dispatch(unlock("pw1")).await);
    assert_eq!(report["decrypted"], json!(["openai"]));
    assert_eq!(report["failed"], json!([]));

    let rules = router.context().rules().snapshot();
    assert_eq!(rules.len(), 1);
    let rule = &rules[0];
    assert_eq!(rule.provider, "openai");
    assert_eq!(rule.injected_headers[0].name, "authorization");
    assert_eq!(
        rule.injected_headers[0].value.expose_secret(),
        format!("Bearer {OPENAI_KEY}")
    );
    assert_eq!(
        rule.apply("http://localhost/proxy/openai/v1/models?limit=2")
            .unwrap()
            .as_str(),
        "https://api.openai.com/v1/models?limit=2"
    );
    assert!(rule.apply("http://localhost/proxy/anthropic/v1/messages").is_none());

    assert_eq!(router.context().status.status(), Status::Unlocked);
}

#[tokio::test(start_paused = true)]
async fn test_wrong_password_fails_every_provider_then_reverts_to_locked() {
    let config = test_config();
    let store = memory_store(&config, &[("openai", OPENAI_KEY), ("groq", "gsk-1")], "pw1").await;
    let router = router(&config, store).await;

    let report = data(router.dispatch(unlock("wrong")).await);
    assert_eq!(report["decrypted"], json!([]));
    assert_eq!(report["failed"], json!(["groq", "openai"]));
    assert!(report["warning"].is_string());

    assert!(router.context().rules().is_empty());
    assert!(!router.context().sessions.is_active().await);
    assert_eq!(router.context().status.status(), Status::Error);

    tokio::time::sleep(Duration::from_secs(config.proxy.error_revert_secs + 1)).await;
    assert_eq!(router.context().status.status(), Status::Locked);
}

#[tokio::test]
async fn test_empty_store_status() {
    let config = test_config();
    let router = router(&config, memory_store(&config, &[], "pw1").await).await;

    let status = data(router.dispatch(Command::GetStatus).await);
    assert_eq!(status["status"], "empty");
    assert_eq!(status["hasPassword"], false);
    assert_eq!(status["storedProviders"], json!([]));
}

#[tokio::test]
async fn test_proxy_request_no_key_and_locked() {
    let config = test_config();
    let store = memory_store(&config, &[("openai", OPENAI_KEY)], "pw1").await;
    let router = router(&config, store).await;

    let envelope = router
        .dispatch(proxy("http://localhost/proxy/anthropic/v1/messages"))
        .await;
    assert_eq!(envelope.error.unwrap().code, ErrorCode::NoKey);

    let envelope = router
        .dispatch(proxy("http://localhost/proxy/openai/v1/models"))
        .await;
    let error = envelope.error.unwrap();
    assert_eq!(error.code, ErrorCode::Locked);
    assert_eq!(error.context["provider"], "openai");

    let envelope = router.dispatch(proxy("http://localhost/v1/models")).await;
    assert_eq!(envelope.error.unwrap().code, ErrorCode::NoKey);
}

#[tokio::test]
async fn test_proxy_request_upstream_errors_carry_hints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/usage"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let config = config_with_target("openai", &server.uri());
    let store = memory_store(&config, &[("openai", OPENAI_KEY)], "pw1").await;
    let router = router(&config, store).await;
    data(router.dispatch(unlock("pw1")).await);

    let error = router
        .dispatch(proxy("http://localhost/proxy/openai/v1/models"))
        .await
        .error
        .unwrap();
    assert_eq!(error.code, ErrorCode::UpstreamError);
    assert_eq!(error.context["status"], 401);
    assert!(error.context["hint"].as_str().unwrap().contains("invalid"));

    let error = router
        .dispatch(proxy("http://localhost/proxy/openai/v1/usage"))
        .await
        .error
        .unwrap();
    assert_eq!(error.code, ErrorCode::UpstreamError);
    assert_eq!(error.context["status"], 429);
    assert!(error.context["hint"].as_str().unwrap().contains("Rate limited"));

    let errors = data(router.dispatch(Command::GetErrors).await);
    assert_eq!(errors["errors"].as_array().unwrap().len(), 2);
    assert_eq!(router.context().status.status(), Status::Error);
}

#[tokio::test]
async fn test_proxy_request_injects_key_over_caller_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", format!("Bearer {OPENAI_KEY}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"id":"chatcmpl-1"}"#, "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_with_target("openai", &server.uri());
    let store = memory_store(&config, &[("openai", OPENAI_KEY)], "pw1").await;
    let router = router(&config, store).await;
    data(router.dispatch(unlock("pw1")).await);

    let mut request = ProxyRequest::get("http://localhost/proxy/openai/v1/chat/completions");
    request.method = "POST".to_string();
    request
        .headers
        .insert("Authorization".to_string(), "Bearer placeholder".to_string());
    request.body = Some(r#"{"model":"gpt-4o-mini"}"#.to_string());

    let response = data(router.dispatch(Command::ProxyRequest(request)).await);
    assert_eq!(response["status"], 200);
    assert_eq!(response["body"], r#"{"id":"chatcmpl-1"}"#);
}

#[tokio::test]
async fn test_lock_is_idempotent() {
    let config = test_config();
    let store = memory_store(&config, &[("openai", OPENAI_KEY)], "pw1").await;
    let router = router(&config, store).await;

    for _ in 0..2 {
        let locked = data(router.dispatch(Command::Lock).await);
        assert_eq!(locked["status"], "locked");
        assert!(router.context().rules().is_empty());
        assert!(router.context().sessions.decrypted_providers().await.is_empty());
    }

    data(router.dispatch(unlock("pw1")).await);
    data(router.dispatch(Command::Lock).await);
    data(router.dispatch(Command::Lock).await);
    assert!(router.context().rules().is_empty());
    assert!(!router.context().sessions.is_active().await);
}

#[tokio::test]
async fn test_unlock_twice_yields_same_state() {
    let config = test_config();
    let store = memory_store(
        &config,
        &[("openai", OPENAI_KEY), ("anthropic", "sk-ant-1")],
        "pw1",
    )
    .await;
    let router = router(&config, store).await;

    let first = data(router.dispatch(unlock("pw1")).await);
    let first_rules = router.context().rules().len();
    let second = data(router.dispatch(unlock("pw1")).await);

    assert_eq!(first["decrypted"], second["decrypted"]);
    assert_eq!(router.context().rules().len(), first_rules);
    assert_eq!(first_rules, 2);
}

#[tokio::test]
async fn test_keys_changed_reunlocks_with_new_record() {
    let config = test_config();
    let store = memory_store(&config, &[("openai", OPENAI_KEY)], "pw1").await;
    let router = router(&config, store.clone()).await;
    data(router.dispatch(unlock("pw1")).await);

    vaultproxy_integration_tests::seed(store.as_ref(), &config, &[("mistral", "ms-1")], "pw1").await;
    let result = data(router.dispatch(Command::KeysChanged).await);

    assert_eq!(result["reunlocked"], true);
    assert_eq!(result["report"]["decrypted"], json!(["mistral", "openai"]));
    assert_eq!(router.context().rules().len(), 2);
}
