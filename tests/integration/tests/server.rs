//! The HTTP front end on a real socket.

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use vaultproxy_gateway::{Gateway, GatewayConfig};
use vaultproxy_integration_tests::{config_with_target, memory_store, router};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "sk-server-test";

struct Running {
    base: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for Running {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn start(upstream: &MockServer) -> Running {
    let config = config_with_target("openai", &upstream.uri());
    let store = memory_store(&config, &[("openai", KEY)], "pw1").await;
    let gateway = Gateway::new(GatewayConfig::default(), router(&config, store).await);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        gateway
            .serve(listener, async move {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    Running {
        base,
        shutdown: Some(tx),
    }
}

async fn rpc(client: &reqwest::Client, base: &str, message: Value) -> Value {
    client
        .post(format!("{base}/rpc"))
        .json(&message)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_forward_proxy_locked_then_unlocked() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(query_param("limit", "1"))
        .and(header("authorization", format!("Bearer {KEY}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"data":[]}"#, "application/json"))
        .mount(&upstream)
        .await;

    let server = start(&upstream).await;
    let client = reqwest::Client::new();
    let url = format!("{}/proxy/openai/v1/models?limit=1", server.base);

    let locked = client.get(&url).send().await.unwrap();
    assert_eq!(locked.status().as_u16(), 423);
    let envelope: Value = locked.json().await.unwrap();
    assert_eq!(envelope["error"]["code"], "LOCKED");

    let report = rpc(&client, &server.base, json!({"type": "UNLOCK", "password": "pw1"})).await;
    assert_eq!(report["success"], true);
    assert_eq!(report["data"]["decrypted"], json!(["openai"]));

    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), r#"{"data":[]}"#);

    let status = rpc(&client, &server.base, json!({"type": "GET_STATUS"})).await;
    assert_eq!(status["data"]["status"], "unlocked");
    assert_eq!(status["data"]["ruleCount"], 1);
}

#[tokio::test]
async fn test_rpc_rejects_unknown_command() {
    let upstream = MockServer::start().await;
    let server = start(&upstream).await;
    let client = reqwest::Client::new();

    let envelope = rpc(&client, &server.base, json!({"type": "REBOOT"})).await;
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error"]["code"], "UNKNOWN");

    let health: Value = client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
}
