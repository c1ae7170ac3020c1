//! Local HTTP server.
//!
//! `POST /rpc` accepts router commands and answers with envelopes.
//! `/proxy/<provider>/<path>` is a forward proxy driven by the rule table:
//! matching requests are rewritten to the provider with its key injected,
//! anything else goes to the fallback executor for a classified error.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use vaultproxy_core::config::ServerConfig;

use crate::envelope::Envelope;
use crate::error::GatewayError;
use crate::executor::{ProxyRequest, ProxyResponse};
use crate::router::{Command, MessageRouter};
use crate::Result;

/// Default server port.
pub const DEFAULT_PORT: u16 = 8787;

/// Hosts whose browser origins may call the server, on any port.
const ALLOWED_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

/// Server configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address.
    pub bind: IpAddr,

    /// Port number.
    pub port: u16,

    /// Enable CORS for localhost origins.
    pub cors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            cors: true,
        }
    }
}

impl GatewayConfig {
    pub fn from_server_config(config: &ServerConfig) -> Result<Self> {
        let bind = config
            .bind
            .parse()
            .map_err(|_| GatewayError::InvalidRequest(format!("invalid bind address: {}", config.bind)))?;
        Ok(Self {
            bind,
            port: config.port,
            ..Self::default()
        })
    }

    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// The HTTP front end.
pub struct Gateway {
    config: GatewayConfig,
    router: MessageRouter,
}

impl Gateway {
    pub fn new(config: GatewayConfig, router: MessageRouter) -> Self {
        Self { config, router }
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = self.config.address();

        if !self.config.bind.is_loopback() {
            warn!("========================================");
            warn!("  SECURITY WARNING: binding to {}", addr);
            warn!("  Anyone who can reach this address can use your unlocked keys.");
            warn!("========================================");
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(
        &self,
        listener: tokio::net::TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        self.router.init().await?;
        info!("Starting VaultProxy server on {}", listener.local_addr()?);

        axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }

    /// Build the axum application.
    pub fn app(&self) -> Router {
        let mut app = Router::new()
            .route("/health", get(health_handler))
            .route("/status", get(status_handler))
            .route("/rpc", post(rpc_handler))
            .route("/proxy/:provider/*rest", any(proxy_handler))
            .with_state(self.router.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors {
            app = app.layer(Self::cors_layer());
        }
        app
    }

    fn cors_layer() -> CorsLayer {
        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
                origin.to_str().map(is_local_origin).unwrap_or(false)
            }))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([axum::http::header::CONTENT_TYPE])
            .max_age(std::time::Duration::from_secs(3600))
    }
}

/// `http://localhost[:port]` or `http://127.0.0.1[:port]`, exactly.
fn is_local_origin(origin: &str) -> bool {
    let Ok(url) = url::Url::parse(origin) else {
        return false;
    };
    url.scheme() == "http"
        && url
            .host_str()
            .is_some_and(|host| ALLOWED_HOSTS.contains(&host))
        && url.origin().ascii_serialization() == origin
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn status_handler(State(router): State<MessageRouter>) -> Json<Envelope> {
    Json(router.dispatch(Command::GetStatus).await)
}

async fn rpc_handler(
    State(router): State<MessageRouter>,
    Json(message): Json<serde_json::Value>,
) -> Json<Envelope> {
    Json(router.handle_json(message).await)
}

async fn proxy_handler(
    State(router): State<MessageRouter>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match to_proxy_request(&method, &uri, &headers, &body) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    match router.forward(&request).await {
        Ok(response) => success_response(response),
        Err(e) => error_response(&e),
    }
}

fn to_proxy_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<ProxyRequest> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    let headers: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = if body.is_empty() {
        None
    } else {
        Some(
            String::from_utf8(body.to_vec())
                .map_err(|_| GatewayError::InvalidRequest("request body must be UTF-8".to_string()))?,
        )
    };

    Ok(ProxyRequest {
        url: format!("http://localhost{path_and_query}"),
        method: method.as_str().to_string(),
        headers,
        body,
    })
}

fn success_response(response: ProxyResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        if name == "content-length" {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    (status, headers, response.body).into_response()
}

fn error_response(error: &GatewayError) -> Response {
    (status_for(error), Json(Envelope::from(error))).into_response()
}

/// HTTP status used when a proxied call fails.
fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::NotProxyUrl(_) | GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        GatewayError::NoKey { .. } => StatusCode::NOT_FOUND,
        GatewayError::Locked { .. } => StatusCode::LOCKED,
        GatewayError::DecryptFailed { .. } => StatusCode::UNAUTHORIZED,
        GatewayError::Network { .. } => StatusCode::BAD_GATEWAY,
        GatewayError::Upstream { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
