//! Message router.
//!
//! A closed set of typed commands, each answered with an [`Envelope`].
//! Handler errors and panics stop here: they are logged, recorded in the
//! error log and returned as error envelopes.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};
use vaultproxy_core::SecretString;

use crate::envelope::Envelope;
use crate::error::GatewayError;
use crate::executor::{ProxyRequest, ProxyResponse};
use crate::handlers::{self, HandlerContext};
use crate::Result;

/// Commands accepted by the router, tagged by `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Unlock { password: SecretString },
    Lock,
    GetStatus,
    GetErrors,
    ClearErrors,
    KeysChanged,
    ProxyRequest(ProxyRequest),
}

impl Command {
    const TYPES: [&'static str; 7] = [
        "UNLOCK",
        "LOCK",
        "GET_STATUS",
        "GET_ERRORS",
        "CLEAR_ERRORS",
        "KEYS_CHANGED",
        "PROXY_REQUEST",
    ];

    /// Whether `kind` names a command the router accepts.
    pub fn is_known_type(kind: &str) -> bool {
        Self::TYPES.contains(&kind)
    }

    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unlock { .. } => "UNLOCK",
            Self::Lock => "LOCK",
            Self::GetStatus => "GET_STATUS",
            Self::GetErrors => "GET_ERRORS",
            Self::ClearErrors => "CLEAR_ERRORS",
            Self::KeysChanged => "KEYS_CHANGED",
            Self::ProxyRequest(_) => "PROXY_REQUEST",
        }
    }
}

/// Dispatches commands to handlers.
#[derive(Clone)]
pub struct MessageRouter {
    context: Arc<HandlerContext>,
}

impl MessageRouter {
    pub fn new(context: HandlerContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    /// Derive the initial status from the store.
    pub async fn init(&self) -> Result<()> {
        self.context.refresh_status().await.map(|_| ())
    }

    /// Run `command` and wrap the outcome in an envelope. Never panics.
    pub async fn dispatch(&self, command: Command) -> Envelope {
        let name = command.name();
        debug!("Dispatching command: {}", name);

        let outcome = AssertUnwindSafe(self.handle(command)).catch_unwind().await;
        match outcome {
            Ok(Ok(data)) => Envelope::ok(data),
            Ok(Err(e)) => self.fail(e),
            Err(panic) => {
                error!("Handler for {} panicked", name);
                self.fail(GatewayError::Internal(format!(
                    "{name} handler panicked: {}",
                    panic_message(panic.as_ref())
                )))
            }
        }
    }

    /// Parse a raw `{type, ...}` message and dispatch it.
    ///
    /// Parse failures never echo field values, which may include a password.
    pub async fn handle_json(&self, message: Value) -> Envelope {
        let kind = message
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_owned);
        match serde_json::from_value::<Command>(message) {
            Ok(command) => self.dispatch(command).await,
            Err(_) => {
                let message = malformed_message(kind.as_deref());
                self.fail(GatewayError::InvalidRequest(message))
            }
        }
    }

    /// Forward a request through the rule table, falling back to the executor.
    /// Failures are recorded like command errors.
    pub async fn forward(&self, request: &ProxyRequest) -> Result<ProxyResponse> {
        let result = handlers::proxy::forward(&self.context, request).await;
        if let Err(e) = &result {
            self.context.record_error(e);
        }
        result
    }

    async fn handle(&self, command: Command) -> Result<Value> {
        let ctx = self.context.as_ref();
        match command {
            Command::Unlock { password } => handlers::session::unlock(ctx, password).await,
            Command::Lock => handlers::session::lock(ctx).await,
            Command::GetStatus => handlers::status::get_status(ctx).await,
            Command::GetErrors => handlers::errors::get_errors(ctx).await,
            Command::ClearErrors => handlers::errors::clear_errors(ctx).await,
            Command::KeysChanged => handlers::session::keys_changed(ctx).await,
            Command::ProxyRequest(request) => handlers::proxy::proxy_request(ctx, &request).await,
        }
    }

    fn fail(&self, error: GatewayError) -> Envelope {
        self.context.record_error(&error);
        Envelope::from(&error)
    }
}

fn malformed_message(kind: Option<&str>) -> String {
    match kind {
        Some(kind) if Command::is_known_type(kind) => {
            format!("malformed {kind} command: missing or mistyped fields")
        }
        Some(_) => "unknown command type".to_string(),
        None => "malformed command: expected {type, ...}".to_string(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
