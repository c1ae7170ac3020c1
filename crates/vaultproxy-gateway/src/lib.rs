//! Session, rules, status and request routing for VaultProxy.
//!
//! This crate provides:
//! - The session manager that unlocks stored keys with a password
//! - Redirect rule synthesis and the rule table
//! - The status engine with its self-reverting error overlay
//! - A typed message router answering with uniform envelopes
//! - A fallback executor for proxied calls no rule handled
//! - An axum server exposing the router and a local forward proxy

pub mod envelope;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod router;
pub mod rules;
pub mod server;
pub mod session;
pub mod status;

pub use envelope::{Envelope, EnvelopeError};
pub use error::GatewayError;
pub use executor::{FallbackExecutor, ProxyRequest, ProxyResponse};
pub use handlers::HandlerContext;
pub use router::{Command, MessageRouter};
pub use rules::{InMemoryRuleTable, RedirectRule, RuleSynthesizer, RuleTable};
pub use server::{Gateway, GatewayConfig};
pub use session::{KeyLookup, SessionContext, SessionManager, UnlockReport};
pub use status::{derive_status, Status, StatusEngine, StatusInputs};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
