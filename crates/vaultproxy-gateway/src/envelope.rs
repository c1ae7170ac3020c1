//! The uniform response envelope returned for every command.

use serde::{Deserialize, Serialize};
use vaultproxy_core::ErrorCode;

use crate::error::GatewayError;

/// `{success: true, data}` or `{success: false, error}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl Envelope {
    /// Create a success envelope.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error envelope.
    pub fn err(error: EnvelopeError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.success
    }
}

impl From<&GatewayError> for Envelope {
    fn from(error: &GatewayError) -> Self {
        Self::err(EnvelopeError::from(error))
    }
}

/// Error half of an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl From<&GatewayError> for EnvelopeError {
    fn from(error: &GatewayError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
            context: error.context(),
        }
    }
}
