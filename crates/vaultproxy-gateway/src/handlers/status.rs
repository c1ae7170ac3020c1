//! GET_STATUS.

use serde::Serialize;
use serde_json::Value;

use super::HandlerContext;
use crate::status::Status;
use crate::Result;

/// Status response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: Status,
    /// Whether a session (and so a password) is held.
    pub has_password: bool,
    pub stored_providers: Vec<String>,
    pub decrypted_providers: Vec<String>,
    pub rule_count: usize,
}

pub async fn get_status(ctx: &HandlerContext) -> Result<Value> {
    let response = status_response(ctx).await?;
    Ok(serde_json::to_value(response)?)
}

pub async fn status_response(ctx: &HandlerContext) -> Result<StatusResponse> {
    ctx.refresh_status().await?;

    Ok(StatusResponse {
        status: ctx.status.status(),
        has_password: ctx.sessions.is_active().await,
        stored_providers: ctx.sessions.store().list_providers().await?,
        decrypted_providers: ctx.sessions.decrypted_providers().await,
        rule_count: ctx.rules().len(),
    })
}
