//! UNLOCK, LOCK and KEYS_CHANGED.

use serde_json::{json, Value};
use tracing::debug;
use vaultproxy_core::SecretString;

use super::HandlerContext;
use crate::error::GatewayError;
use crate::session::UnlockReport;
use crate::Result;

pub async fn unlock(ctx: &HandlerContext, password: SecretString) -> Result<Value> {
    debug!("Unlock request");
    let report = ctx.sessions.unlock(password).await?;
    settle_overlay(ctx, &report);
    ctx.refresh_status().await?;
    Ok(serde_json::to_value(&report)?)
}

pub async fn lock(ctx: &HandlerContext) -> Result<Value> {
    debug!("Lock request");
    ctx.sessions.lock().await;
    let status = ctx.refresh_status().await?;
    Ok(json!({ "locked": true, "status": status }))
}

/// Re-unlock with the session password, or just re-derive status.
pub async fn keys_changed(ctx: &HandlerContext) -> Result<Value> {
    debug!("Keys changed notification");
    let report = ctx.sessions.refresh().await?;
    if let Some(report) = &report {
        settle_overlay(ctx, report);
    }
    let status = ctx.refresh_status().await?;

    Ok(json!({
        "reunlocked": report.is_some(),
        "report": report,
        "status": status,
    }))
}

/// A successful unlock supersedes any earlier error overlay.
fn settle_overlay(ctx: &HandlerContext, report: &UnlockReport) {
    if report.all_failed() {
        ctx.record_error(&GatewayError::DecryptFailed {
            providers: report.failed.clone(),
        });
    } else {
        ctx.status.clear_error_overlay();
    }
}
