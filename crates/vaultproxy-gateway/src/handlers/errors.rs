//! GET_ERRORS and CLEAR_ERRORS.

use serde_json::{json, Value};

use super::HandlerContext;
use crate::Result;

pub async fn get_errors(ctx: &HandlerContext) -> Result<Value> {
    let errors = ctx.errors.lock().records();
    Ok(json!({ "errors": errors }))
}

/// Empty the log and drop the error overlay.
pub async fn clear_errors(ctx: &HandlerContext) -> Result<Value> {
    let cleared = {
        let mut log = ctx.errors.lock();
        let count = log.len();
        log.clear();
        count
    };
    let status = ctx.status.clear_error_overlay();
    Ok(json!({ "cleared": cleared, "status": status }))
}
