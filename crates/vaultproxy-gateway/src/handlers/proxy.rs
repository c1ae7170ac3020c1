//! PROXY_REQUEST and rule-first forwarding.

use serde_json::Value;
use tracing::debug;
use vaultproxy_core::ProxyPath;

use super::HandlerContext;
use crate::executor::{ProxyRequest, ProxyResponse};
use crate::Result;

pub async fn proxy_request(ctx: &HandlerContext, request: &ProxyRequest) -> Result<Value> {
    debug!(method = %request.method, "Proxy request via fallback executor");
    let response = ctx.executor.execute(request).await?;
    Ok(response.to_json())
}

/// Apply the matching redirect rule, or fall back to the executor when none
/// matches so the caller still gets a classified error.
pub async fn forward(ctx: &HandlerContext, request: &ProxyRequest) -> Result<ProxyResponse> {
    if let Some(path) = ProxyPath::parse(&request.url) {
        if let Some(rule) = ctx.rules().find(&path) {
            if let Some(target) = rule.apply_path(&path) {
                debug!(rule = rule.id, provider = %rule.provider, "redirect rule matched");
                return ctx
                    .executor
                    .send(&rule.provider, target, request, &rule.injected_headers)
                    .await;
            }
        }
    }
    ctx.executor.execute(request).await
}
