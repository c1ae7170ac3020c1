//! Request command: unlock, then send one call through the proxy.

use std::collections::BTreeMap;

use clap::Args;
use vaultproxy_core::Config;
use vaultproxy_gateway::{Command, Envelope, ProxyRequest};

use super::{build_router, read_password, unlock};

/// Host used for proxy paths given without one.
const LOCAL_ORIGIN: &str = "http://localhost";

/// Request command arguments.
#[derive(Args)]
pub struct RequestArgs {
    /// Proxy URL, e.g. http://localhost/proxy/openai/v1/models or /proxy/openai/v1/models
    pub url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Request header as "Name: value" (repeatable)
    #[arg(short = 'H', long)]
    pub header: Vec<String>,

    /// Request body
    #[arg(short, long)]
    pub body: Option<String>,

    /// Print the whole response envelope as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the request command.
pub async fn run(args: RequestArgs, config: &Config) -> anyhow::Result<()> {
    let request = build_request(&args)?;

    let router = build_router(config).await?;
    unlock(&router, read_password("Vault password: ")?).await?;

    let envelope = router.dispatch(Command::ProxyRequest(request)).await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        if !envelope.success {
            anyhow::bail!("Request failed");
        }
        return Ok(());
    }

    print_response(envelope)
}

/// Turn command-line arguments into a proxy request.
pub fn build_request(args: &RequestArgs) -> anyhow::Result<ProxyRequest> {
    let url = if args.url.starts_with('/') {
        format!("{LOCAL_ORIGIN}{}", args.url)
    } else {
        args.url.clone()
    };

    let mut headers = BTreeMap::new();
    for raw in &args.header {
        let (name, value) = parse_header(raw)?;
        headers.insert(name, value);
    }

    Ok(ProxyRequest {
        url,
        method: args.method.to_ascii_uppercase(),
        headers,
        body: args.body.clone(),
    })
}

fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        anyhow::bail!("Invalid header '{}': expected \"Name: value\"", raw);
    };
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Invalid header '{}': empty name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn print_response(envelope: Envelope) -> anyhow::Result<()> {
    if let Some(error) = envelope.error {
        if let Some(hint) = error.context.get("hint").and_then(|h| h.as_str()) {
            eprintln!("{} {}", console::style("hint:").dim(), hint);
        }
        anyhow::bail!("[{}] {}", error.code, error.message);
    }

    let data = envelope.data.unwrap_or_default();
    eprintln!("HTTP {}", data["status"]);
    if let Some(body) = data["body"].as_str() {
        println!("{body}");
    }
    Ok(())
}
