//! Status command.

use clap::Args;
use console::style;
use serde_json::Value;
use vaultproxy_core::Config;
use vaultproxy_gateway::{Command, MessageRouter};

use super::{build_router, read_password, unlock};

/// Status command arguments.
#[derive(Args)]
pub struct StatusArgs {
    /// Unlock first to check that the password opens every key
    #[arg(long)]
    pub unlock: bool,

    /// Print the raw status object as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the status command.
pub async fn run(args: StatusArgs, config: &Config) -> anyhow::Result<()> {
    let router = build_router(config).await?;
    if args.unlock {
        unlock(&router, read_password("Vault password: ")?).await?;
    }

    let status = fetch_status(&router).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let label = status["status"].as_str().unwrap_or("unknown");
    let styled = match label {
        "unlocked" => style(label).green().bold(),
        "locked" => style(label).yellow().bold(),
        "error" => style(label).red().bold(),
        _ => style(label).dim(),
    };
    println!("Status: {}", styled);
    println!("Stored keys:    {}", join_list(&status["storedProviders"]));
    if args.unlock {
        println!("Decrypted keys: {}", join_list(&status["decryptedProviders"]));
        println!("Rules:          {}", status["ruleCount"]);
    }

    Ok(())
}

/// Fetch the status object through the router.
pub async fn fetch_status(router: &MessageRouter) -> anyhow::Result<Value> {
    let envelope = router.dispatch(Command::GetStatus).await;
    match (envelope.data, envelope.error) {
        (Some(data), _) => Ok(data),
        (None, Some(error)) => anyhow::bail!("Failed to get status: {}", error.message),
        (None, None) => anyhow::bail!("Failed to get status"),
    }
}

fn join_list(value: &Value) -> String {
    let items: Vec<&str> = value
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::keys::add_key;
    use crate::commands::test_support::config_in;
    use serde_json::json;
    use tempfile::TempDir;
    use vaultproxy_core::SecretString;

    #[test]
    fn test_join_list() {
        assert_eq!(join_list(&json!(["anthropic", "openai"])), "anthropic, openai");
        assert_eq!(join_list(&json!([])), "(none)");
        assert_eq!(join_list(&Value::Null), "(none)");
    }

    #[tokio::test]
    async fn test_fetch_status_empty_store() {
        let dir = TempDir::new().unwrap();
        let router = build_router(&config_in(&dir)).await.unwrap();

        let status = fetch_status(&router).await.unwrap();
        assert_eq!(status["status"], "empty");
        assert_eq!(status["hasPassword"], false);
    }

    #[tokio::test]
    async fn test_fetch_status_after_unlock() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        add_key(&config, "openai", SecretString::new("sk-1"), &SecretString::new("pw1"))
            .await
            .unwrap();

        let router = build_router(&config).await.unwrap();
        assert_eq!(fetch_status(&router).await.unwrap()["status"], "locked");

        unlock(&router, SecretString::new("pw1")).await.unwrap();
        let status = fetch_status(&router).await.unwrap();
        assert_eq!(status["status"], "unlocked");
        assert_eq!(status["decryptedProviders"], json!(["openai"]));
        assert_eq!(status["ruleCount"], 1);
    }
}
