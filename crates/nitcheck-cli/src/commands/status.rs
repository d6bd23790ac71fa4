use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::Value;

use crate::cli::StatusArgs;
use crate::output::print_success;

pub async fn run(args: &StatusArgs) -> Result<()> {
    let base = args.server.trim_end_matches('/');
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/healthz"))
        .send()
        .await
        .with_context(|| format!("reach {base}"))?
        .error_for_status()
        .context("server health check failed")?
        .json()
        .await
        .context("parse health response")?;
    print_success(&format!(
        "server {} ({base})",
        health["status"].as_str().unwrap_or("unknown")
    ));

    let scan: Value = client
        .get(format!("{base}/api/scan/status"))
        .send()
        .await?
        .error_for_status()
        .context("scan status check failed")?
        .json()
        .await
        .context("parse scan status response")?;

    let provider = scan["provider"].as_str().unwrap_or("none");
    if scan["configured"].as_bool().unwrap_or(false) {
        println!("{}: {}", "Scan provider".cyan(), provider);
    } else {
        println!(
            "{}: {} (scans will answer 503)",
            "Scan provider".cyan(),
            "none".yellow()
        );
    }

    Ok(())
}
