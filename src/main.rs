// Copyright 2026 OPPO Cloud Client Contributors
// SPDX-License-Identifier: Apache-2.0

//! Operator CLI for poking the client without a host application:
//! connection test, one-shot fetch, standalone login.
//!
//! Credentials come from the environment so they never land in shell
//! history: `OPPO_USERNAME`, `OPPO_PASSWORD`, and optionally
//! `OPPO_BROWSER_URL` (defaults to a local automation host).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use oppo_cloud_client::{BrowserEndpoint, ClientConfig, Credentials, OppoCloudClient};

const DEFAULT_BROWSER_URL: &str = "http://localhost:4444/wd/hub";

#[derive(Parser)]
#[command(
    name = "oppocloud",
    about = "OPPO Cloud find-device client",
    version,
    after_help = "Environment: OPPO_USERNAME, OPPO_PASSWORD, OPPO_BROWSER_URL"
)]
struct Cli {
    /// Keep the browser session alive between operations
    #[arg(long, global = true)]
    keep_session: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the remote browser is reachable and can render the console
    Test,
    /// Log in and print the current device list
    Fetch,
    /// Run the login flow on its own
    Login,
}

fn client_from_env() -> Result<OppoCloudClient> {
    let username = std::env::var("OPPO_USERNAME").context("OPPO_USERNAME is not set")?;
    let password = std::env::var("OPPO_PASSWORD").context("OPPO_PASSWORD is not set")?;
    let browser_url =
        std::env::var("OPPO_BROWSER_URL").unwrap_or_else(|_| DEFAULT_BROWSER_URL.to_string());

    let endpoint = BrowserEndpoint::parse(&browser_url)?;
    let config = ClientConfig::new(Credentials::new(username, password), endpoint);
    Ok(OppoCloudClient::new(config))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "oppo_cloud_client=debug,oppocloud=debug"
    } else {
        "oppo_cloud_client=info,oppocloud=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let client = client_from_env()?;
    if cli.keep_session {
        client.set_keep_session(true).await;
    }

    // Tear the session down whatever the command did.
    let result = run(&client, cli.command).await;
    client.cleanup().await;
    result
}

async fn run(client: &OppoCloudClient, command: Commands) -> Result<()> {
    match command {
        Commands::Test => {
            let ok = client.test_connection().await?;
            println!("connection ok: {ok}");
        }
        Commands::Fetch => {
            let devices = client.fetch_devices().await?;
            println!("{} device(s)", devices.len());
            for device in &devices {
                let position = match (device.latitude, device.longitude) {
                    (Some(lat), Some(lng)) => format!("{lat:.6},{lng:.6}"),
                    _ => "unknown".to_string(),
                };
                println!(
                    "- {} | {} | last seen: {} | online: {} | battery: {}% | {}",
                    device.device_model,
                    device.location_name,
                    device.last_seen.as_deref().unwrap_or("?"),
                    device.is_online,
                    device.battery_level,
                    position,
                );
            }
        }
        Commands::Login => {
            client.login().await?;
            println!("login ok");
        }
    }
    Ok(())
}
