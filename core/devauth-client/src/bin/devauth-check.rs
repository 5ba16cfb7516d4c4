//! Device authorization check
//!
//! Runs one authorization check against a devauth server and exits 0 when
//! this device is authorized, 1 when it is not.
//!
//! Usage:
//!   devauth-check --server http://localhost:8000 --software-name my-app
//!
//! The shared secret is read from `--secret` or `CLIENT_SECRET`.

use std::{path::PathBuf, process::ExitCode, time::Duration};
use anyhow::{Context, Result};
use clap::Parser;
use devauth_client::{AuthClient, ClientConfig};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "devauth-check")]
#[command(about = "Check whether this device is authorized")]
struct Args {
    /// Authorization server base URL
    #[arg(short, long, env = "DEVAUTH_SERVER_URL")]
    server: String,

    /// Shared wire secret
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Explicit device id (persisted and reused)
    #[arg(long)]
    device_id: Option<String>,

    /// Software name reported to the server
    #[arg(long)]
    software_name: Option<String>,

    /// Cache directory override
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Disable the offline cache
    #[arg(long)]
    no_cache: bool,

    /// Cache validity in days
    #[arg(long, default_value = "7")]
    validity_days: u32,

    /// Check interval in days
    #[arg(long, default_value = "2")]
    interval_days: u32,

    /// Heartbeat timeout in seconds
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Print the authorization summary as JSON
    #[arg(long)]
    info: bool,

    /// Print cache diagnostics as JSON instead of checking
    #[arg(long)]
    cache_info: bool,

    /// Delete the local cache before checking
    #[arg(long)]
    clear_cache: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = ClientConfig::new(args.server)
        .with_cache_enabled(!args.no_cache)
        .with_cache_validity_days(args.validity_days)
        .with_check_interval_days(args.interval_days)
        .with_request_timeout(Duration::from_secs(args.timeout));
    config.client_secret = args.secret;
    config.device_id = args.device_id;
    config.software_name = args.software_name;
    config.cache_dir = args.cache_dir;

    let client = AuthClient::new(config).context("Failed to build authorization client")?;

    if args.clear_cache && !client.clear_cache() {
        warn!("Could not clear the local cache");
    }

    if args.cache_info {
        match client.cache_info() {
            Some(cache) => println!("{}", serde_json::to_string_pretty(&cache)?),
            None => println!("null"),
        }
        return Ok(ExitCode::SUCCESS);
    }

    if args.info {
        let summary = client.authorization_info();
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(exit_code(summary.success && summary.authorized));
    }

    match client.require_authorization() {
        Ok(()) => {
            info!("Device {} is authorized", client.device_id());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let kind = if e.is_network_error() {
                "network"
            } else if e.is_unauthorized() {
                "unauthorized"
            } else {
                "validation"
            };
            warn!("Authorization failed ({}): {}", kind, e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn exit_code(authorized: bool) -> ExitCode {
    if authorized {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
