//! Devauth authorization server
//!
//! Answers sealed heartbeats from devauth clients and keeps the device
//! registry. The same binary is the administrator's tool for revoking or
//! annotating devices.
//!
//! Usage:
//!   devauth-server --db devices.db serve --port 8000
//!   devauth-server --db devices.db revoke <device_id>
//!
//! The shared secret is read from `--secret` or `CLIENT_SECRET`.

use std::{
    net::IpAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devauth_crypto::WireCipher;
use devauth_server::{AppState, DeviceRecord, DeviceRegistry, MemoryRegistry, SqliteRegistry};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "devauth-server")]
#[command(about = "Device authorization server")]
struct Args {
    /// SQLite registry path (in-memory when omitted)
    #[arg(long, global = true, env = "DEVAUTH_DB")]
    db: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve(ServerConfig),
    /// List registered devices as JSON
    List,
    /// Authorize a device
    Authorize { device_id: String },
    /// Revoke a device
    Revoke { device_id: String },
    /// Set or clear a device remark
    Remark {
        device_id: String,
        /// Remark text; omit to clear
        text: Option<String>,
    },
    /// Remove a device from the registry
    Delete { device_id: String },
}

#[derive(clap::Args, Debug)]
struct ServerConfig {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "DEVAUTH_BIND")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value = "8000", env = "DEVAUTH_PORT")]
    port: u16,

    /// Shared wire secret
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    secret: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    match args.command {
        None => {
            let serve = ServerConfig::parse_from_env()?;
            run_server(serve, open_registry(args.db.as_deref())?).await
        }
        Some(Command::Serve(serve)) => run_server(serve, open_registry(args.db.as_deref())?).await,
        Some(Command::List) => {
            let devices = admin_registry(args.db.as_deref())?
                .list()
                .context("Failed to list devices")?;
            println!("{}", serde_json::to_string_pretty(&devices)?);
            Ok(())
        }
        Some(Command::Authorize { device_id }) => {
            let record = admin_registry(args.db.as_deref())?
                .set_authorized(&device_id, true)
                .context("Failed to authorize device")?;
            print_record(&record)
        }
        Some(Command::Revoke { device_id }) => {
            let record = admin_registry(args.db.as_deref())?
                .set_authorized(&device_id, false)
                .context("Failed to revoke device")?;
            print_record(&record)
        }
        Some(Command::Remark { device_id, text }) => {
            let record = admin_registry(args.db.as_deref())?
                .set_remark(&device_id, text)
                .context("Failed to update remark")?;
            print_record(&record)
        }
        Some(Command::Delete { device_id }) => {
            admin_registry(args.db.as_deref())?
                .delete(&device_id)
                .context("Failed to delete device")?;
            info!("Deleted device {}", device_id);
            Ok(())
        }
    }
}

impl ServerConfig {
    /// Serve settings when no subcommand was given.
    fn parse_from_env() -> Result<Self> {
        #[derive(Parser)]
        struct Defaults {
            #[command(flatten)]
            serve: ServerConfig,
        }
        Defaults::try_parse_from(["devauth-server"])
            .map(|d| d.serve)
            .context("CLIENT_SECRET must be set to serve")
    }
}

fn open_registry(db: Option<&Path>) -> Result<Arc<dyn DeviceRegistry>> {
    match db {
        Some(path) => {
            info!("Opening device registry at {:?}", path);
            let registry = SqliteRegistry::open(path).context("Failed to open device registry")?;
            Ok(Arc::new(registry))
        }
        None => {
            warn!("No --db given, devices are kept in memory only");
            Ok(Arc::new(MemoryRegistry::new()))
        }
    }
}

/// Registry for the admin subcommands, which only make sense on a database
/// a server also uses.
fn admin_registry(db: Option<&Path>) -> Result<SqliteRegistry> {
    let path = db.context("--db (or DEVAUTH_DB) is required for admin commands")?;
    SqliteRegistry::open(path).context("Failed to open device registry")
}

async fn run_server(args: ServerConfig, registry: Arc<dyn DeviceRegistry>) -> Result<()> {
    let cipher = WireCipher::new(&args.secret).context("Invalid shared secret")?;
    let state = AppState::new(cipher, registry);

    let listener = tokio::net::TcpListener::bind((args.bind, args.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", args.bind, args.port))?;

    println!("\n========================================");
    println!("  Devauth Server Running");
    println!("========================================");
    println!("  Bind:      {}", args.bind);
    println!("  Port:      {}", args.port);
    println!("  Heartbeat: {}", devauth_types::HEARTBEAT_PATH);
    println!("========================================\n");

    devauth_server::serve(listener, state)
        .await
        .context("HTTP server failed")
}

fn print_record(record: &DeviceRecord) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}
