//! Terminal Chat Server - Entry Point
//!
//! Parses flags, starts the server and waits for Ctrl+C or SIGTERM.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use termchat::{Config, Server};

/// Environment variable carrying the mesh node auth key
const MESH_AUTH_KEY_ENV: &str = "TS_AUTHKEY";

#[derive(Parser, Debug)]
#[command(name = "termchat")]
#[command(about = "Multi-user terminal chat server reachable over telnet", long_about = None)]
struct Args {
    /// Local address to bind (ignored in mesh mode)
    #[arg(long)]
    host: Option<IpAddr>,

    /// TCP port to listen on
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Chat room name
    #[arg(short = 'r', long)]
    room_name: Option<String>,

    /// Maximum allowed users
    #[arg(short = 'm', long)]
    max_users: Option<usize>,

    /// Listen on the mesh overlay address
    #[arg(short = 't', long = "mesh")]
    mesh: bool,

    /// Mesh hostname (only used with --mesh)
    #[arg(short = 'H', long)]
    hostname: Option<String>,

    /// JSON config file; flags override its values
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Disable ANSI colors
    #[arg(long)]
    no_color: bool,
}

impl Args {
    /// Defaults, then the config file, then explicit flags
    fn into_config(self) -> Result<Config, termchat::ServerError> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(room_name) = self.room_name {
            config.room_name = room_name;
        }
        if let Some(max_users) = self.max_users {
            config.max_users = max_users;
        }
        if self.mesh {
            config.enable_mesh = true;
        }
        if let Some(hostname) = self.hostname {
            config.mesh_hostname = hostname;
        }
        if self.no_color {
            config.color = false;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=termchat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("termchat=info")),
        )
        .init();

    let mut server = Server::new(Args::parse().into_config()?)?;

    let config = server.config();
    if config.enable_mesh {
        info!(
            "Starting Terminal Chat on mesh hostname {}, port {}",
            config.mesh_hostname, config.port
        );
        if std::env::var_os(MESH_AUTH_KEY_ENV).is_none() {
            warn!(
                "{} environment variable not set. Mesh mode may not work properly.",
                MESH_AUTH_KEY_ENV
            );
        }
    } else {
        info!("Starting Terminal Chat on port {}", config.port);
    }

    server.start().await?;
    info!("Press Ctrl+C to stop the server");

    shutdown_signal().await;

    if let Err(e) = server.stop().await {
        error!("Error shutting down server: {}", e);
    }
    Ok(())
}

/// Wait for Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
