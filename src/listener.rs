//! Listening socket selection
//!
//! The server accepts plain TCP either on a local interface or on the
//! address the mesh overlay assigned to this node. The overlay daemon owns
//! node provisioning and authentication; here it only decides which
//! address gets bound.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ServerError;

/// Where connections come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Ordinary socket on a local interface
    Local,
    /// Socket on the mesh overlay address of `hostname`
    Mesh { hostname: String },
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Local => write!(f, "local"),
            Transport::Mesh { hostname } => write!(f, "mesh ({})", hostname),
        }
    }
}

/// A bound listener that yields accepted byte streams
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    transport: Transport,
}

impl Listener {
    /// Bind according to `config`
    pub async fn bind(config: &Config) -> Result<Self, ServerError> {
        let (addr, transport) = if config.enable_mesh {
            let addr = resolve_mesh_addr(&config.mesh_hostname, config.port).await?;
            let transport = Transport::Mesh {
                hostname: config.mesh_hostname.clone(),
            };
            (addr, transport)
        } else {
            (SocketAddr::new(config.host, config.port), Transport::Local)
        };

        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        debug!("Bound {} for {} transport", addr, transport);
        Ok(Self { inner, transport })
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.inner.accept().await
    }
}

/// Resolve the overlay address for `hostname`, preferring IPv4
async fn resolve_mesh_addr(hostname: &str, port: u16) -> Result<SocketAddr, ServerError> {
    let resolve_err = |reason: String| ServerError::MeshResolve {
        hostname: hostname.to_string(),
        reason,
    };

    let addrs: Vec<SocketAddr> = lookup_host((hostname, port))
        .await
        .map_err(|e| resolve_err(e.to_string()))?
        .collect();

    let chosen = addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| resolve_err("no addresses returned".to_string()))?;

    if addrs.len() > 1 {
        warn!(
            "Mesh hostname '{}' resolved to {} addresses, using {}",
            hostname,
            addrs.len(),
            chosen
        );
    }
    Ok(chosen)
}
