//! Server configuration
//!
//! Resolved settings handed to [`crate::Server`]. Values come from defaults,
//! an optional JSON file and command-line flags, in increasing precedence;
//! the merging itself lives in the binary.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ServerError;

pub const DEFAULT_PORT: u16 = 2323;
pub const DEFAULT_ROOM_NAME: &str = "Chat Room";
pub const DEFAULT_MAX_USERS: usize = 10;
pub const DEFAULT_MESH_HOSTNAME: &str = "chatroom";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local interface to bind when mesh networking is off
    pub host: IpAddr,
    /// TCP port to listen on
    pub port: u16,
    /// Chat room name
    pub room_name: String,
    /// Room capacity
    pub max_users: usize,
    /// Listen on the mesh overlay address instead of all local interfaces
    pub enable_mesh: bool,
    /// Mesh hostname, only used if `enable_mesh` is set
    pub mesh_hostname: String,
    /// Emit ANSI styling
    pub color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            room_name: DEFAULT_ROOM_NAME.to_string(),
            max_users: DEFAULT_MAX_USERS,
            enable_mesh: false,
            mesh_hostname: DEFAULT_MESH_HOSTNAME.to_string(),
            color: true,
        }
    }
}

impl Config {
    /// Load a JSON config file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let to_err = |source: Box<dyn std::error::Error + Send + Sync>| ServerError::ConfigFile {
            path: path.to_path_buf(),
            source,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| to_err(Box::new(e)))?;
        serde_json::from_str(&raw).map_err(|e| to_err(Box::new(e)))
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_users == 0 {
            return Err(ServerError::InvalidConfig(
                "max_users must be at least 1".to_string(),
            ));
        }
        if self.room_name.trim().is_empty() {
            return Err(ServerError::InvalidConfig(
                "room_name must not be empty".to_string(),
            ));
        }
        if self.enable_mesh && self.mesh_hostname.trim().is_empty() {
            return Err(ServerError::InvalidConfig(
                "mesh_hostname is required when mesh networking is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// How users reach the server, for the startup log
    pub fn connect_hint(&self) -> String {
        if self.enable_mesh {
            format!("telnet {}.ts.net {}", self.mesh_hostname, self.port)
        } else {
            format!("telnet localhost {}", self.port)
        }
    }
}
