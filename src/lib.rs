//! Terminal Chat Server Library
//!
//! A multi-user, line-oriented chat room reachable with a plain telnet
//! client, either on a local socket or on a mesh overlay address.
//!
//! # Features
//! - Nickname negotiation (unique, non-empty, "System" reserved)
//! - Room capacity limit
//! - `/who`, `/me`, `/help` and `/quit` commands
//! - Per-connection rate limiting and message length limit
//! - Graceful shutdown that closes every connection
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Room` runs the control loop that owns all membership state
//! - Each connection has a `Session` task talking to the room via `RoomHandle`
//! - Each session has its own ordered outbound queue and writer task
//! - No locks needed - all room state access goes through message passing
//!
//! # Example
//! ```ignore
//! use termchat::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(Config::default())?;
//!     server.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod formatter;
pub mod handler;
pub mod listener;
pub mod message;
pub mod rate_limit;
pub mod room;
pub mod server;
pub mod session;
pub mod style;
pub mod types;

// Re-export main types for convenience
pub use client::{ClientHandle, Outbound};
pub use config::Config;
pub use error::{AppError, NicknameError, SendError, ServerError};
pub use formatter::Formatter;
pub use handler::handle_connection;
pub use listener::{Listener, Transport};
pub use message::{Command, Message, MessageKind, MAX_MESSAGE_LENGTH};
pub use rate_limit::RateLimiter;
pub use room::{JoinOutcome, Room, RoomCommand, RoomHandle};
pub use server::Server;
pub use session::Session;
pub use types::{ClientId, Nickname, SYSTEM_NICKNAME};
