//! Error types for the chat server
//!
//! Defines per-connection errors, process-level server errors and
//! nickname negotiation rejections. Uses thiserror for ergonomic error
//! definitions.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::message::MAX_MESSAGE_LENGTH;
use crate::rate_limit::{MESSAGE_RATE_LIMIT, RATE_LIMIT_WINDOW};

/// Per-connection errors
///
/// Covers both fatal errors (connection teardown) and recoverable
/// errors (reported to the client as a system message, loop continues).
#[derive(Debug, Error)]
pub enum AppError {
    /// Reading or writing during nickname negotiation failed (fatal)
    #[error("nickname negotiation failed: {0}")]
    NicknameNegotiation(#[source] io::Error),

    /// The room is at capacity (fatal, caller closes the connection)
    #[error("room is full")]
    RoomFull,

    /// Sending the welcome banner failed (fatal, session leaves again)
    #[error("welcome message failed: {0}")]
    WelcomeWrite(#[source] io::Error),

    /// Chat line exceeds the maximum body length (recoverable)
    #[error("message too long (max {} characters)", MAX_MESSAGE_LENGTH)]
    MessageTooLong,

    /// Too many lines inside the sliding window (recoverable)
    #[error(
        "rate limit exceeded (max {} messages per {}s). Try again in {:.1} seconds",
        MESSAGE_RATE_LIMIT,
        RATE_LIMIT_WINDOW.as_secs(),
        .wait.as_secs_f64()
    )]
    RateLimited { wait: Duration },

    /// Command name not recognized (recoverable)
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Command recognized but its arguments are wrong; carries the usage line (recoverable)
    #[error("Usage: {0}")]
    InvalidCommandUsage(&'static str),

    /// Writing to this connection failed (delivery side, never propagated to the room)
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// Reading from this connection failed (fatal, ends the read loop)
    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),

    /// The room control loop is gone (server shutting down)
    #[error("room is closed")]
    RoomClosed,

    /// Peer closed the stream or the server is shutting down
    #[error("connection closed")]
    ConnectionClosed,
}

impl AppError {
    /// Whether the session can keep reading after reporting this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::MessageTooLong
                | AppError::RateLimited { .. }
                | AppError::UnknownCommand(_)
                | AppError::InvalidCommandUsage(_)
        )
    }

    /// Text shown to the offending client as a system message
    pub fn client_notice(&self) -> String {
        match self {
            AppError::UnknownCommand(_) | AppError::InvalidCommandUsage(_) => self.to_string(),
            _ => format!("Error: {}", self),
        }
    }
}

/// Reasons a nickname candidate is rejected during negotiation
///
/// The `Display` text is what the client sees before being re-prompted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NicknameError {
    #[error("Nickname cannot be empty. Please try again.")]
    Empty,

    #[error("Nickname 'System' is reserved. Please choose another nickname.")]
    Reserved,

    #[error("Nickname '{0}' is already taken. Please choose another nickname.")]
    Taken(String),

    #[error("Nickname is too long. Please choose a shorter nickname.")]
    TooLong,
}

/// Process-level errors surfaced by `Server::start` and configuration loading
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the configured listener (fatal to the process)
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The mesh hostname did not resolve to a bindable address
    #[error("failed to resolve mesh hostname '{hostname}': {reason}")]
    MeshResolve { hostname: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("server already started")]
    AlreadyStarted,

    #[error("server not started")]
    NotStarted,
}

/// Message send errors
///
/// Occurs when a member's outbound queue cannot take another message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The receiving end of the queue has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The queue is at capacity (slow reader)
    #[error("Channel full")]
    ChannelFull,
}
