//! Message and command definitions
//!
//! The line protocol is plain text: every non-blank line a joined client
//! sends is either a slash command or a chat message. `Message` is the
//! transient value the room fans out; `Command` is the parsed form of a
//! slash line.

use chrono::{DateTime, Local};

use crate::types::SYSTEM_NICKNAME;

/// Maximum chat body length, counted in characters
pub const MAX_MESSAGE_LENGTH: usize = 1000;

/// Semantic kind of a message, used to pick its rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Ordinary chat line from a member
    Chat,
    /// Server-generated notice (joins, leaves, errors)
    System,
    /// `/me` action
    Action,
}

/// A single broadcastable message
///
/// Immutable once constructed; not retained after delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub content: String,
    pub timestamp: DateTime<Local>,
    pub kind: MessageKind,
}

impl Message {
    /// Ordinary chat line stamped with the current time
    pub fn chat(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_kind(from.into(), content.into(), MessageKind::Chat)
    }

    /// `/me` action line
    pub fn action(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_kind(from.into(), content.into(), MessageKind::Action)
    }

    /// Server notice authored by the reserved system name
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_kind(SYSTEM_NICKNAME.to_string(), content.into(), MessageKind::System)
    }

    fn with_kind(from: String, content: String, kind: MessageKind) -> Self {
        Self {
            from,
            content,
            timestamp: Local::now(),
            kind,
        }
    }

    pub fn is_system(&self) -> bool {
        self.kind == MessageKind::System
    }
}

/// Check a chat body against [`MAX_MESSAGE_LENGTH`]
pub fn within_length_limit(body: &str) -> bool {
    body.chars().count() <= MAX_MESSAGE_LENGTH
}

/// Parsed slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/who`: list members to the sender only
    Who,
    /// `/me <action>`: broadcast an action; `None` when the text is blank
    Me(Option<String>),
    /// `/help`: static command summary to the sender only
    Help,
    /// `/quit`: farewell, then close the connection
    Quit,
    /// Anything else starting with `/`; carries the lowercased name
    Unknown(String),
}

impl Command {
    /// Parse a trimmed line. Returns `None` if it is not a command.
    ///
    /// The name is everything up to the first space and is matched
    /// case-insensitively; the remainder is the argument.
    pub fn parse(line: &str) -> Option<Self> {
        if !line.starts_with('/') {
            return None;
        }

        let (name, rest) = match line.split_once(' ') {
            Some((name, rest)) => (name, Some(rest)),
            None => (line, None),
        };
        let name = name.to_lowercase();

        let command = match name.as_str() {
            "/who" => Command::Who,
            "/me" => Command::Me(
                rest.map(str::trim)
                    .filter(|text| !text.is_empty())
                    .map(str::to_string),
            ),
            "/help" => Command::Help,
            "/quit" => Command::Quit,
            _ => Command::Unknown(name),
        };
        Some(command)
    }

    /// Commands exempt from rate limiting
    pub fn bypasses_rate_limit(&self) -> bool {
        matches!(self, Command::Quit)
    }
}
