//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: UUID-based unique connection identifier
//! - `Nickname`: a validated, non-reserved display name

use uuid::Uuid;

use crate::error::NicknameError;

/// Author name used for messages generated by the server itself.
pub const SYSTEM_NICKNAME: &str = "System";

/// Unique client identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe connection identification.
/// Two sessions that negotiate the same nickname at different times
/// are still told apart by their `ClientId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A nickname that passed local validation
///
/// Guaranteed non-empty, free of surrounding whitespace and not equal
/// (ignoring case) to [`SYSTEM_NICKNAME`]. Uniqueness is decided by the
/// room at admission time, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nickname(String);

impl Nickname {
    /// Validate raw user input as a nickname
    pub fn parse(input: &str) -> Result<Self, NicknameError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(NicknameError::Empty);
        }
        if trimmed.eq_ignore_ascii_case(SYSTEM_NICKNAME) {
            return Err(NicknameError::Reserved);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Nickname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
