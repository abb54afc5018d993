//! Terminal palette for chat output
//!
//! Every rendering in [`crate::formatter`] maps to one of these styles.
//! Output goes to remote telnet clients, never to our own stdout, so the
//! `colored` crate's terminal detection is overridden when the server
//! enables color (see [`enable`]).

use colored::{ColoredString, Colorize};

/// 24-bit foreground colors
const HIGHLIGHT: (u8, u8, u8) = (0x7D, 0x56, 0xF4);
const SPECIAL: (u8, u8, u8) = (0x43, 0xBF, 0x6D);
const ACCENT: (u8, u8, u8) = (0x1D, 0x9B, 0xF0);
const WARNING: (u8, u8, u8) = (0xF2, 0x5D, 0x94);

/// A styling function applied to a whole string
pub type Style = fn(&str) -> ColoredString;

/// Force escape sequences on regardless of where our stdout points
pub fn enable() {
    colored::control::set_override(true);
}

fn fg(text: &str, (r, g, b): (u8, u8, u8)) -> ColoredString {
    text.truecolor(r, g, b)
}

/// Titles, prompts and headers
pub fn header(text: &str) -> ColoredString {
    fg(text, HIGHLIGHT).bold()
}

/// System notices and the banner
pub fn system(text: &str) -> ColoredString {
    fg(text, SPECIAL).bold()
}

/// Other members' names
pub fn user(text: &str) -> ColoredString {
    fg(text, ACCENT).bold()
}

/// The viewer's own lines
pub fn own(text: &str) -> ColoredString {
    fg(text, HIGHLIGHT).bold()
}

pub fn action(text: &str) -> ColoredString {
    fg(text, WARNING).italic()
}

/// Occupancy counter in the member list
pub fn count(text: &str) -> ColoredString {
    fg(text, ACCENT)
}
