//! Message formatting for terminal display
//!
//! Pure functions from a message's semantic kind to the text written on
//! the wire. Multi-line output is joined with CRLF; the caller appends the
//! final line terminator.

use crate::message::{Message, MessageKind};
use crate::style::{self, Style};

/// Clock format used for chat lines
const TIME_FORMAT: &str = "%H:%M:%S";

const BANNER: &str = r"
 _____                   ____ _           _
|_   _|__ _ __ _ __ ___ / ___| |__   __ _| |_
  | |/ _ \ '__| '_ ` _ \ |   | '_ \ / _` | __|
  | |  __/ |  | | | | | | |___| | | | (_| | |_
  |_|\___|_|  |_| |_| |_|\____|_| |_|\__,_|\__|

                     CHAT ROOM
";

/// Turns messages into display strings, optionally with ANSI styling
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    colored: bool,
}

impl Formatter {
    /// A colored formatter also turns on escape output process-wide, since
    /// our own stdout says nothing about the remote terminal.
    pub fn new(colored: bool) -> Self {
        if colored {
            style::enable();
        }
        Self { colored }
    }

    /// Formatter that never emits escape sequences
    pub fn plain() -> Self {
        Self::new(false)
    }

    fn paint(&self, style: Style, text: &str) -> String {
        if self.colored {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Render `msg` as seen by the member called `viewer`
    pub fn format_message(&self, msg: &Message, viewer: &str) -> String {
        match msg.kind {
            MessageKind::System => self.system(&msg.content),
            MessageKind::Action => self.action(&msg.from, &msg.content),
            MessageKind::Chat => {
                let time = msg.timestamp.format(TIME_FORMAT).to_string();
                if msg.from == viewer {
                    self.own(&msg.content, &time)
                } else {
                    self.user(&msg.from, &msg.content, &time)
                }
            }
        }
    }

    pub fn system(&self, text: &str) -> String {
        self.paint(style::system, &format!("[System] {}", text))
    }

    pub fn user(&self, nickname: &str, text: &str, time: &str) -> String {
        self.paint(style::user, &format!("[{}] {}: ", time, nickname)) + text
    }

    /// The sender's own chat line
    pub fn own(&self, text: &str, time: &str) -> String {
        self.paint(style::own, &format!("[{}] You: ", time)) + text
    }

    pub fn action(&self, nickname: &str, text: &str) -> String {
        self.paint(style::action, &format!("* {} {}", nickname, text))
    }

    pub fn title(&self, title: &str) -> String {
        self.paint(style::header, &format!("=== {} ===", title))
    }

    pub fn nickname_prompt(&self) -> String {
        self.paint(style::header, "Please enter your nickname: ")
    }

    pub fn banner(&self) -> String {
        let banner = BANNER.lines().collect::<Vec<_>>().join("\r\n");
        self.paint(style::system, &banner)
    }

    pub fn welcome(&self, room_name: &str, nickname: &str) -> String {
        self.paint(
            style::header,
            &format!("Welcome to {}, {}!", room_name, nickname),
        )
    }

    pub fn hint(&self) -> String {
        "Type a message and press Enter to send. Type /help for commands.".to_string()
    }

    pub fn help(&self) -> String {
        [
            self.paint(style::header, "Available Commands:"),
            "/who - Show all users in the room".to_string(),
            "/me <action> - Perform an action".to_string(),
            "/help - Show this help message".to_string(),
            "/quit - Leave the chat".to_string(),
        ]
        .join("\r\n")
    }

    /// Member list with occupancy, e.g. `Users in Lobby (2/10):`
    pub fn user_list(&self, room_name: &str, users: &[String], max_users: usize) -> String {
        let count = self.paint(style::count, &format!("{}/{}", users.len(), max_users));
        let mut lines = vec![self.paint(
            style::header,
            &format!("Users in {} ({}):", room_name, count),
        )];
        lines.extend(
            users
                .iter()
                .map(|user| format!("- {}", self.paint(style::user, user))),
        );
        lines.join("\r\n")
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(true)
    }
}
