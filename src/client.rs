//! Client handle definition
//!
//! The room's non-owning view of a joined session: its identity plus the
//! sending side of the session's outbound queue.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::message::Message;
use crate::types::{ClientId, Nickname};

/// Capacity of each session's outbound queue
pub const OUTBOUND_QUEUE_SIZE: usize = 128;

/// Items drained in order by a session's writer task
#[derive(Debug)]
pub enum Outbound {
    /// Format according to kind and write
    Message(Message),
    /// Already formatted text, written verbatim
    Text(String),
    /// Flush what was queued before, then shut the connection down
    Close,
}

/// Handle to a joined client
///
/// Cheap to clone. Delivery never waits: a full or closed queue drops
/// the message for this client only.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Unique identifier of the connection
    pub id: ClientId,
    /// Nickname fixed at admission
    pub nickname: Nickname,
    /// Room → session outbound queue
    sender: mpsc::Sender<Outbound>,
}

impl ClientHandle {
    /// Create a handle with the given identity and outbound queue
    pub fn new(id: ClientId, nickname: Nickname, sender: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            nickname,
            sender,
        }
    }

    /// Queue a message for this client without blocking
    pub fn deliver(&self, msg: Message) -> Result<(), SendError> {
        self.sender
            .try_send(Outbound::Message(msg))
            .map_err(|e| match e {
                TrySendError::Full(_) => SendError::ChannelFull,
                TrySendError::Closed(_) => SendError::ChannelClosed,
            })
    }
}
