//! Room actor implementation
//!
//! The single chat room and its control loop. The loop is the only owner
//! of the membership map; sessions talk to it through a cloneable
//! [`RoomHandle`] that turns each call into a [`RoomCommand`]. Because the
//! loop handles one command at a time, "room full", nickname uniqueness and
//! fan-out all see one consistent membership snapshot and every member
//! observes room events in the same order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::ClientHandle;
use crate::error::{AppError, SendError};
use crate::message::Message;
use crate::types::{ClientId, Nickname};

/// Channel buffer size for room commands
const COMMAND_BUFFER_SIZE: usize = 256;

/// Result of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Client is now a member and the join notice was broadcast
    Admitted,
    /// Membership is at capacity; the caller must close the connection
    RoomFull,
    /// Another member holds this nickname; the caller should pick another
    NicknameTaken,
}

/// Commands sent from sessions to the room control loop
#[derive(Debug)]
pub enum RoomCommand {
    /// Request membership
    Join {
        client: ClientHandle,
        reply: oneshot::Sender<JoinOutcome>,
    },
    /// Give up membership (no-op if not a member)
    Leave { id: ClientId, nickname: Nickname },
    /// Fan a message out to every member
    Broadcast { message: Message },
    /// Snapshot of member nicknames
    ListMembers { reply: oneshot::Sender<Vec<String>> },
    /// Point-in-time nickname check
    IsNicknameAvailable {
        nickname: String,
        reply: oneshot::Sender<bool>,
    },
}

/// Owner of a running room
///
/// Holds the control loop's task; dropping it without calling [`Room::stop`]
/// also ends the loop, but nothing waits for it.
pub struct Room {
    handle: RoomHandle,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Room {
    /// Create a room and spawn its control loop
    pub fn start(name: impl Into<String>, capacity: usize) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let actor = RoomActor {
            name: name.clone(),
            capacity,
            members: HashMap::new(),
            receiver,
        };
        let task = tokio::spawn(actor.run(shutdown_rx));

        Self {
            handle: RoomHandle {
                name,
                capacity,
                sender,
            },
            shutdown: shutdown_tx,
            task,
        }
    }

    /// A new handle for submitting requests
    pub fn handle(&self) -> RoomHandle {
        self.handle.clone()
    }

    /// Signal the control loop to drain queued requests and exit, and
    /// wait until it has.
    ///
    /// Requests submitted after this returns fail with
    /// [`AppError::RoomClosed`].
    pub async fn stop(self) {
        info!("Stopping room '{}'", self.handle.name);
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!("Room '{}' control loop failed: {}", self.handle.name, e);
            return;
        }
        info!("Room '{}' stopped", self.handle.name);
    }
}

/// Cloneable request side of a room
#[derive(Debug, Clone)]
pub struct RoomHandle {
    name: Arc<str>,
    capacity: usize,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn submit(&self, cmd: RoomCommand) -> Result<(), AppError> {
        self.sender.send(cmd).await.map_err(|_| AppError::RoomClosed)
    }

    /// Request membership for `client`
    pub async fn join(&self, client: ClientHandle) -> Result<JoinOutcome, AppError> {
        let (reply, rx) = oneshot::channel();
        self.submit(RoomCommand::Join { client, reply }).await?;
        rx.await.map_err(|_| AppError::RoomClosed)
    }

    /// Remove the member registered as (`id`, `nickname`), if any
    pub async fn leave(&self, id: ClientId, nickname: Nickname) {
        if self
            .submit(RoomCommand::Leave { id, nickname })
            .await
            .is_err()
        {
            debug!("Leave for {} ignored, room already stopped", id);
        }
    }

    /// Queue `message` for delivery to every member
    pub async fn broadcast(&self, message: Message) -> Result<(), AppError> {
        self.submit(RoomCommand::Broadcast { message }).await
    }

    /// Nicknames of current members, sorted
    pub async fn list_members(&self) -> Result<Vec<String>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.submit(RoomCommand::ListMembers { reply }).await?;
        rx.await.map_err(|_| AppError::RoomClosed)
    }

    pub async fn is_nickname_available(&self, nickname: &str) -> Result<bool, AppError> {
        let (reply, rx) = oneshot::channel();
        self.submit(RoomCommand::IsNicknameAvailable {
            nickname: nickname.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| AppError::RoomClosed)
    }
}

/// The control loop state
///
/// Keys of `members` are nicknames (case-sensitive).
struct RoomActor {
    name: Arc<str>,
    capacity: usize,
    members: HashMap<String, ClientHandle>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Run until shutdown is signaled, then process whatever is already
    /// queued and exit.
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        info!("Room '{}' started (capacity {})", self.name, self.capacity);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }

        self.receiver.close();
        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Room '{}' is shutting down", self.name);
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { client, reply } => self.handle_join(client, reply),
            RoomCommand::Leave { id, nickname } => self.handle_leave(id, &nickname),
            RoomCommand::Broadcast { message } => self.broadcast(&message),
            RoomCommand::ListMembers { reply } => {
                let _ = reply.send(self.member_names());
            }
            RoomCommand::IsNicknameAvailable { nickname, reply } => {
                let _ = reply.send(!self.members.contains_key(&nickname));
            }
        }
    }

    fn handle_join(&mut self, client: ClientHandle, reply: oneshot::Sender<JoinOutcome>) {
        let nickname = client.nickname.to_string();

        if self.members.len() >= self.capacity {
            info!("Client {} rejected, room '{}' is full", client.id, self.name);
            let _ = reply.send(JoinOutcome::RoomFull);
            return;
        }
        if self.members.contains_key(&nickname) {
            debug!("Client {} rejected, nickname '{}' taken", client.id, nickname);
            let _ = reply.send(JoinOutcome::NicknameTaken);
            return;
        }

        let id = client.id;
        self.members.insert(nickname.clone(), client);

        // The joiner may have given up while waiting; undo quietly.
        if reply.send(JoinOutcome::Admitted).is_err() {
            debug!("Client {} vanished before admission completed", id);
            self.members.remove(&nickname);
            return;
        }

        info!("Client {} joined room '{}' as '{}'", id, self.name, nickname);
        debug!("Members: {}/{}", self.members.len(), self.capacity);
        self.broadcast(&Message::system(format!("{} has joined the room", nickname)));
    }

    fn handle_leave(&mut self, id: ClientId, nickname: &Nickname) {
        let is_member = self
            .members
            .get(nickname.as_str())
            .is_some_and(|member| member.id == id);
        if !is_member {
            return;
        }

        self.members.remove(nickname.as_str());
        info!("Client {} ('{}') left room '{}'", id, nickname, self.name);
        self.broadcast(&Message::system(format!("{} has left the room", nickname)));
    }

    /// Queue `message` on every member's outbound queue
    fn broadcast(&self, message: &Message) {
        debug!(
            "Broadcasting message from {} to {} clients",
            message.from,
            self.members.len()
        );
        for (nickname, member) in &self.members {
            match member.deliver(message.clone()) {
                Ok(()) => {}
                Err(SendError::ChannelFull) => {
                    warn!("Dropped message for '{}': outbound queue full", nickname)
                }
                Err(SendError::ChannelClosed) => {
                    debug!("Dropped message for '{}': connection closing", nickname)
                }
            }
        }
    }

    fn member_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.members.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Outbound;

    fn client(nickname: &str) -> (ClientHandle, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(64);
        let nick = Nickname::parse(nickname).unwrap();
        (ClientHandle::new(ClientId::new(), nick, tx), rx)
    }

    /// Drain everything currently queued for a client as text contents
    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Message(msg) = item {
                out.push(msg.content);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_join_broadcasts_to_everyone_including_joiner() {
        let room = Room::start("Lobby", 10);
        let handle = room.handle();
        let (alice, mut alice_rx) = client("Alice");
        let (bob, mut bob_rx) = client("Bob");

        assert_eq!(handle.join(alice).await.unwrap(), JoinOutcome::Admitted);
        assert_eq!(handle.join(bob).await.unwrap(), JoinOutcome::Admitted);
        // Serialization point: everything before has been processed
        handle.list_members().await.unwrap();

        assert_eq!(
            drain(&mut alice_rx),
            vec!["Alice has joined the room", "Bob has joined the room"]
        );
        assert_eq!(drain(&mut bob_rx), vec!["Bob has joined the room"]);

        room.stop().await;
    }

    #[tokio::test]
    async fn test_join_rejected_when_full() {
        let room = Room::start("Tiny", 1);
        let handle = room.handle();
        let (alice, _alice_rx) = client("Alice");
        let (bob, mut bob_rx) = client("Bob");

        assert_eq!(handle.join(alice).await.unwrap(), JoinOutcome::Admitted);
        assert_eq!(handle.join(bob).await.unwrap(), JoinOutcome::RoomFull);
        assert_eq!(handle.list_members().await.unwrap(), vec!["Alice"]);
        assert!(drain(&mut bob_rx).is_empty());

        room.stop().await;
    }

    #[tokio::test]
    async fn test_join_rejected_when_nickname_taken() {
        let room = Room::start("Lobby", 10);
        let handle = room.handle();
        let (first, _rx1) = client("Alice");
        let (second, _rx2) = client("Alice");

        assert_eq!(handle.join(first).await.unwrap(), JoinOutcome::Admitted);
        assert_eq!(handle.join(second).await.unwrap(), JoinOutcome::NicknameTaken);
        assert!(!handle.is_nickname_available("Alice").await.unwrap());
        assert!(handle.is_nickname_available("alice").await.unwrap());

        room.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_joins_never_exceed_capacity() {
        let capacity = 5;
        let room = Room::start("Lobby", capacity);
        let mut tasks = Vec::new();
        let mut receivers = Vec::new();

        for i in 0..capacity + 4 {
            let (c, rx) = client(&format!("user{}", i));
            receivers.push(rx);
            let handle = room.handle();
            tasks.push(tokio::spawn(async move { handle.join(c).await.unwrap() }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() == JoinOutcome::Admitted {
                admitted += 1;
            }
        }

        assert_eq!(admitted, capacity);
        assert_eq!(room.handle().list_members().await.unwrap().len(), capacity);
        room.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_joins_with_same_nickname() {
        let room = Room::start("Lobby", 10);
        let mut tasks = Vec::new();
        let mut receivers = Vec::new();

        for _ in 0..8 {
            let (c, rx) = client("Alice");
            receivers.push(rx);
            let handle = room.handle();
            tasks.push(tokio::spawn(async move { handle.join(c).await.unwrap() }));
        }

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }

        let admitted = outcomes
            .iter()
            .filter(|o| **o == JoinOutcome::Admitted)
            .count();
        assert_eq!(admitted, 1);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, JoinOutcome::Admitted | JoinOutcome::NicknameTaken)));

        room.stop().await;
    }

    #[tokio::test]
    async fn test_double_leave_is_noop() {
        let room = Room::start("Lobby", 10);
        let handle = room.handle();
        let (alice, _alice_rx) = client("Alice");
        let (bob, mut bob_rx) = client("Bob");
        let alice_id = alice.id;
        let alice_nick = alice.nickname.clone();

        handle.join(alice).await.unwrap();
        handle.join(bob).await.unwrap();
        handle.leave(alice_id, alice_nick.clone()).await;
        handle.leave(alice_id, alice_nick).await;
        handle.list_members().await.unwrap();

        let seen = drain(&mut bob_rx);
        let left = seen
            .iter()
            .filter(|m| m.as_str() == "Alice has left the room")
            .count();
        assert_eq!(left, 1);
        assert_eq!(handle.list_members().await.unwrap(), vec!["Bob"]);

        room.stop().await;
    }

    #[tokio::test]
    async fn test_stale_leave_does_not_evict_new_holder() {
        let room = Room::start("Lobby", 10);
        let handle = room.handle();
        let (old, _old_rx) = client("Alice");
        let old_id = old.id;
        let nick = old.nickname.clone();

        handle.join(old).await.unwrap();
        handle.leave(old_id, nick.clone()).await;

        let (new, _new_rx) = client("Alice");
        handle.join(new).await.unwrap();
        handle.leave(old_id, nick).await;

        assert_eq!(handle.list_members().await.unwrap(), vec!["Alice"]);
        room.stop().await;
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_members_in_order() {
        let room = Room::start("Lobby", 10);
        let handle = room.handle();
        let (alice, mut alice_rx) = client("Alice");
        let (bob, mut bob_rx) = client("Bob");
        handle.join(alice).await.unwrap();
        handle.join(bob).await.unwrap();
        drain_after_sync(&handle, &mut [&mut alice_rx, &mut bob_rx]).await;

        handle.broadcast(Message::chat("Alice", "first")).await.unwrap();
        handle.broadcast(Message::chat("Bob", "second")).await.unwrap();
        handle.list_members().await.unwrap();

        assert_eq!(drain(&mut alice_rx), vec!["first", "second"]);
        assert_eq!(drain(&mut bob_rx), vec!["first", "second"]);

        room.stop().await;
    }

    #[tokio::test]
    async fn test_dead_member_does_not_block_broadcast() {
        let room = Room::start("Lobby", 10);
        let handle = room.handle();
        let (alice, alice_rx) = client("Alice");
        let (bob, mut bob_rx) = client("Bob");
        handle.join(alice).await.unwrap();
        handle.join(bob).await.unwrap();
        drop(alice_rx);

        handle.broadcast(Message::chat("Bob", "still here")).await.unwrap();
        handle.list_members().await.unwrap();

        assert!(drain(&mut bob_rx).contains(&"still here".to_string()));
        room.stop().await;
    }

    #[tokio::test]
    async fn test_requests_after_stop_fail() {
        let room = Room::start("Lobby", 10);
        let handle = room.handle();
        room.stop().await;

        assert!(matches!(
            handle.list_members().await,
            Err(AppError::RoomClosed)
        ));
        let (alice, _rx) = client("Alice");
        assert!(matches!(handle.join(alice).await, Err(AppError::RoomClosed)));
    }

    async fn drain_after_sync(handle: &RoomHandle, rxs: &mut [&mut mpsc::Receiver<Outbound>]) {
        handle.list_members().await.unwrap();
        for rx in rxs.iter_mut() {
            drain(rx);
        }
    }
}
