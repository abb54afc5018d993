//! Chat server lifecycle
//!
//! Binds the listener, runs the accept loop and coordinates shutdown:
//! one shutdown flag stops accepting, ends every session (dropping its
//! socket), and the accept loop waits for all session tasks before the
//! room itself is stopped.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, ServerError};
use crate::formatter::Formatter;
use crate::handler::handle_connection;
use crate::listener::Listener;
use crate::room::{Room, RoomHandle};
use crate::session::shutdown_signaled;

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// State that only exists while the server is running
struct Running {
    room: Room,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// The chat server
pub struct Server {
    config: Config,
    formatter: Formatter,
    running: Option<Running>,
}

impl Server {
    /// Create a server from a validated configuration
    pub fn new(config: Config) -> Result<Self, ServerError> {
        config.validate()?;
        let formatter = Formatter::new(config.color);
        Ok(Self {
            config,
            formatter,
            running: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Address actually bound, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Bind the listener, start the room and begin accepting connections
    ///
    /// Bind failures are returned and leave the server stopped.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        let listener = Listener::bind(&self.config).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind {
                addr: SocketAddr::new(self.config.host, self.config.port),
                source,
            })?;

        info!(
            "Listening on {} via {} transport",
            local_addr,
            listener.transport()
        );

        let room = Room::start(self.config.room_name.clone(), self.config.max_users);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            room.handle(),
            self.formatter,
            shutdown_rx,
        ));

        info!("Server started on port {}", local_addr.port());
        info!("Room name: {}", self.config.room_name);
        info!("Maximum users: {}", self.config.max_users);
        info!("Users can connect via: {}", self.config.connect_hint());

        self.running = Some(Running {
            room,
            shutdown,
            accept_task,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Stop accepting, close every live connection, wait for all sessions
    /// and stop the room.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let running = self.running.take().ok_or(ServerError::NotStarted)?;
        info!("Shutting down server...");

        running.shutdown.send_replace(true);

        if let Err(e) = running.accept_task.await {
            error!("Accept loop failed: {}", e);
        }
        running.room.stop().await;

        info!("Server shutdown complete");
        Ok(())
    }
}

/// Accept connections until shutdown, then wait for every session to end
async fn accept_loop(
    listener: Listener,
    room: RoomHandle,
    formatter: Formatter,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_signaled(&mut shutdown) => break,
            Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                log_session_exit(finished);
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Could not set TCP_NODELAY for {}: {}", peer_addr, e);
                    }
                    let room = room.clone();
                    let shutdown = shutdown.clone();
                    sessions.spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, peer_addr, room, formatter, shutdown).await
                        {
                            log_connection_error(peer_addr, &e);
                        }
                    });
                    debug!("Active connections: {}", sessions.len());
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
        }
    }

    drop(listener);
    info!("Listener closed, closing {} connection(s)", sessions.len());

    while let Some(finished) = sessions.join_next().await {
        log_session_exit(finished);
    }
    debug!("All sessions finished");
}

fn log_session_exit(finished: Result<(), JoinError>) {
    if let Err(e) = finished {
        if e.is_panic() {
            error!("Session task panicked: {}", e);
        } else {
            debug!("Session task cancelled: {}", e);
        }
    }
}

fn log_connection_error(peer_addr: SocketAddr, err: &AppError) {
    match err {
        AppError::RoomFull | AppError::ConnectionClosed | AppError::RoomClosed => {
            info!("Connection from {} closed: {}", peer_addr, err)
        }
        _ => warn!("Error handling connection from {}: {}", peer_addr, err),
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn test_config() -> Config {
        Config {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            color: false,
            ..Config::default()
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = Config {
            max_users: 0,
            ..test_config()
        };
        assert!(matches!(
            Server::new(config),
            Err(ServerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_new_keeps_config() {
        let config = Config {
            room_name: "Lobby".to_string(),
            ..test_config()
        };
        let server = Server::new(config.clone()).unwrap();
        assert_eq!(server.config(), &config);
        assert_eq!(server.local_addr(), None);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let mut server = Server::new(test_config()).unwrap();
        assert!(matches!(server.stop().await, Err(ServerError::NotStarted)));
    }

    #[tokio::test]
    async fn test_start_twice() {
        let mut server = Server::new(test_config()).unwrap();
        let addr = server.start().await.unwrap();
        assert_eq!(server.local_addr(), Some(addr));
        assert!(matches!(
            server.start().await,
            Err(ServerError::AlreadyStarted)
        ));
        server.stop().await.unwrap();
        assert_eq!(server.local_addr(), None);
    }
}
