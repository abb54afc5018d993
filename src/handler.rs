//! Connection handler
//!
//! Handles individual client connections: gives each one an identity and a
//! tracing span, establishes the session and runs it to completion.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{info, info_span, Instrument};

use crate::error::AppError;
use crate::formatter::Formatter;
use crate::room::RoomHandle;
use crate::session::Session;
use crate::types::ClientId;

/// Handle a newly accepted connection
///
/// Returns once the client has quit, disconnected or been shut down.
/// Errors are per-connection only: by the time this returns the stream
/// has been dropped and the client is no longer a room member.
pub async fn handle_connection<S>(
    stream: S,
    peer_addr: SocketAddr,
    room: RoomHandle,
    formatter: Formatter,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let client_id = ClientId::new();
    let span = info_span!("session", client = %client_id, peer = %peer_addr);

    async move {
        info!("New connection from {}", peer_addr);

        let session = Session::establish(client_id, stream, room, formatter, &mut shutdown).await?;
        info!("Client {} joined as '{}'", client_id, session.nickname());

        session.run().await;

        info!("Connection from {} closed", peer_addr);
        Ok(())
    }
    .instrument(span)
    .await
}
