//! Per-connection session
//!
//! A session owns one client's byte stream. [`Session::establish`] runs the
//! nickname negotiation and joins the room; [`Session::run`] then reads lines
//! until quit, end-of-stream, a read error or shutdown. Everything written to
//! the client after admission goes through one ordered outbound queue drained
//! by a dedicated writer task, so room broadcasts and replies to the client's
//! own commands never interleave on the wire.

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};

use crate::client::{ClientHandle, Outbound, OUTBOUND_QUEUE_SIZE};
use crate::error::{AppError, NicknameError};
use crate::formatter::Formatter;
use crate::message::{within_length_limit, Command, Message};
use crate::rate_limit::RateLimiter;
use crate::room::{JoinOutcome, RoomHandle};
use crate::types::{ClientId, Nickname};

/// Upper bound on a raw input line in bytes; longer lines are discarded
const MAX_LINE_BYTES: usize = 8 * 1024;

const CRLF: &str = "\r\n";

/// Resolves once `shutdown` is raised or its sender is gone
pub(crate) async fn shutdown_signaled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// One raw read from the client
enum Input {
    Line(String),
    TooLong,
    Eof,
}

/// What the read loop does after a line
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

type Lines<S> = FramedRead<ReadHalf<S>, LinesCodec>;
type Writer<S> = BufWriter<WriteHalf<S>>;

/// A joined client connection
pub struct Session<S> {
    id: ClientId,
    nickname: Nickname,
    room: RoomHandle,
    formatter: Formatter,
    lines: Lines<S>,
    outbound: mpsc::Sender<Outbound>,
    writer: JoinHandle<()>,
    rate_limiter: RateLimiter,
    shutdown: watch::Receiver<bool>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Negotiate a nickname, join the room and send the welcome banner
    ///
    /// On error the stream is dropped (closing the connection) and the
    /// client is not a room member.
    pub async fn establish(
        id: ClientId,
        stream: S,
        room: RoomHandle,
        formatter: Formatter,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Self, AppError> {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut lines = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(MAX_LINE_BYTES),
        );
        let mut writer = BufWriter::new(write_half);
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);

        let title = formatter.title("Welcome to Terminal Chat");
        write_guarded(
            &mut writer,
            &format!("{}{}{}", title, CRLF, CRLF),
            shutdown,
            AppError::NicknameNegotiation,
        )
        .await?;

        let nickname = loop {
            let negotiated =
                negotiate_nickname(&mut lines, &mut writer, &room, &formatter, shutdown).await?;
            let Some(candidate) = negotiated else {
                continue;
            };

            let handle = ClientHandle::new(id, candidate.clone(), outbound.clone());
            match room.join(handle).await? {
                JoinOutcome::Admitted => break candidate,
                JoinOutcome::NicknameTaken => {
                    let notice = NicknameError::Taken(candidate.to_string()).to_string();
                    write_guarded(
                        &mut writer,
                        &format!("{}{}", notice, CRLF),
                        shutdown,
                        AppError::NicknameNegotiation,
                    )
                    .await?;
                }
                JoinOutcome::RoomFull => {
                    let notice = formatter.system("Sorry, the room is full. Try again later.");
                    let notice = format!("{}{}", notice, CRLF);
                    if let Err(e) =
                        write_guarded(&mut writer, &notice, shutdown, AppError::WriteFailed).await
                    {
                        debug!("Could not send room-full notice: {}", e);
                    }
                    return Err(AppError::RoomFull);
                }
            }
        };

        let welcome = tokio::select! {
            _ = shutdown_signaled(shutdown) => Err(AppError::ConnectionClosed),
            sent = send_welcome(&mut writer, &formatter, room.name(), nickname.as_str()) => {
                sent.map_err(AppError::WelcomeWrite)
            }
        };
        if let Err(e) = welcome {
            room.leave(id, nickname.clone()).await;
            return Err(e);
        }

        let writer = tokio::spawn(write_loop(
            writer,
            outbound_rx,
            formatter,
            nickname.to_string(),
            shutdown.clone(),
        ));

        Ok(Self {
            id,
            nickname,
            room,
            formatter,
            lines,
            outbound,
            writer,
            rate_limiter: RateLimiter::default(),
            shutdown: shutdown.clone(),
        })
    }

    pub fn nickname(&self) -> &Nickname {
        &self.nickname
    }

    /// Read and process lines until the session ends, then leave the room
    /// and wait for queued output to be written.
    pub async fn run(mut self) {
        info!("Starting handler for client {}", self.nickname);

        match self.read_loop().await {
            Ok(()) => debug!("Read loop for {} finished", self.nickname),
            Err(e) => warn!("Read loop for {} ended: {}", self.nickname, e),
        }

        self.room.leave(self.id, self.nickname.clone()).await;

        let Session {
            nickname,
            outbound,
            mut writer,
            mut shutdown,
            ..
        } = self;
        let _ = outbound.try_send(Outbound::Close);
        drop(outbound);

        let joined = tokio::select! {
            joined = &mut writer => Some(joined),
            _ = shutdown_signaled(&mut shutdown) => None,
        };
        match joined {
            Some(Ok(())) => {}
            Some(Err(e)) if e.is_panic() => error!("Writer task for {} panicked", nickname),
            Some(Err(e)) => debug!("Writer task for {} cancelled: {}", nickname, e),
            None => writer.abort(),
        }

        info!("Client handler for {} is shutting down", nickname);
    }

    async fn read_loop(&mut self) -> Result<(), AppError> {
        loop {
            let input = tokio::select! {
                _ = shutdown_signaled(&mut self.shutdown) => {
                    debug!("Shutdown while reading for client {}", self.nickname);
                    return Ok(());
                }
                input = read_input(&mut self.lines) => input?,
            };

            let line = match input {
                Input::Line(line) => line,
                Input::TooLong => {
                    self.notify_error(&AppError::MessageTooLong).await;
                    continue;
                }
                Input::Eof => {
                    info!("Client {} disconnected (EOF)", self.nickname);
                    return Ok(());
                }
            };

            match self.process_line(line.trim(), Instant::now()).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => return Ok(()),
                Err(e) if e.is_recoverable() => {
                    debug!("Message from {} rejected: {}", self.nickname, e);
                    self.notify_error(&e).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Validate, rate limit and dispatch one trimmed line
    async fn process_line(&mut self, line: &str, now: Instant) -> Result<Flow, AppError> {
        if line.is_empty() {
            return Ok(Flow::Continue);
        }
        if !within_length_limit(line) {
            return Err(AppError::MessageTooLong);
        }

        let command = Command::parse(line);
        let exempt = command.as_ref().is_some_and(Command::bypasses_rate_limit);
        if !exempt {
            self.rate_limiter
                .check(now)
                .map_err(|wait| AppError::RateLimited { wait })?;
        }

        match command {
            Some(command) => self.handle_command(command).await,
            None => {
                self.room
                    .broadcast(Message::chat(self.nickname.as_str(), line))
                    .await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> Result<Flow, AppError> {
        match command {
            Command::Who => {
                let members = self.room.list_members().await?;
                let list = self
                    .formatter
                    .user_list(self.room.name(), &members, self.room.capacity());
                self.send_text(list).await;
            }
            Command::Me(Some(action)) => {
                self.room
                    .broadcast(Message::action(self.nickname.as_str(), action))
                    .await?;
            }
            Command::Me(None) => return Err(AppError::InvalidCommandUsage("/me <action>")),
            Command::Help => {
                let help = self.formatter.help();
                self.send_text(help).await;
            }
            Command::Quit => {
                self.send_system("Goodbye!").await;
                return Ok(Flow::Quit);
            }
            Command::Unknown(name) => return Err(AppError::UnknownCommand(name)),
        }
        Ok(Flow::Continue)
    }

    async fn notify_error(&mut self, err: &AppError) {
        self.send_system(&err.client_notice()).await;
    }

    async fn send_system(&mut self, text: &str) {
        self.enqueue(Outbound::Message(Message::system(text))).await;
    }

    async fn send_text(&mut self, text: String) {
        self.enqueue(Outbound::Text(text + CRLF)).await;
    }

    /// Queue a reply to this client, waiting for room in the queue unless
    /// shutdown is raised first
    async fn enqueue(&mut self, item: Outbound) {
        tokio::select! {
            _ = shutdown_signaled(&mut self.shutdown) => {
                debug!("Shutdown while queueing output for {}, dropping it", self.nickname);
            }
            sent = self.outbound.send(item) => {
                if sent.is_err() {
                    debug!("Writer for {} is gone, dropping output", self.nickname);
                }
            }
        }
    }
}

/// Prompt once and validate the reply locally and against the room.
/// `Ok(None)` means the candidate was rejected and the client re-prompted.
async fn negotiate_nickname<S>(
    lines: &mut Lines<S>,
    writer: &mut Writer<S>,
    room: &RoomHandle,
    formatter: &Formatter,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Option<Nickname>, AppError>
where
    S: AsyncRead + AsyncWrite,
{
    write_guarded(
        writer,
        &formatter.nickname_prompt(),
        shutdown,
        AppError::NicknameNegotiation,
    )
    .await?;

    let input = tokio::select! {
        _ = shutdown_signaled(shutdown) => return Err(AppError::ConnectionClosed),
        input = read_input(lines) => input.map_err(|e| match e {
            AppError::ReadFailed(io) => AppError::NicknameNegotiation(io),
            other => other,
        })?,
    };

    let rejection = match input {
        Input::Line(line) => match Nickname::parse(&line) {
            Ok(candidate) => {
                if room.is_nickname_available(candidate.as_str()).await? {
                    return Ok(Some(candidate));
                }
                NicknameError::Taken(candidate.to_string())
            }
            Err(e) => e,
        },
        Input::TooLong => NicknameError::TooLong,
        Input::Eof => {
            return Err(AppError::NicknameNegotiation(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before a nickname was chosen",
            )))
        }
    };

    write_guarded(
        writer,
        &format!("{}{}", rejection, CRLF),
        shutdown,
        AppError::NicknameNegotiation,
    )
    .await?;
    Ok(None)
}

async fn read_input<S>(lines: &mut Lines<S>) -> Result<Input, AppError>
where
    S: AsyncRead,
{
    match lines.next().await {
        Some(Ok(line)) => Ok(Input::Line(line)),
        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
            // After a decode error the framed reader yields a single `None`
            // before it resumes; that is not end of stream.
            let _ = lines.next().await;
            Ok(Input::TooLong)
        }
        Some(Err(LinesCodecError::Io(e))) => Err(AppError::ReadFailed(e)),
        None => Ok(Input::Eof),
    }
}

async fn write_text<W>(writer: &mut W, text: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await
}

/// Write `text` unless shutdown is raised first
async fn write_guarded<W>(
    writer: &mut W,
    text: &str,
    shutdown: &mut watch::Receiver<bool>,
    on_error: fn(std::io::Error) -> AppError,
) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        _ = shutdown_signaled(shutdown) => Err(AppError::ConnectionClosed),
        written = write_text(writer, text) => written.map_err(on_error),
    }
}

async fn send_welcome<W>(
    writer: &mut W,
    formatter: &Formatter,
    room_name: &str,
    nickname: &str,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_text(writer, &format!("{}{}", formatter.banner(), CRLF)).await?;
    write_text(
        writer,
        &format!("{}{}{}", formatter.welcome(room_name, nickname), CRLF, CRLF),
    )
    .await?;
    write_text(writer, &format!("{}{}{}", formatter.hint(), CRLF, CRLF)).await
}

/// Drain the outbound queue in order until closed, told to close, the
/// connection fails or shutdown is raised.
async fn write_loop<S>(
    mut writer: Writer<S>,
    mut outbound: mpsc::Receiver<Outbound>,
    formatter: Formatter,
    nickname: String,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncWrite,
{
    loop {
        let item = tokio::select! {
            _ = shutdown_signaled(&mut shutdown) => break,
            item = outbound.recv() => item,
        };

        let text = match item {
            Some(Outbound::Message(msg)) => {
                format!("{}{}", formatter.format_message(&msg, &nickname), CRLF)
            }
            Some(Outbound::Text(text)) => text,
            Some(Outbound::Close) | None => break,
        };

        if let Err(e) = write_text(&mut writer, &text).await {
            warn!("Error sending message to {}: {}", nickname, AppError::WriteFailed(e));
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Error closing connection for {}: {}", nickname, e);
    }
}
