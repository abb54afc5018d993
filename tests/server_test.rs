//! Integration tests driving a real server over TCP on the loopback interface.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;

use termchat::{Config, Server};

const STEP: Duration = Duration::from_secs(5);

/// A telnet-like test client
struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect failed");
        let (r, w) = stream.into_split();
        let mut client = Self {
            lines: BufReader::new(r).lines(),
            writer: w,
        };
        client.expect("=== Welcome to Terminal Chat ===").await;
        client
    }

    /// Connect and complete negotiation with `nickname`
    async fn join(addr: SocketAddr, nickname: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(nickname).await;
        client
            .expect(&format!("{} has joined the room", nickname))
            .await;
        client
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .expect("write failed");
    }

    async fn expect(&mut self, needle: &str) -> String {
        let fut = async {
            loop {
                match self.lines.next_line().await.expect("read failed") {
                    Some(line) if line.contains(needle) => return line,
                    Some(_) => continue,
                    None => panic!("connection closed before {:?}", needle),
                }
            }
        };
        timeout(STEP, fut)
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {:?}", needle))
    }

    /// Read until the server closes the connection
    async fn expect_closed(&mut self) -> Vec<String> {
        let mut seen = Vec::new();
        let fut = async {
            loop {
                match self.lines.next_line().await {
                    Ok(Some(line)) => seen.push(line),
                    Ok(None) | Err(_) => break,
                }
            }
        };
        timeout(STEP, fut)
            .await
            .expect("server did not close the connection");
        seen
    }
}

async fn start_server(room_name: &str, max_users: usize) -> (Server, SocketAddr) {
    let config = Config {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        room_name: room_name.to_string(),
        max_users,
        color: false,
        ..Config::default()
    };
    let mut server = Server::new(config).unwrap();
    let addr = server.start().await.unwrap();
    (server, addr)
}

#[tokio::test]
async fn test_two_clients_chat() {
    let (mut server, addr) = start_server("Lobby", 10).await;

    let mut alice = TestClient::join(addr, "Alice").await;
    let mut bob = TestClient::join(addr, "Bob").await;
    alice.expect("Bob has joined the room").await;

    alice.send("hi bob").await;
    assert!(bob.expect("hi bob").await.contains("Alice: hi bob"));
    assert!(alice.expect("hi bob").await.contains("You: hi bob"));

    bob.send("/me waves").await;
    assert_eq!(alice.expect("* Bob").await, "* Bob waves");
    assert_eq!(bob.expect("* Bob").await, "* Bob waves");

    alice.send("/who").await;
    alice.expect("Users in Lobby (2/10):").await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_capacity_plus_one_is_rejected() {
    let (mut server, addr) = start_server("Tiny", 2).await;

    let _alice = TestClient::join(addr, "Alice").await;
    let _bob = TestClient::join(addr, "Bob").await;

    let mut carol = TestClient::connect(addr).await;
    carol.send("Carol").await;
    carol.expect("Sorry, the room is full").await;
    carol.expect_closed().await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_simultaneous_same_nickname_admits_one() {
    let (mut server, addr) = start_server("Lobby", 10).await;

    let mut first = TestClient::connect(addr).await;
    let mut second = TestClient::connect(addr).await;
    first.send("Alice").await;
    second.send("Alice").await;

    async fn read_outcome(client: &mut TestClient) -> Result<bool, tokio::time::error::Elapsed> {
        let fut = async move {
            loop {
                let line = client.lines.next_line().await.unwrap().unwrap();
                if line.contains("Welcome to Lobby, Alice!") {
                    return true;
                }
                if line.contains("Nickname 'Alice' is already taken") {
                    return false;
                }
            }
        };
        timeout(STEP, fut).await
    }

    let first_admitted = read_outcome(&mut first).await.unwrap();
    let second_admitted = read_outcome(&mut second).await.unwrap();
    assert!(first_admitted ^ second_admitted);

    // The loser can still pick another name
    let loser = if first_admitted { &mut second } else { &mut first };
    loser.send("Alice2").await;
    loser.expect("Alice2 has joined the room").await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_leave_is_announced_once() {
    let (mut server, addr) = start_server("Lobby", 10).await;

    let mut alice = TestClient::join(addr, "Alice").await;
    let mut bob = TestClient::join(addr, "Bob").await;

    alice.send("/quit").await;
    let rest = alice.expect_closed().await;
    assert!(rest.iter().any(|l| l.contains("Goodbye!")));

    bob.expect("Alice has left the room").await;
    bob.send("after").await;
    // Next line Bob sees must be his own message, not a duplicate leave
    let next = bob.expect("").await;
    assert!(next.contains("You: after"), "got {:?}", next);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_closes_all_connections() {
    let (mut server, addr) = start_server("Lobby", 10).await;

    let mut alice = TestClient::join(addr, "Alice").await;
    let mut pending = TestClient::connect(addr).await;

    timeout(STEP, server.stop())
        .await
        .expect("stop did not complete")
        .unwrap();

    alice.expect_closed().await;
    pending.expect_closed().await;
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_stop_with_client_that_never_reads() {
    let (mut server, addr) = start_server("Lobby", 10).await;
    let mut alice = TestClient::join(addr, "Alice").await;

    // Bob joins with a tiny receive window and never reads anything
    let socket = TcpSocket::new_v4().unwrap();
    socket.set_recv_buffer_size(1024).unwrap();
    let mut bob = socket.connect(addr).await.unwrap();
    bob.write_all(b"Bob\r\n").await.unwrap();
    alice.expect("Bob has joined the room").await;

    for _ in 0..5 {
        alice.send(&"y".repeat(1000)).await;
    }
    bob.write_all(b"/help\r\n/who\r\n").await.unwrap();

    timeout(STEP, server.stop())
        .await
        .expect("stop hung on a client that never reads")
        .unwrap();
    alice.expect_closed().await;
}
