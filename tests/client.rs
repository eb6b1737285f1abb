use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use btc_handshake::wire::{self, Command, Message, ReadOptions};
use btc_handshake::{ChecksumPolicy, Client, ClientConfig, Error, HandshakeError, WireError};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::Span;

const MAGIC: u32 = 0xDAB5BFFA;

fn peer_options() -> ReadOptions {
    ReadOptions {
        magic: MAGIC,
        checksum: ChecksumPolicy::Verify,
        timeout: Some(Duration::from_secs(5)),
    }
}

async fn listen() -> (TcpListener, Arc<Client>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let client = Client::new("127.0.0.1", port, ClientConfig::default(), Span::none());
    (listener, Arc::new(client))
}

fn spawn_connect(client: &Arc<Client>, cancel: &CancellationToken) -> tokio::task::JoinHandle<Error> {
    let client = Arc::clone(client);
    let cancel = cancel.clone();
    tokio::spawn(async move { client.connect(cancel).await })
}

async fn send(stream: &mut TcpStream, command: Command, payload: Vec<u8>) {
    wire::write_message(stream, &Message::new(MAGIC, command, payload))
        .await
        .unwrap();
}

async fn recv(stream: &mut TcpStream) -> Message {
    wire::read_message(stream, &peer_options()).await.unwrap()
}

fn version_for(addr: SocketAddr) -> Message {
    wire::build_version_message(&ClientConfig::default(), addr).unwrap()
}

/// Accepts the client and completes the handshake from the node's side,
/// sending `verack` first when `verack_first` is set.
async fn accept_and_handshake(listener: &TcpListener, verack_first: bool) -> TcpStream {
    let (mut stream, addr) = listener.accept().await.unwrap();

    let theirs = recv(&mut stream).await;
    assert_eq!(theirs.command(), Command::Version);

    if verack_first {
        send(&mut stream, Command::Verack, vec![]).await;
        wire::write_message(&mut stream, &version_for(addr)).await.unwrap();
    } else {
        wire::write_message(&mut stream, &version_for(addr)).await.unwrap();
        send(&mut stream, Command::Verack, vec![]).await;
    }

    let ack = recv(&mut stream).await;
    assert_eq!(ack.command(), Command::Verack);
    assert!(ack.payload().is_empty());

    stream
}

/// Sends a ping and returns the pong payload; only succeeds once the client
/// is past the handshake and dispatching.
async fn ping(stream: &mut TcpStream, nonce: u64) -> Vec<u8> {
    send(stream, Command::Ping, nonce.to_le_bytes().to_vec()).await;
    let pong = recv(stream).await;
    assert_eq!(pong.command(), Command::Pong);
    pong.into_payload()
}

#[tokio::test]
async fn handshake_then_pong_echoes_the_ping_nonce() {
    let (listener, client) = listen().await;
    let cancel = CancellationToken::new();
    let connection = spawn_connect(&client, &cancel);

    let mut node = accept_and_handshake(&listener, false).await;
    let nonce = 0x0123_4567_89ab_cdef;
    assert_eq!(ping(&mut node, nonce).await, nonce.to_le_bytes());

    // Nothing but the one pong may follow.
    let extra = tokio::time::timeout(
        Duration::from_millis(200),
        wire::read_message(&mut node, &peer_options()),
    )
    .await;
    assert!(extra.is_err());

    cancel.cancel();
    assert!(connection.await.unwrap().is_cancelled());
}

#[tokio::test]
async fn handshake_accepts_verack_before_version() {
    let (listener, client) = listen().await;
    let cancel = CancellationToken::new();
    let connection = spawn_connect(&client, &cancel);

    let mut node = accept_and_handshake(&listener, true).await;
    assert_eq!(ping(&mut node, 7).await, 7u64.to_le_bytes());

    cancel.cancel();
    assert!(connection.await.unwrap().is_cancelled());
}

#[tokio::test]
async fn unexpected_message_during_handshake_fails() {
    let (listener, client) = listen().await;
    let connection = spawn_connect(&client, &CancellationToken::new());

    let (mut node, _) = listener.accept().await.unwrap();
    recv(&mut node).await;
    send(&mut node, Command::Ping, vec![0; 8]).await;

    let err = connection.await.unwrap();
    assert!(
        matches!(err, Error::Handshake(HandshakeError::UnexpectedMessageType(Command::Ping))),
        "{err}"
    );
}

#[tokio::test]
async fn unknown_messages_are_ignored() {
    let (listener, client) = listen().await;
    let cancel = CancellationToken::new();
    let connection = spawn_connect(&client, &cancel);

    let mut node = accept_and_handshake(&listener, false).await;
    let mut getaddr = Message::new(MAGIC, Command::Unknown, vec![]).serialize();
    getaddr[4..11].copy_from_slice(b"getaddr");
    node.write_all(&getaddr).await.unwrap();
    send(&mut node, Command::Pong, vec![1; 8]).await;

    assert_eq!(ping(&mut node, 99).await, 99u64.to_le_bytes());

    cancel.cancel();
    assert!(connection.await.unwrap().is_cancelled());
}

#[tokio::test]
async fn cancellation_wins_over_pending_messages() {
    let (listener, client) = listen().await;
    let cancel = CancellationToken::new();
    let connection = spawn_connect(&client, &cancel);

    let mut node = accept_and_handshake(&listener, false).await;
    for _ in 0..200 {
        send(&mut node, Command::Unknown, vec![0xAB; 64]).await;
    }
    cancel.cancel();

    let err = tokio::time::timeout(Duration::from_secs(2), connection)
        .await
        .expect("connect should return promptly after cancellation")
        .unwrap();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn disconnect_ends_the_connection_as_cancelled() {
    let (listener, client) = listen().await;
    let connection = spawn_connect(&client, &CancellationToken::new());

    let mut node = accept_and_handshake(&listener, false).await;
    ping(&mut node, 1).await;

    client.disconnect();
    let err = connection.await.unwrap();
    assert!(err.is_cancelled());
    assert_eq!(err.to_string(), "context closed");
}

#[tokio::test]
async fn peer_hang_up_is_a_receive_error() {
    let (listener, client) = listen().await;
    let connection = spawn_connect(&client, &CancellationToken::new());

    let node = accept_and_handshake(&listener, false).await;
    drop(node);

    let err = connection.await.unwrap();
    assert!(matches!(err, Error::MessageReceive(WireError::Io(_))), "{err}");
    assert!(!err.is_cancelled());
}

#[tokio::test]
async fn corrupt_checksum_after_handshake_is_a_receive_error() {
    let (listener, client) = listen().await;
    let connection = spawn_connect(&client, &CancellationToken::new());

    let mut node = accept_and_handshake(&listener, false).await;
    let mut frame = Message::new(MAGIC, Command::Ping, vec![5; 8]).serialize();
    frame[20] ^= 0xFF;
    node.write_all(&frame).await.unwrap();

    let err = connection.await.unwrap();
    assert!(matches!(err, Error::MessageReceive(WireError::Checksum { .. })), "{err}");
}

#[tokio::test]
async fn second_connect_while_active_is_refused() {
    let (listener, client) = listen().await;
    let cancel = CancellationToken::new();
    let connection = spawn_connect(&client, &cancel);

    let _node = accept_and_handshake(&listener, false).await;

    let err = client.connect(CancellationToken::new()).await;
    assert!(matches!(err, Error::AlreadyConnected));

    cancel.cancel();
    assert!(connection.await.unwrap().is_cancelled());
}

#[tokio::test]
async fn dial_failure_is_returned() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = Client::new("127.0.0.1", port, ClientConfig::default(), Span::none());
    let err = client.connect(CancellationToken::new()).await;

    assert!(matches!(err, Error::Dial { .. }), "{err}");
}

#[tokio::test]
async fn silent_peer_times_out_the_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = ClientConfig::default().with_handshake_timeout(Some(Duration::from_millis(100)));
    let client = Client::new("127.0.0.1", port, config, Span::none());

    let (err, _node) = tokio::join!(client.connect(CancellationToken::new()), listener.accept());

    assert!(
        matches!(err, Error::Handshake(HandshakeError::Wire(WireError::Timeout(_)))),
        "{err}"
    );
}
