//! The `version` / `verack` exchange that opens every Bitcoin P2P connection.
//!
//! ```text
//!   → send version
//!   ← recv version   → send verack
//!   ← recv verack
//! ```
//!
//! The peer's `version` and `verack` may arrive in either order, once each.
//! Nothing else is accepted before both have been seen, so a peer gets at
//! most two reads, each bounded by the handshake timeout.
//!
//! https://developer.bitcoin.org/devguide/p2p_network.html#connecting-to-peers

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{Instrument, Span, debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{HandshakeError, WireError};
use crate::wire::{
    self, Command, Decode, Message, ReadOptions, VersionMessage, build_version_message,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet.
    Start,
    /// Our `version` is out; waiting for the peer's `version` and `verack`.
    AwaitingPeerMessages { version_seen: bool, verack_seen: bool },
    Complete,
    Failed,
}

/// Handshake state machine.
///
/// [`Handshake::start`] and [`Handshake::receive`] advance the state without
/// touching any I/O; [`Handshake::run`] drives them over a byte stream.
pub struct Handshake {
    config: ClientConfig,
    state: HandshakeState,
    peer_version: Option<VersionMessage>,
    span: Span,
}

impl Handshake {
    pub fn new(config: &ClientConfig, span: Span) -> Self {
        Self {
            config: config.clone(),
            state: HandshakeState::Start,
            peer_version: None,
            span,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == HandshakeState::Complete
    }

    /// The peer's decoded `version`, once received.
    pub fn peer_version(&self) -> Option<&VersionMessage> {
        self.peer_version.as_ref()
    }

    /// Leaves `Start` and returns the `version` message to send to `destination`.
    pub fn start(&mut self, destination: SocketAddr) -> Result<Message, HandshakeError> {
        let version = build_version_message(&self.config, destination).map_err(WireError::from)?;
        self.state = HandshakeState::AwaitingPeerMessages {
            version_seen: false,
            verack_seen: false,
        };
        Ok(version)
    }

    /// Feeds one message from the peer and returns the reply to send, if any.
    ///
    /// A `version` is answered with a `verack`. Any command other than
    /// `version` or `verack`, a second copy of either, or any message outside
    /// `AwaitingPeerMessages` fails the handshake.
    pub fn receive(&mut self, msg: &Message) -> Result<Option<Message>, HandshakeError> {
        let HandshakeState::AwaitingPeerMessages {
            mut version_seen,
            mut verack_seen,
        } = self.state
        else {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::UnexpectedMessageType(msg.command()));
        };

        let reply = match msg.command() {
            Command::Version if !version_seen => {
                version_seen = true;
                self.record_peer_version(msg);
                Some(Message::new(self.config.magic(), Command::Verack, vec![]))
            }
            Command::Verack if !verack_seen => {
                verack_seen = true;
                None
            }
            other => {
                self.state = HandshakeState::Failed;
                return Err(HandshakeError::UnexpectedMessageType(other));
            }
        };

        self.state = if version_seen && verack_seen {
            HandshakeState::Complete
        } else {
            HandshakeState::AwaitingPeerMessages {
                version_seen,
                verack_seen,
            }
        };

        Ok(reply)
    }

    /// Runs the whole exchange over `stream`.
    ///
    /// Every read is bounded by the configured handshake timeout. Any
    /// failure leaves the state machine in [`HandshakeState::Failed`].
    pub async fn run<S>(&mut self, stream: &mut S, destination: SocketAddr) -> Result<(), HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let span = self.span.clone();
        let result = self.drive(stream, destination).instrument(span).await;
        if result.is_err() {
            self.state = HandshakeState::Failed;
        }
        result
    }

    async fn drive<S>(&mut self, stream: &mut S, destination: SocketAddr) -> Result<(), HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let version = self.start(destination)?;
        debug!(%destination, "sending version");
        wire::write_message(stream, &version).await?;

        let options = ReadOptions {
            magic: self.config.magic(),
            checksum: self.config.checksum,
            timeout: self.config.handshake_timeout,
        };

        while !self.is_complete() {
            let msg = wire::read_message(stream, &options).await?;
            debug!(command = %msg.command(), len = msg.payload_length(), "handshake message received");

            if let Some(reply) = self.receive(&msg)? {
                debug!(command = %reply.command(), "replying");
                wire::write_message(stream, &reply).await?;
            }
        }

        Ok(())
    }

    fn record_peer_version(&mut self, msg: &Message) {
        match VersionMessage::decode(msg.payload()) {
            Ok(version) => {
                info!(
                    parent: &self.span,
                    version = version.version,
                    services = ?version.services,
                    user_agent = %version.user_agent,
                    start_height = version.start_height,
                    "peer version received"
                );
                self.peer_version = Some(version);
            }
            Err(e) => {
                warn!(parent: &self.span, error = %e, "could not decode peer version payload");
            }
        }
    }
}
