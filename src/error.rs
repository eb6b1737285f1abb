use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::wire::Command;

/// Failures while encoding, decoding, reading or writing a single frame.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("incorrect message size: need {needed} bytes, got {got}")]
    MessageSize { needed: usize, got: usize },
    #[error("wrong checksum: declared 0x{declared:08x}, computed 0x{computed:08x}")]
    Checksum { declared: u32, computed: u32 },
    #[error("payload of {length} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { length: usize, max: usize },
    #[error("unexpected network magic 0x{got:08x}, expected 0x{expected:08x}")]
    UnexpectedMagic { expected: u32, got: u32 },
    #[error("no message within {0:?}")]
    Timeout(Duration),
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
}

/// Why the version/verack exchange failed.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("unexpected message type during handshake: {0}")]
    UnexpectedMessageType(Command),
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Errors returned by [`Client::connect`](crate::client::Client::connect).
///
/// A connection attempt always ends in one of these. [`Error::Cancelled`]
/// marks a deliberate shutdown; everything else is a failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("could not connect to {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("problem sending message: {0}")]
    MessageSend(#[source] WireError),
    #[error("problem receiving message: {0}")]
    MessageReceive(#[source] WireError),
    #[error("client is already connected")]
    AlreadyConnected,
    #[error("context closed")]
    Cancelled,
}

impl Error {
    /// True when the connection ended because it was asked to.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
