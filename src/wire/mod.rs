//! Bitcoin P2P wire protocol primitives.
//!
//! This module converts between [`Message`] values and their wire
//! representation, and moves single frames over async byte streams.
//!
//! It implements:
//! - Serialization and parsing of the 24-byte message header
//! - The double-SHA256 payload checksum
//! - Framed reads and writes over any `AsyncRead` / `AsyncWrite`
//! - Construction of the `version` handshake payload
//!
//! Protocol reference:
//! https://developer.bitcoin.org/reference/p2p_networking.html
pub mod codec;

pub mod decode;
pub mod message;
pub mod payload;

pub mod constants;

pub use crate::error::WireError;
pub use codec::{Header, ReadOptions, checksum, read_message, write_message};
pub use decode::Decode;
pub use message::{Command, Message, NetAddr, Services, VersionMessage};
pub use payload::{build_version_message, build_version_payload};
