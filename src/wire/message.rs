use crate::wire::codec::checksum;
use crate::wire::constants::COMMAND_SIZE;
use std::fmt::{self, Debug, Display, Formatter};

/// A Bitcoin P2P message frame.
///
/// This struct represents a message as transmitted on the wire
/// according to the Bitcoin P2P protocol (https://developer.bitcoin.org/reference/p2p_networking.html#message-headers).
///
/// A Bitcoin message frame consists of:
/// - 4-byte magic value (network identifier)
/// - 12-byte command
/// - 4-byte payload length
/// - 4-byte checksum
/// - variable-length payload (up to 32MB)
///
/// Fields are private: every `Message` built through [`Message::new`] or
/// parsed through [`Message::deserialize`](crate::wire::codec) keeps
/// `payload_length == payload.len()` and, unless the checksum policy is
/// [`Trust`](crate::config::ChecksumPolicy::Trust), a checksum matching the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub(crate) magic: u32,
    pub(crate) command: Command,
    pub(crate) payload_length: u32,
    pub(crate) checksum: u32,
    pub(crate) payload: Vec<u8>,
}

impl Message {
    /// Builds a message for `command`, deriving length and checksum from `payload`.
    pub fn new(magic: u32, command: Command, payload: Vec<u8>) -> Self {
        Self {
            magic,
            command,
            payload_length: payload.len() as u32,
            checksum: checksum(&payload),
            payload,
        }
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn payload_length(&self) -> u32 {
        self.payload_length
    }

    /// First 4 bytes of `SHA256(SHA256(payload))`, read little-endian.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// The message kinds this client understands.
///
/// Every other command name read off the wire collapses into
/// [`Command::Unknown`]; the original name is not kept, and `Unknown`
/// serializes as twelve zero bytes.
///
/// See:
/// https://developer.bitcoin.org/reference/p2p_networking.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Unknown,
    Ping,
    Pong,
    Version,
    Verack,
}

/// Wire names of the known commands, ASCII and null padded to 12 bytes.
///
/// Both directions of the mapping go through this table.
const COMMAND_TABLE: [(Command, [u8; COMMAND_SIZE]); 4] = [
    (Command::Version, *b"version\0\0\0\0\0"),
    (Command::Verack, *b"verack\0\0\0\0\0\0"),
    (Command::Ping, *b"ping\0\0\0\0\0\0\0\0"),
    (Command::Pong, *b"pong\0\0\0\0\0\0\0\0"),
];

impl Command {
    /// Every command with a wire name, i.e. all but [`Command::Unknown`].
    pub const KNOWN: [Command; 4] = [
        Command::Version,
        Command::Verack,
        Command::Ping,
        Command::Pong,
    ];

    /// Returns the 12-byte command field as defined by the Bitcoin P2P protocol.
    ///
    /// The command string is ASCII and padded with zero bytes.
    pub fn as_bytes(&self) -> [u8; COMMAND_SIZE] {
        COMMAND_TABLE
            .iter()
            .find(|(command, _)| command == self)
            .map(|(_, name)| *name)
            .unwrap_or([0u8; COMMAND_SIZE])
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Unknown => "unknown",
            Command::Ping => "ping",
            Command::Pong => "pong",
            Command::Version => "version",
            Command::Verack => "verack",
        }
    }
}

impl From<&[u8; COMMAND_SIZE]> for Command {
    /// Exact byte match against the command table; anything else is `Unknown`.
    fn from(bytes: &[u8; COMMAND_SIZE]) -> Self {
        COMMAND_TABLE
            .iter()
            .find(|(_, name)| name == bytes)
            .map(|(command, _)| *command)
            .unwrap_or(Command::Unknown)
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetAddr {
    pub services: Services,
    pub ip: std::net::IpAddr,
    pub port: u16,
}

/// The peer's `version` message, decoded for logging and inspection.
///
/// https://developer.bitcoin.org/reference/p2p_networking.html#version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: Services,
    pub timestamp: i64,
    pub addr_recv: NetAddr,
    pub addr_from: NetAddr,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: Option<bool>,
}

/// Service flags as defined by the Bitcoin P2P protocol.
///
/// This is a bitfield (`u64`) transmitted in the `version` message.
/// Each bit represents a capability supported by the node.
///
/// Official reference:
/// https://developer.bitcoin.org/reference/p2p_networking.html#version
///
/// The flags are forward-compatible: unknown bits must be preserved.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Services(u64);

impl Services {
    /// Creates a new `Services` from raw bits.
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bitfield value.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns true if all bits in `other` are set.
    pub const fn contains(self, other: Services) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns true if no bits are set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// 0x00: not a full node.
    pub const NONE: Services = Services(0x00);

    /// 0x01: NODE_NETWORK, a full node that can be asked for full blocks.
    pub const NODE_NETWORK: Services = Services(0x01);

    /// 0x04: NODE_BLOOM, supports bloom-filtered connections (BIP111).
    pub const NODE_BLOOM: Services = Services(0x04);

    /// 0x08: NODE_WITNESS, serves witness data (BIP144).
    pub const NODE_WITNESS: Services = Services(0x08);

    /// 0x0400: NODE_NETWORK_LIMITED, keeps at least the last 288 blocks (BIP159).
    pub const NODE_NETWORK_LIMITED: Services = Services(0x0400);

    pub fn names(self) -> Vec<&'static str> {
        if self.is_empty() {
            return vec!["NONE"];
        }

        [
            (Self::NODE_NETWORK, "NODE_NETWORK"),
            (Self::NODE_BLOOM, "NODE_BLOOM"),
            (Self::NODE_WITNESS, "NODE_WITNESS"),
            (Self::NODE_NETWORK_LIMITED, "NODE_NETWORK_LIMITED"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

impl From<u64> for Services {
    fn from(value: u64) -> Self {
        Services::new(value)
    }
}

impl Debug for Services {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Services(NONE)");
        }

        let names = self.names().join(" | ");

        write!(f, "Services({}) [0x{:016x}]", names, self.bits())
    }
}
