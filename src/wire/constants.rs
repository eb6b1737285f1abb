/// Network magic values used in the Bitcoin P2P message header.
///
/// The first 4 bytes of every Bitcoin P2P message identify the
/// network (mainnet, testnet, regtest, signet) and act as a
/// message boundary marker in the TCP stream. They are serialized
/// little-endian, so mainnet's `0xD9B4BEF9` appears as `F9 BE B4 D9`.
///
/// Bitcoin Core maps magic values to networks in `GetNetworkForMagic`:
/// https://github.com/bitcoin/bitcoin/blob/master/src/kernel/chainparams.cpp#L703-L723
pub const MAIN_NET_MAGIC: u32 = 0xD9B4BEF9;
pub const TEST_NET3_MAGIC: u32 = 0x0709110B;
pub const REG_TEST_MAGIC: u32 = 0xDAB5BFFA;
pub const SIG_NET_MAGIC: u32 = 0x40CF030A;

/// Current Bitcoin P2P protocol version.
///
/// This value is sent in the `version` message during handshake
/// and is used for peer capability negotiation and feature gating.
/// It is serialized on the wire as a signed 32-bit little-endian integer.
///
/// https://github.com/bitcoin/bitcoin/blob/707ad466968b947b364cfc25bcb4d6895e799418/src/node/protocol_version.h#L12
pub const PROTOCOL_VERSION: i32 = 70016;

/// Size of the fixed message header: magic (4) + command (12) + length (4) + checksum (4).
pub const HEADER_SIZE: usize = 24;

/// Size of the null-padded ASCII command field.
pub const COMMAND_SIZE: usize = 12;

/// Largest payload a peer may announce (32 MiB, Bitcoin Core's `MAX_SIZE`).
///
/// The frame reader refuses larger announcements before allocating.
pub const MAX_PAYLOAD_SIZE: usize = 32 * 1024 * 1024;

/// `SHA256(SHA256(""))[..4]`, the checksum bytes of every empty payload
/// (`verack`, `getaddr`, ...).
pub const EMPTY_PAYLOAD_CHECKSUM: [u8; 4] = [0x5d, 0xf6, 0xe0, 0xe2];

/// Length of a `version` payload as built by this crate: two 26-byte network
/// addresses, an empty user agent and the relay flag.
pub const VERSION_PAYLOAD_SIZE: usize = 86;
