use crate::config::ChecksumPolicy;
use crate::error::WireError;
use crate::wire::constants::{COMMAND_SIZE, EMPTY_PAYLOAD_CHECKSUM, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::wire::message::{Command, Message};
use byteorder::{ByteOrder, LittleEndian};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Computes the Bitcoin message checksum of `payload`.
///
/// The checksum is defined as the first 4 bytes of:
///
/// ```text
/// SHA256(SHA256(payload))
/// ```
///
/// read as a little-endian `u32`, so that writing the value back with
/// `to_le_bytes` reproduces the digest bytes. Empty payloads short-circuit
/// to the well-known `5d f6 e0 e2`.
///
/// ```
/// use btc_handshake::wire::checksum;
///
/// assert_eq!(checksum(b"hello world"), 0xb8d462bc);
/// assert_eq!(checksum(&[]).to_le_bytes(), [0x5d, 0xf6, 0xe0, 0xe2]);
/// ```
pub fn checksum(payload: &[u8]) -> u32 {
    if payload.is_empty() {
        return LittleEndian::read_u32(&EMPTY_PAYLOAD_CHECKSUM);
    }

    let hash = Sha256::digest(Sha256::digest(payload));
    LittleEndian::read_u32(&hash[..4])
}

/// The fixed 24-byte header in front of every payload.
///
/// ```text
/// +------------+--------------+---------------+-------------+
/// | magic (4)  | command (12) | length (4 LE) | checksum(4) |
/// +------------+--------------+---------------+-------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub command: Command,
    pub payload_length: u32,
    pub checksum: u32,
}

impl Header {
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut command = [0u8; COMMAND_SIZE];
        command.copy_from_slice(&bytes[4..16]);

        Self {
            magic: LittleEndian::read_u32(&bytes[0..4]),
            command: Command::from(&command),
            payload_length: LittleEndian::read_u32(&bytes[16..20]),
            checksum: LittleEndian::read_u32(&bytes[20..24]),
        }
    }

    /// Attaches `payload`, whose length the caller has already matched
    /// against `payload_length`.
    fn into_message(self, payload: Vec<u8>, policy: ChecksumPolicy) -> Result<Message, WireError> {
        if policy == ChecksumPolicy::Verify {
            let computed = checksum(&payload);
            if computed != self.checksum {
                return Err(WireError::Checksum {
                    declared: self.checksum,
                    computed,
                });
            }
        }

        Ok(Message {
            magic: self.magic,
            command: self.command,
            payload_length: self.payload_length,
            checksum: self.checksum,
            payload,
        })
    }
}

impl Message {
    /// Serializes the message into a complete wire frame:
    /// magic, command, length and checksum (little-endian where numeric),
    /// followed by the raw payload.
    pub fn serialize(&self) -> Vec<u8> {
        let mut header = [0u8; HEADER_SIZE];
        LittleEndian::write_u32(&mut header[0..4], self.magic);
        header[4..16].copy_from_slice(&self.command.as_bytes());
        LittleEndian::write_u32(&mut header[16..20], self.payload_length);
        LittleEndian::write_u32(&mut header[20..24], self.checksum);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Parses exactly one frame, verifying its checksum.
    ///
    /// # Errors
    ///
    /// - [`WireError::MessageSize`] if `bytes` is shorter than the header, or
    ///   the bytes after the header are not exactly `payload_length` long.
    /// - [`WireError::Checksum`] if the declared checksum does not match the payload.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, WireError> {
        Self::deserialize_with(bytes, ChecksumPolicy::Verify)
    }

    /// Like [`Message::deserialize`], with an explicit checksum policy.
    pub fn deserialize_with(bytes: &[u8], policy: ChecksumPolicy) -> Result<Self, WireError> {
        let Some((header, payload)) = bytes.split_first_chunk::<HEADER_SIZE>() else {
            return Err(WireError::MessageSize {
                needed: HEADER_SIZE,
                got: bytes.len(),
            });
        };

        let header = Header::parse(header);
        let declared = header.payload_length as usize;
        if payload.len() != declared {
            return Err(WireError::MessageSize {
                needed: HEADER_SIZE + declared,
                got: bytes.len(),
            });
        }

        header.into_message(payload.to_vec(), policy)
    }
}

/// How frames are accepted off a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Frames carrying any other magic are rejected.
    pub magic: u32,
    pub checksum: ChecksumPolicy,
    /// Deadline for one whole frame. `None` waits forever.
    pub timeout: Option<Duration>,
}

/// Reads one Bitcoin P2P message frame from any [`AsyncRead`] source.
///
/// This function:
/// 1. Reads the 24-byte Bitcoin message header
/// 2. Rejects foreign magic and oversized length announcements
/// 3. Reads exactly `payload_length` payload bytes
/// 4. Applies the checksum policy
///
/// # Example
///
/// ```
/// use btc_handshake::config::ChecksumPolicy;
/// use btc_handshake::wire::{self, Command, Message, ReadOptions};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let frame = Message::new(0xDAB5BFFA, Command::Verack, vec![]).serialize();
/// let options = ReadOptions { magic: 0xDAB5BFFA, checksum: ChecksumPolicy::Verify, timeout: None };
///
/// let msg = wire::read_message(&mut frame.as_slice(), &options).await.unwrap();
/// assert_eq!(msg.command(), Command::Verack);
/// assert!(msg.payload().is_empty());
/// # }
/// ```
pub async fn read_message<R>(reader: &mut R, options: &ReadOptions) -> Result<Message, WireError>
where
    R: AsyncRead + Unpin,
{
    match options.timeout {
        Some(limit) => tokio::time::timeout(limit, read_frame(reader, options))
            .await
            .map_err(|_| WireError::Timeout(limit))?,
        None => read_frame(reader, options).await,
    }
}

async fn read_frame<R>(reader: &mut R, options: &ReadOptions) -> Result<Message, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    let header = Header::parse(&header);

    if header.magic != options.magic {
        return Err(WireError::UnexpectedMagic {
            expected: options.magic,
            got: header.magic,
        });
    }

    let length = header.payload_length as usize;
    if length > MAX_PAYLOAD_SIZE {
        return Err(WireError::PayloadTooLarge {
            length,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    header.into_message(payload, options.checksum)
}

/// Writes a complete Bitcoin P2P message frame to the given writer and flushes it.
///
/// # Errors
///
/// Returns an error if writing to the underlying stream fails.
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&msg.serialize()).await?;
    writer.flush().await?;
    Ok(())
}
