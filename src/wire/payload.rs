use crate::config::ClientConfig;
use crate::wire::constants::VERSION_PAYLOAD_SIZE;
use crate::wire::message::{Command, Message, Services};
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use rand::Rng;
use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

/// Builds a `version` message payload as defined by the Bitcoin P2P protocol.
///
/// The payload layout is:
///
/// ```text
/// int32    version
/// uint64   services
/// int64    timestamp
/// net_addr addr_recv   (services LE, 16-byte IP and port in network order)
/// net_addr addr_from   (26 zero bytes, ignored by peers)
/// uint64   nonce
/// var_str  user_agent  (empty => CompactSize 0)
/// int32    start_height
/// bool     relay
/// ```
///
/// IPv4 receivers are written as IPv4-mapped IPv6 (`::ffff:a.b.c.d`).
///
/// https://developer.bitcoin.org/reference/p2p_networking.html#version
pub fn build_version_payload(
    protocol_version: i32,
    services: Services,
    destination: SocketAddr,
    timestamp: i64,
    nonce: u64,
) -> io::Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(VERSION_PAYLOAD_SIZE);

    payload.write_i32::<LittleEndian>(protocol_version)?;
    payload.write_u64::<LittleEndian>(services.bits())?;
    payload.write_i64::<LittleEndian>(timestamp)?;

    // addr_recv
    payload.write_u64::<LittleEndian>(services.bits())?;
    payload.write_all(&ipv6_octets(destination.ip()))?;
    payload.write_u16::<BigEndian>(destination.port())?;

    // addr_from
    payload.write_all(&[0u8; 26])?;

    payload.write_u64::<LittleEndian>(nonce)?;

    payload.write_u8(0)?; // user agent
    payload.write_i32::<LittleEndian>(0)?; // start_height
    payload.write_u8(0)?; // relay = false

    Ok(payload)
}

/// Builds the `version` message that opens a handshake with `destination`,
/// stamped with the current time and a random nonce.
pub fn build_version_message(config: &ClientConfig, destination: SocketAddr) -> io::Result<Message> {
    let nonce: u64 = rand::thread_rng().r#gen();
    let payload = build_version_payload(
        config.protocol_version,
        config.services,
        destination,
        unix_timestamp(),
        nonce,
    )?;

    Ok(Message::new(config.magic(), Command::Version, payload))
}

fn ipv6_octets(ip: IpAddr) -> [u8; 16] {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

/// Seconds since the UNIX epoch; a clock set before 1970 reports 0.
fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Decode;
    use crate::wire::message::VersionMessage;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn regtest_peer() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 18444))
    }

    #[test]
    fn version_payload_is_byte_exact() {
        let payload = build_version_payload(
            70016,
            Services::NODE_NETWORK,
            regtest_peer(),
            1_700_000_000,
            0x1122334455667788,
        )
        .unwrap();

        assert_eq!(payload.len(), VERSION_PAYLOAD_SIZE);
        assert_eq!(payload[0..4], 70016i32.to_le_bytes());
        assert_eq!(payload[4..12], 1u64.to_le_bytes());
        assert_eq!(payload[12..20], 1_700_000_000i64.to_le_bytes());
        assert_eq!(payload[20..28], 1u64.to_le_bytes());
        assert_eq!(
            payload[28..44],
            [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, 127, 0, 0, 1]
        );
        assert_eq!(payload[44..46], [0x48, 0x0C]); // 18444 big-endian
        assert_eq!(payload[46..72], [0u8; 26]);
        assert_eq!(payload[72..80], 0x1122334455667788u64.to_le_bytes());
        assert_eq!(payload[80], 0);
        assert_eq!(payload[81..85], [0u8; 4]);
        assert_eq!(payload[85], 0);
    }

    #[test]
    fn version_payload_keeps_ipv6_receivers_verbatim() {
        let ip = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
        let payload = build_version_payload(70016, Services::NONE, SocketAddr::from((ip, 8333)), 0, 0).unwrap();

        assert_eq!(payload[28..44], ip.octets());
        assert_eq!(payload[44..46], 8333u16.to_be_bytes());
    }

    #[test]
    fn version_message_decodes_back() {
        let config = ClientConfig::default();
        let msg = build_version_message(&config, regtest_peer()).unwrap();

        assert_eq!(msg.command(), Command::Version);
        assert_eq!(msg.magic(), config.magic());
        assert_eq!(msg.payload_length() as usize, VERSION_PAYLOAD_SIZE);

        let version = VersionMessage::decode(msg.payload()).unwrap();
        assert_eq!(version.version, config.protocol_version);
        assert_eq!(version.services, config.services);
        assert_eq!(version.addr_recv.ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(version.addr_recv.port, 18444);
        assert!(version.user_agent.is_empty());
        assert_eq!(version.start_height, 0);
        assert_eq!(version.relay, Some(false));
        assert!(version.timestamp > 0);
    }

    #[test]
    fn version_messages_carry_fresh_nonces() {
        let config = ClientConfig::default();
        let a = VersionMessage::decode(build_version_message(&config, regtest_peer()).unwrap().payload()).unwrap();
        let b = VersionMessage::decode(build_version_message(&config, regtest_peer()).unwrap().payload()).unwrap();

        assert_ne!(a.nonce, b.nonce);
    }
}
