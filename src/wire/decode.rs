use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::io::{self};
use std::net::{IpAddr, Ipv6Addr};

use crate::wire::message::{NetAddr, Services, VersionMessage};

/// Implemented by types that can be decoded from a raw Bitcoin message payload.
pub trait Decode: Sized {
    fn decode(payload: &[u8]) -> io::Result<Self>;
}

impl Decode for VersionMessage {
    fn decode(payload: &[u8]) -> io::Result<Self> {
        let mut c = 0;

        let version = read_i32(payload, &mut c)?;
        let services = Services::from(read_u64(payload, &mut c)?);
        let timestamp = read_i64(payload, &mut c)?;
        let addr_recv = decode_net_addr(payload, &mut c)?;
        let addr_from = decode_net_addr(payload, &mut c)?;
        let nonce = read_u64(payload, &mut c)?;

        let ua_len = read_varint(payload, &mut c)? as usize;
        let user_agent = std::str::from_utf8(
            payload
                .get(c..c.saturating_add(ua_len))
                .ok_or_else(|| eof("version: user_agent"))?,
        )
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        .to_string();
        c += ua_len;

        let start_height = read_i32(payload, &mut c)?;
        let relay = payload.get(c).map(|&b| b != 0);

        Ok(VersionMessage {
            version,
            services,
            timestamp,
            addr_recv,
            addr_from,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }
}

/// IPv4-mapped addresses (`::ffff:a.b.c.d`) come back as IPv4, everything
/// else as IPv6.
fn decode_net_addr(p: &[u8], c: &mut usize) -> io::Result<NetAddr> {
    let services = Services::from(read_u64(p, c)?);
    let ip = Ipv6Addr::from(take::<16>(p, c, "net_addr: ip")?);
    let port = BigEndian::read_u16(&take::<2>(p, c, "net_addr: port")?);

    let ip = match ip.to_ipv4_mapped() {
        Some(v4) => IpAddr::V4(v4),
        None => IpAddr::V6(ip),
    };

    Ok(NetAddr { services, ip, port })
}

fn eof(context: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, context)
}

fn read_varint(p: &[u8], c: &mut usize) -> io::Result<u64> {
    let [first] = take::<1>(p, c, "varint")?;
    match first {
        0xFD => Ok(LittleEndian::read_u16(&take::<2>(p, c, "varint:fd")?) as u64),
        0xFE => Ok(LittleEndian::read_u32(&take::<4>(p, c, "varint:fe")?) as u64),
        0xFF => Ok(LittleEndian::read_u64(&take::<8>(p, c, "varint:ff")?)),
        n => Ok(n as u64),
    }
}

fn read_i32(p: &[u8], c: &mut usize) -> io::Result<i32> {
    Ok(LittleEndian::read_i32(&take::<4>(p, c, "i32")?))
}
fn read_i64(p: &[u8], c: &mut usize) -> io::Result<i64> {
    Ok(LittleEndian::read_i64(&take::<8>(p, c, "i64")?))
}
fn read_u64(p: &[u8], c: &mut usize) -> io::Result<u64> {
    Ok(LittleEndian::read_u64(&take::<8>(p, c, "u64")?))
}

fn take<const N: usize>(p: &[u8], c: &mut usize, ctx: &'static str) -> io::Result<[u8; N]> {
    let bytes = p
        .get(*c..)
        .and_then(|rest| rest.first_chunk::<N>())
        .ok_or_else(|| eof(ctx))?;
    *c += N;
    Ok(*bytes)
}
