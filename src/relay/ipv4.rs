// IPv4 帧解析
//
// 从 WiFi 侧收到的原始 IP 帧里提取 5 元组与传输层载荷。
// 只处理 TCP/UDP；校验和由链路硬件保证，这里不重复验证。
use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::nat::{FlowKey, Ipv4Addr, Protocol};

/// IPv4 固定头部长度
const IPV4_MIN_HEADER: usize = 20;
/// TCP 固定头部长度
const TCP_MIN_HEADER: usize = 20;
/// UDP 头部长度
const UDP_HEADER: usize = 8;

/// 解析结果：流标识 + 指向帧内的传输层载荷
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedPacket<'a> {
    pub key: FlowKey,
    pub payload: &'a [u8],
}

/// 解析一个 IPv4 帧
pub fn parse(frame: &[u8]) -> Result<ParsedPacket<'_>> {
    if frame.len() < IPV4_MIN_HEADER {
        return Err(Error::BadPacket);
    }

    let version = frame[0] >> 4;
    if version != 4 {
        return Err(Error::BadPacket);
    }

    let header_len = ((frame[0] & 0x0F) as usize) * 4;
    if header_len < IPV4_MIN_HEADER || frame.len() < header_len {
        return Err(Error::BadPacket);
    }

    let total_len = BigEndian::read_u16(&frame[2..4]) as usize;
    if total_len < header_len || total_len > frame.len() {
        return Err(Error::BadPacket);
    }

    let protocol = Protocol::from_u8(frame[9]).ok_or(Error::UnsupportedProtocol)?;
    let client = Ipv4Addr::from_slice(&frame[12..16]);
    let remote = Ipv4Addr::from_slice(&frame[16..20]);

    let transport = &frame[header_len..total_len];
    let (client_port, remote_port, payload) = match protocol {
        Protocol::Tcp => parse_tcp(transport)?,
        Protocol::Udp => parse_udp(transport)?,
    };

    Ok(ParsedPacket {
        key: FlowKey {
            client,
            client_port,
            remote,
            remote_port,
            protocol,
        },
        payload,
    })
}

fn parse_tcp(transport: &[u8]) -> Result<(u16, u16, &[u8])> {
    if transport.len() < TCP_MIN_HEADER {
        return Err(Error::BadPacket);
    }

    let src_port = BigEndian::read_u16(&transport[0..2]);
    let dst_port = BigEndian::read_u16(&transport[2..4]);

    let data_offset = ((transport[12] >> 4) as usize) * 4;
    if data_offset < TCP_MIN_HEADER || transport.len() < data_offset {
        return Err(Error::BadPacket);
    }

    Ok((src_port, dst_port, &transport[data_offset..]))
}

fn parse_udp(transport: &[u8]) -> Result<(u16, u16, &[u8])> {
    if transport.len() < UDP_HEADER {
        return Err(Error::BadPacket);
    }

    let src_port = BigEndian::read_u16(&transport[0..2]);
    let dst_port = BigEndian::read_u16(&transport[2..4]);

    let udp_len = BigEndian::read_u16(&transport[4..6]) as usize;
    if udp_len < UDP_HEADER || udp_len > transport.len() {
        return Err(Error::BadPacket);
    }

    Ok((src_port, dst_port, &transport[UDP_HEADER..udp_len]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock_wifi::{build_ipv4_tcp, build_ipv4_udp};

    const CLIENT: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 100);
    const REMOTE: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);

    #[test]
    fn parses_tcp_frame() {
        let frame = build_ipv4_tcp(CLIENT, 40123, REMOTE, 80, b"GET / HTTP/1.1\r\n\r\n");
        let parsed = parse(&frame).unwrap();

        assert_eq!(parsed.key.client, CLIENT);
        assert_eq!(parsed.key.client_port, 40123);
        assert_eq!(parsed.key.remote, REMOTE);
        assert_eq!(parsed.key.remote_port, 80);
        assert_eq!(parsed.key.protocol, Protocol::Tcp);
        assert_eq!(parsed.payload, b"GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn parses_udp_frame() {
        let frame = build_ipv4_udp(CLIENT, 5353, REMOTE, 53, b"\x12\x34query");
        let parsed = parse(&frame).unwrap();

        assert_eq!(parsed.key.protocol, Protocol::Udp);
        assert_eq!(parsed.key.client_port, 5353);
        assert_eq!(parsed.key.remote_port, 53);
        assert_eq!(parsed.payload, b"\x12\x34query");
    }

    #[test]
    fn rejects_short_frame() {
        assert_eq!(parse(&[0x45, 0x00, 0x00]), Err(Error::BadPacket));
    }

    #[test]
    fn rejects_non_ipv4() {
        let mut frame = build_ipv4_tcp(CLIENT, 1, REMOTE, 2, b"x");
        frame[0] = 0x65; // version 6
        assert_eq!(parse(&frame), Err(Error::BadPacket));
    }

    #[test]
    fn rejects_unsupported_protocol() {
        let mut frame = build_ipv4_tcp(CLIENT, 1, REMOTE, 2, b"x");
        frame[9] = 1; // ICMP
        assert_eq!(parse(&frame), Err(Error::UnsupportedProtocol));
    }

    #[test]
    fn rejects_truncated_total_length() {
        let mut frame = build_ipv4_tcp(CLIENT, 1, REMOTE, 2, b"payload");
        // 声称比实际更长
        let bogus = (frame.len() + 4) as u16;
        frame[2] = (bogus >> 8) as u8;
        frame[3] = bogus as u8;
        assert_eq!(parse(&frame), Err(Error::BadPacket));
    }

    #[test]
    fn rejects_bad_tcp_data_offset() {
        let mut frame = build_ipv4_tcp(CLIENT, 1, REMOTE, 2, b"");
        frame[20 + 12] = 0xF0; // data offset 60 > 段长
        assert_eq!(parse(&frame), Err(Error::BadPacket));
    }

    #[test]
    fn empty_tcp_payload_is_valid() {
        let frame = build_ipv4_tcp(CLIENT, 1, REMOTE, 2, b"");
        let parsed = parse(&frame).unwrap();
        assert!(parsed.payload.is_empty());
    }
}
