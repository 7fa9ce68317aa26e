// 模拟 WiFi 客户端（Demo 用）
//
// 轮流以几个虚拟客户端的身份生成合成 IPv4 帧，
// 驱动 NAT 建表与 AT 转发路径。帧构造函数同时供测试使用。
use alloc::vec::Vec;

use byteorder::{BigEndian, ByteOrder};

use crate::nat::Ipv4Addr;

/// 热点下的虚拟客户端地址
const CLIENTS: [Ipv4Addr; 3] = [
    Ipv4Addr::new(192, 168, 4, 100),
    Ipv4Addr::new(192, 168, 4, 101),
    Ipv4Addr::new(192, 168, 4, 102),
];

/// 虚拟目标服务器
const REMOTES: [(Ipv4Addr, u16); 2] = [
    (Ipv4Addr::new(93, 184, 216, 34), 80),
    (Ipv4Addr::new(8, 8, 8, 8), 53),
];

/// 模拟 WiFi 侧流量源
pub struct MockWifiClient {
    counter: u32,
}

impl MockWifiClient {
    pub fn new() -> Self {
        Self { counter: 0 }
    }

    /// 生成下一个合成帧（TCP/UDP 交替，客户端轮换）
    pub fn next_frame(&mut self) -> Vec<u8> {
        let n = self.counter;
        self.counter = self.counter.wrapping_add(1);

        let client = CLIENTS[(n as usize) % CLIENTS.len()];
        let client_port = 40000 + (n % 16) as u16;

        if n % 2 == 0 {
            let (remote, port) = REMOTES[0];
            build_ipv4_tcp(client, client_port, remote, port, b"GET / HTTP/1.1\r\n\r\n")
        } else {
            let (remote, port) = REMOTES[1];
            build_ipv4_udp(client, client_port, remote, port, b"\x12\x34\x01\x00query")
        }
    }
}

impl Default for MockWifiClient {
    fn default() -> Self {
        Self::new()
    }
}

/// 构造一个 IPv4+TCP 帧（无选项头部）
pub fn build_ipv4_tcp(
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let total = 20 + 20 + payload.len();
    let mut frame = Vec::with_capacity(total);

    push_ipv4_header(&mut frame, src, dst, 6, total);

    // TCP 头
    let mut tcp = [0u8; 20];
    BigEndian::write_u16(&mut tcp[0..2], src_port);
    BigEndian::write_u16(&mut tcp[2..4], dst_port);
    BigEndian::write_u32(&mut tcp[4..8], 0x1000); // seq
    tcp[12] = 5 << 4; // data offset
    tcp[13] = 0x18; // PSH|ACK
    BigEndian::write_u16(&mut tcp[14..16], 0xFFFF); // window
    frame.extend_from_slice(&tcp);

    frame.extend_from_slice(payload);
    frame
}

/// 构造一个 IPv4+UDP 帧
pub fn build_ipv4_udp(
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let total = 20 + 8 + payload.len();
    let mut frame = Vec::with_capacity(total);

    push_ipv4_header(&mut frame, src, dst, 17, total);

    let mut udp = [0u8; 8];
    BigEndian::write_u16(&mut udp[0..2], src_port);
    BigEndian::write_u16(&mut udp[2..4], dst_port);
    BigEndian::write_u16(&mut udp[4..6], (8 + payload.len()) as u16);
    frame.extend_from_slice(&udp);

    frame.extend_from_slice(payload);
    frame
}

fn push_ipv4_header(frame: &mut Vec<u8>, src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, total: usize) {
    let mut header = [0u8; 20];
    header[0] = 0x45; // version 4, IHL 5
    BigEndian::write_u16(&mut header[2..4], total as u16);
    header[8] = 64; // TTL
    header[9] = protocol;
    header[12..16].copy_from_slice(&src.0);
    header[16..20].copy_from_slice(&dst.0);

    let checksum = ip_checksum(&header);
    BigEndian::write_u16(&mut header[10..12], checksum);

    frame.extend_from_slice(&header);
}

/// 标准反码求和校验
fn ip_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in header.chunks(2) {
        let word = if chunk.len() == 2 {
            BigEndian::read_u16(chunk) as u32
        } else {
            (chunk[0] as u32) << 8
        };
        sum += word;
    }
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_verifies_to_zero() {
        let frame = build_ipv4_tcp(
            Ipv4Addr::new(192, 168, 4, 100),
            40000,
            Ipv4Addr::new(1, 2, 3, 4),
            80,
            b"abc",
        );
        // 含校验和字段的头部反码和应为 0
        assert_eq!(ip_checksum(&frame[..20]), 0);
    }

    #[test]
    fn frames_rotate_clients_and_protocols() {
        let mut wifi = MockWifiClient::new();
        let a = wifi.next_frame();
        let b = wifi.next_frame();

        assert_eq!(a[9], 6); // TCP
        assert_eq!(b[9], 17); // UDP
        assert_ne!(a[12..16], b[12..16]); // 不同客户端
    }

    #[test]
    fn total_length_matches_frame() {
        let frame = build_ipv4_udp(
            Ipv4Addr::new(192, 168, 4, 101),
            5353,
            Ipv4Addr::new(8, 8, 8, 8),
            53,
            b"query",
        );
        assert_eq!(BigEndian::read_u16(&frame[2..4]) as usize, frame.len());
    }
}
