// 流标识（5 元组）
use defmt::Format;

/// IPv4 地址（网络字节序）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Addr(pub [u8; 4]);

impl Ipv4Addr {
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self([a, b, c, d])
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl core::fmt::Display for Ipv4Addr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl Format for Ipv4Addr {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3]);
    }
}

/// 传输协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
#[repr(u8)]
pub enum Protocol {
    Tcp = 6,
    Udp = 17,
}

impl Protocol {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            6 => Some(Self::Tcp),
            17 => Some(Self::Udp),
            _ => None,
        }
    }

    /// AT+CIPSTART 的连接模式字符串
    pub fn at_mode(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

/// 流标识：客户端地址/端口 + 远端地址/端口 + 协议
///
/// 同一时刻每个 5 元组在 NAT 表中最多对应一条活跃记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct FlowKey {
    pub client: Ipv4Addr,
    pub client_port: u16,
    pub remote: Ipv4Addr,
    pub remote_port: u16,
    pub protocol: Protocol,
}
