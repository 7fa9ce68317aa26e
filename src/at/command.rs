// AT 命令构造
//
// 所有命令写入有界缓冲区，放不下即报 Truncated，不做静默截断
use core::fmt::Write;

use heapless::String;

use super::session::SessionId;
use crate::error::{Error, Result};
use crate::nat::FlowKey;

/// 单条 AT 命令的最大长度
pub const AT_COMMAND_MAX: usize = 64;

/// 命令行（含 CRLF 终止符）
pub type CommandLine = String<AT_COMMAND_MAX>;

/// 建立到远端的 socket 会话：AT+CIPSTART=<id>,"<TCP|UDP>","<ip>",<port>
pub fn open_session(session: SessionId, key: &FlowKey) -> Result<CommandLine> {
    let mut line = CommandLine::new();
    write!(
        line,
        "AT+CIPSTART={},\"{}\",\"{}\",{}\r\n",
        session.0,
        key.protocol.at_mode(),
        key.remote,
        key.remote_port
    )
    .map_err(|_| Error::Truncated)?;
    Ok(line)
}

/// 声明即将发送的载荷长度：AT+CIPSEND=<id>,<len>
///
/// 模块以 "> " 提示符应答后再写入原始载荷
pub fn send_payload(session: SessionId, len: usize) -> Result<CommandLine> {
    let mut line = CommandLine::new();
    write!(line, "AT+CIPSEND={},{}\r\n", session.0, len).map_err(|_| Error::Truncated)?;
    Ok(line)
}

/// 关闭会话：AT+CIPCLOSE=<id>
pub fn close_session(session: SessionId) -> Result<CommandLine> {
    let mut line = CommandLine::new();
    write!(line, "AT+CIPCLOSE={}\r\n", session.0).map_err(|_| Error::Truncated)?;
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nat::{Ipv4Addr, Protocol};

    fn key(protocol: Protocol) -> FlowKey {
        FlowKey {
            client: Ipv4Addr::new(192, 168, 4, 100),
            client_port: 40123,
            remote: Ipv4Addr::new(93, 184, 216, 34),
            remote_port: 443,
            protocol,
        }
    }

    #[test]
    fn open_session_formats_cipstart() {
        let line = open_session(SessionId(3), &key(Protocol::Tcp)).unwrap();
        assert_eq!(line.as_str(), "AT+CIPSTART=3,\"TCP\",\"93.184.216.34\",443\r\n");

        let line = open_session(SessionId(0), &key(Protocol::Udp)).unwrap();
        assert_eq!(line.as_str(), "AT+CIPSTART=0,\"UDP\",\"93.184.216.34\",443\r\n");
    }

    #[test]
    fn open_session_fits_worst_case() {
        let worst = FlowKey {
            client: Ipv4Addr::new(255, 255, 255, 255),
            client_port: 65535,
            remote: Ipv4Addr::new(255, 255, 255, 255),
            remote_port: 65535,
            protocol: Protocol::Tcp,
        };
        assert!(open_session(SessionId(7), &worst).is_ok());
    }

    #[test]
    fn send_and_close_format() {
        assert_eq!(
            send_payload(SessionId(2), 1460).unwrap().as_str(),
            "AT+CIPSEND=2,1460\r\n"
        );
        assert_eq!(close_session(SessionId(5)).unwrap().as_str(), "AT+CIPCLOSE=5\r\n");
    }
}
