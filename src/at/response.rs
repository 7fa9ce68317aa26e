// AT 响应行分类
//
// AT 模块在同一串口上交错输出命令回显、最终结果码和主动上报（URC），
// 且没有按会话的强制成帧。行重组（line.rs）之后由这里逐行分类，
// 再按行中携带的会话 ID 分发。
use defmt::Format;

use super::session::SessionId;

/// 行分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum AtLine {
    /// 命令回显（ATE0 前模块会回显命令本身）
    Echo,
    /// 最终结果码，结束一次命令交互
    Final,
    /// 主动上报：会话被远端/模块关闭
    UrcClosed(SessionId),
    /// 信息行（命令结果前的中间输出）
    Info,
}

/// 对一个完整的响应行做分类
pub fn classify(line: &str) -> AtLine {
    let line = line.trim();

    if line.starts_with("AT") {
        return AtLine::Echo;
    }

    if let Some(session) = parse_closed(line) {
        return AtLine::UrcClosed(session);
    }

    if is_final(line) {
        return AtLine::Final;
    }

    AtLine::Info
}

/// 最终结果码集合（多会话模式下带 "<id>, " 前缀）
fn is_final(line: &str) -> bool {
    line == "OK"
        || line == "ERROR"
        || line.starts_with("+CME ERROR")
        || line.ends_with("CONNECT OK")
        || line.ends_with("CONNECT FAIL")
        || line.ends_with("ALREADY CONNECT")
        || line.ends_with("SEND OK")
        || line.ends_with("SEND FAIL")
        || line.ends_with("CLOSE OK")
}

/// 解析数据上报头："+RECEIVE: <id>,<len>"，其后紧跟 <len> 字节原始载荷
pub fn parse_receive_header(line: &str) -> Option<(SessionId, usize)> {
    let rest = line.trim().strip_prefix("+RECEIVE:")?.trim_start();
    let (id_text, len_text) = rest.split_once(',')?;

    let id: u8 = id_text.trim().parse().ok()?;
    let len: usize = len_text.trim().parse().ok()?;

    Some((SessionId(id), len))
}

/// 解析会话关闭上报："<id>, CLOSED"
fn parse_closed(line: &str) -> Option<SessionId> {
    let id_text = line.strip_suffix("CLOSED")?.trim_end().strip_suffix(',')?;
    let id: u8 = id_text.trim().parse().ok()?;
    Some(SessionId(id))
}
