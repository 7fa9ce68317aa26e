// 串口行重组
//
// 原始字节流按 CRLF 重组为行；遇到 "+RECEIVE: <id>,<len>" 头部后切换到
// 原始载荷模式，精确捕获 <len> 字节（载荷可以包含任意字节，不能按行切）。
// "> " 数据提示符没有行终止符，需要在缓冲尾部单独识别。
use alloc::vec::Vec;
use defmt::warn;
use heapless::String;

use super::response::parse_receive_header;
use super::session::SessionId;
use crate::nat::FLOW_BUFFER_SIZE;

/// 单个响应行的最大长度
pub const AT_LINE_MAX: usize = 128;

/// 行文本
pub type LineText = String<AT_LINE_MAX>;

/// 重组结果
#[derive(Debug)]
pub enum RxItem {
    /// 一个完整的文本行（已去掉 CRLF）
    Line(LineText),
    /// 一段会话载荷（来自 +RECEIVE 上报）
    Payload { session: SessionId, data: Vec<u8> },
    /// 超限或无法缓存的载荷：字节已消费但被丢弃
    PayloadDiscarded { session: SessionId, len: usize },
    /// 数据提示符 "> "
    Prompt,
}

enum Mode {
    /// 按行累积
    Line,
    /// 正在捕获 +RECEIVE 载荷
    Raw {
        session: SessionId,
        remaining: usize,
        total: usize,
        data: Vec<u8>,
        discard: bool,
    },
}

/// 行缓冲器
pub struct LineBuffer {
    line: heapless::Vec<u8, AT_LINE_MAX>,
    mode: Mode,
    /// 当前行超长，吞掉剩余字节直到行终止
    overflowed: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            line: heapless::Vec::new(),
            mode: Mode::Line,
            overflowed: false,
        }
    }

    /// 喂入一段串口数据，返回重组出的行/载荷/提示符
    pub fn feed(&mut self, input: &[u8]) -> Vec<RxItem> {
        let mut items = Vec::new();

        for &byte in input {
            match &mut self.mode {
                Mode::Raw {
                    remaining,
                    data,
                    discard,
                    ..
                } => {
                    if !*discard {
                        data.push(byte);
                    }
                    *remaining -= 1;

                    if *remaining == 0 {
                        if let Mode::Raw {
                            session,
                            total,
                            data,
                            discard,
                            ..
                        } = core::mem::replace(&mut self.mode, Mode::Line)
                        {
                            items.push(if discard {
                                RxItem::PayloadDiscarded { session, len: total }
                            } else {
                                RxItem::Payload { session, data }
                            });
                        }
                    }
                }

                Mode::Line => match byte {
                    b'\n' => {
                        if let Some(item) = self.complete_line() {
                            items.push(item);
                        }
                    }
                    _ => {
                        if !self.overflowed && self.line.push(byte).is_err() {
                            warn!("AT line exceeds {} bytes, dropping", AT_LINE_MAX);
                            self.line.clear();
                            self.overflowed = true;
                        }
                    }
                },
            }
        }

        // 提示符没有终止符，只能在缓冲尾部识别
        if matches!(self.mode, Mode::Line) {
            let pending = self.line.as_slice();
            if pending == b">" || pending == b"> " {
                self.line.clear();
                items.push(RxItem::Prompt);
            }
        }

        items
    }

    /// 行终止：去掉尾部 CR，分类为文本行或 +RECEIVE 头部
    fn complete_line(&mut self) -> Option<RxItem> {
        if self.overflowed {
            self.overflowed = false;
            self.line.clear();
            return None;
        }

        let mut bytes = self.line.as_slice();
        if let [head @ .., b'\r'] = bytes {
            bytes = head;
        }

        if bytes.is_empty() {
            self.line.clear();
            return None;
        }

        let item = match core::str::from_utf8(bytes) {
            Ok(text) => {
                if let Some((session, len)) = parse_receive_header(text) {
                    self.enter_raw(session, len)
                } else {
                    let mut line = LineText::new();
                    // 长度已受缓冲限制，push_str 不会失败
                    line.push_str(text).ok();
                    Some(RxItem::Line(line))
                }
            }
            Err(_) => {
                warn!("Non-UTF8 bytes in AT line, dropping");
                None
            }
        };

        self.line.clear();
        item
    }

    /// 进入载荷捕获模式；超限或无法预留缓冲时消费但丢弃
    fn enter_raw(&mut self, session: SessionId, len: usize) -> Option<RxItem> {
        if len == 0 {
            return Some(RxItem::Payload {
                session,
                data: Vec::new(),
            });
        }

        let mut data = Vec::new();
        let discard = len > FLOW_BUFFER_SIZE || data.try_reserve_exact(len).is_err();
        if discard {
            warn!("+RECEIVE payload of {} bytes cannot be buffered", len);
        }

        self.mode = Mode::Raw {
            session,
            remaining: len,
            total: len,
            data,
            discard,
        };
        None
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_of(items: &[RxItem]) -> Vec<&str> {
        items
            .iter()
            .filter_map(|item| match item {
                RxItem::Line(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn reassembles_crlf_lines() {
        let mut buf = LineBuffer::new();
        let items = buf.feed(b"\r\nOK\r\n+CPIN: READY\r\n");
        assert_eq!(lines_of(&items), ["OK", "+CPIN: READY"]);
    }

    #[test]
    fn handles_lines_split_across_reads() {
        let mut buf = LineBuffer::new();
        assert!(buf.feed(b"CONN").is_empty());
        assert!(buf.feed(b"ECT OK\r").is_empty());
        let items = buf.feed(b"\n");
        assert_eq!(lines_of(&items), ["CONNECT OK"]);
    }

    #[test]
    fn captures_receive_payload_exactly() {
        let mut buf = LineBuffer::new();
        let items = buf.feed(b"+RECEIVE: 2,5\r\nhello\r\nOK\r\n");

        assert_eq!(items.len(), 2);
        match &items[0] {
            RxItem::Payload { session, data } => {
                assert_eq!(*session, SessionId(2));
                assert_eq!(data.as_slice(), b"hello");
            }
            other => panic!("expected payload, got {:?}", other),
        }
        match &items[1] {
            RxItem::Line(text) => assert_eq!(text.as_str(), "OK"),
            other => panic!("expected line, got {:?}", other),
        }
    }

    #[test]
    fn payload_may_contain_line_terminators() {
        let mut buf = LineBuffer::new();
        let items = buf.feed(b"+RECEIVE: 0,4\r\n\r\nA\nX\r\n");

        match &items[0] {
            RxItem::Payload { data, .. } => assert_eq!(data.as_slice(), b"\r\nA\n"),
            other => panic!("expected payload, got {:?}", other),
        }
    }

    #[test]
    fn payload_split_across_reads() {
        let mut buf = LineBuffer::new();
        assert!(buf.feed(b"+RECEIVE: 1,6\r\nabc").is_empty());
        let items = buf.feed(b"def");
        match &items[0] {
            RxItem::Payload { session, data } => {
                assert_eq!(*session, SessionId(1));
                assert_eq!(data.as_slice(), b"abcdef");
            }
            other => panic!("expected payload, got {:?}", other),
        }
    }

    #[test]
    fn oversized_payload_is_consumed_and_discarded() {
        let mut buf = LineBuffer::new();
        let announce = alloc::format!("+RECEIVE: 3,{}\r\n", FLOW_BUFFER_SIZE + 1);
        assert!(buf.feed(announce.as_bytes()).is_empty());

        let chunk = alloc::vec![0u8; FLOW_BUFFER_SIZE + 1];
        let items = buf.feed(&chunk);
        match &items[0] {
            RxItem::PayloadDiscarded { session, len } => {
                assert_eq!(*session, SessionId(3));
                assert_eq!(*len, FLOW_BUFFER_SIZE + 1);
            }
            other => panic!("expected discarded payload, got {:?}", other),
        }

        // 后续行流未被破坏
        let items = buf.feed(b"OK\r\n");
        assert_eq!(lines_of(&items), ["OK"]);
    }

    #[test]
    fn detects_send_prompt_without_terminator() {
        let mut buf = LineBuffer::new();
        let items = buf.feed(b"\r\n> ");
        assert!(matches!(items.as_slice(), [RxItem::Prompt]));
    }

    #[test]
    fn overlong_line_is_dropped_not_split() {
        let mut buf = LineBuffer::new();
        let long = alloc::vec![b'x'; AT_LINE_MAX + 10];
        assert!(buf.feed(&long).is_empty());
        let items = buf.feed(b"\r\nOK\r\n");
        assert_eq!(lines_of(&items), ["OK"]);
    }
}
