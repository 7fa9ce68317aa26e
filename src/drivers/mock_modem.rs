// 模拟 ML307R 模块（Demo 用）
//
// 行为脚本：应答上电初始化序列、接受 CIPSTART/CIPSEND/CIPCLOSE、
// 给出数据提示符，并把发送的载荷以 +RECEIVE 上报的形式回显，
// 让整条转发链路在没有真实硬件时也能跑通。
// 接入真实硬件时，用真实 UART 实现 ModemSerial 替换本驱动。
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt::Write as _;

use defmt::debug;
use embassy_time::{Duration, Timer};
use heapless::String;

use crate::at::session::MAX_AT_SESSIONS;
use crate::at::transport::ModemSerial;
use crate::error::Result;

/// 回显几次后模拟远端关闭，触发 CLOSED 上报路径
const CLOSE_AFTER_ECHOES: u8 = 3;

enum WriteMode {
    /// 正在接收命令行
    Command,
    /// CIPSEND 提示符之后，正在接收原始载荷
    Payload { session: u8, remaining: usize, data: Vec<u8> },
}

/// 模拟模块
pub struct MockModem {
    /// 等待被 read() 取走的响应字节
    pending: VecDeque<u8>,
    /// 正在累积的命令行
    command: Vec<u8>,
    mode: WriteMode,
    established: [bool; MAX_AT_SESSIONS as usize],
    echoes: [u8; MAX_AT_SESSIONS as usize],
}

impl MockModem {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            command: Vec::new(),
            mode: WriteMode::Command,
            established: [false; MAX_AT_SESSIONS as usize],
            echoes: [0; MAX_AT_SESSIONS as usize],
        }
    }

    fn reply(&mut self, text: &str) {
        self.pending.extend(text.as_bytes());
    }

    fn reply_bytes(&mut self, data: &[u8]) {
        self.pending.extend(data);
    }

    /// 处理写入的字节（命令行或载荷）
    fn handle_write(&mut self, data: &[u8]) {
        for &byte in data {
            match &mut self.mode {
                WriteMode::Command => {
                    self.command.push(byte);
                    if byte == b'\n' {
                        let line = core::mem::take(&mut self.command);
                        self.handle_command(&line);
                    }
                }
                WriteMode::Payload { remaining, data, .. } => {
                    data.push(byte);
                    *remaining -= 1;
                    if *remaining == 0 {
                        if let WriteMode::Payload { session, data, .. } =
                            core::mem::replace(&mut self.mode, WriteMode::Command)
                        {
                            self.complete_payload(session, data);
                        }
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, raw: &[u8]) {
        let Ok(text) = core::str::from_utf8(raw) else {
            self.reply("\r\nERROR\r\n");
            return;
        };
        let cmd = text.trim();
        debug!("MockModem << {=str}", cmd);

        if cmd == "AT" || cmd == "ATE0" {
            self.reply("\r\nOK\r\n");
        } else if cmd == "AT+CPIN?" {
            self.reply("\r\n+CPIN: READY\r\n\r\nOK\r\n");
        } else if cmd == "AT+CREG?" {
            self.reply("\r\n+CREG: 0,1\r\n\r\nOK\r\n");
        } else if cmd == "AT+CGREG?" {
            self.reply("\r\n+CGREG: 0,1\r\n\r\nOK\r\n");
        } else if cmd.starts_with("AT+CGDCONT") || cmd.starts_with("AT+CGATT") || cmd.starts_with("AT+CGACT") {
            self.reply("\r\nOK\r\n");
        } else if cmd == "AT+CGPADDR=1" {
            self.reply("\r\n+CGPADDR: 1,\"10.192.33.7\"\r\n\r\nOK\r\n");
        } else if let Some(rest) = cmd.strip_prefix("AT+CIPSTART=") {
            self.handle_open(rest);
        } else if let Some(rest) = cmd.strip_prefix("AT+CIPSEND=") {
            self.handle_send(rest);
        } else if let Some(rest) = cmd.strip_prefix("AT+CIPCLOSE=") {
            self.handle_close(rest);
        } else {
            self.reply("\r\nERROR\r\n");
        }
    }

    fn handle_open(&mut self, args: &str) {
        let Some(id) = parse_session(args.split(',').next()) else {
            self.reply("\r\nERROR\r\n");
            return;
        };

        let mut line: String<32> = String::new();
        if self.established[id as usize] {
            write!(line, "\r\n{}, ALREADY CONNECT\r\n", id).ok();
        } else {
            self.established[id as usize] = true;
            self.echoes[id as usize] = 0;
            write!(line, "\r\n{}, CONNECT OK\r\n", id).ok();
        }
        self.reply(&line);
    }

    fn handle_send(&mut self, args: &str) {
        let mut parts = args.split(',');
        let id = parse_session(parts.next());
        let len = parts.next().and_then(|s| s.trim().parse::<usize>().ok());

        match (id, len) {
            (Some(id), Some(len)) if self.established[id as usize] && len > 0 => {
                self.mode = WriteMode::Payload {
                    session: id,
                    remaining: len,
                    data: Vec::new(),
                };
                self.reply("\r\n> ");
            }
            _ => self.reply("\r\nERROR\r\n"),
        }
    }

    fn handle_close(&mut self, args: &str) {
        match parse_session(Some(args)) {
            Some(id) => {
                self.established[id as usize] = false;
                let mut line: String<32> = String::new();
                write!(line, "\r\n{}, CLOSE OK\r\n", id).ok();
                self.reply(&line);
            }
            None => self.reply("\r\nERROR\r\n"),
        }
    }

    /// 载荷接收完成：应答 SEND OK 并把数据回显为 +RECEIVE 上报
    fn complete_payload(&mut self, session: u8, data: Vec<u8>) {
        let mut line: String<48> = String::new();
        write!(line, "\r\n{}, SEND OK\r\n", session).ok();
        self.reply(&line);

        line.clear();
        write!(line, "+RECEIVE: {},{}\r\n", session, data.len()).ok();
        self.reply(&line);
        self.reply_bytes(&data);

        // 周期性模拟远端关闭
        self.echoes[session as usize] += 1;
        if self.echoes[session as usize] >= CLOSE_AFTER_ECHOES {
            self.established[session as usize] = false;
            self.echoes[session as usize] = 0;
            line.clear();
            write!(line, "\r\n{}, CLOSED\r\n", session).ok();
            self.reply(&line);
        }
    }
}

impl ModemSerial for MockModem {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.handle_write(data);
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if self.pending.is_empty() {
            Timer::after(timeout).await;
            if self.pending.is_empty() {
                return Ok(0);
            }
        }

        let mut n = 0;
        while n < buf.len() {
            match self.pending.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn flush_input(&mut self) {
        self.pending.clear();
    }
}

impl Default for MockModem {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_session(part: Option<&str>) -> Option<u8> {
    let id: u8 = part?.trim().parse().ok()?;
    (id < MAX_AT_SESSIONS).then_some(id)
}
