// AT 命令请求/响应关联
//
// 串口接收方向由 modem 任务独占（它要持续解复用 URC），命令方通过
// 通道写出命令行，再从响应通道收集行文本直到最终结果码或超时。
// 返回收集到的全部文本，调用方按固定子串匹配判定成败（与原始
// 超时窗口式传输保持同一契约）。
use alloc::vec::Vec;
use defmt::warn;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_time::{with_timeout, Duration, Instant};
use heapless::String;

use super::command::CommandLine;
use crate::error::{Error, Result};
use crate::event::{
    AtResponse, ModemCommand, COMMAND_CHANNEL_SIZE, RESPONSE_CHANNEL_SIZE,
};

/// 收集缓冲上限
pub const COLLECTED_MAX: usize = 256;

/// 一次命令交互收集到的响应文本
pub type Collected = String<COLLECTED_MAX>;

/// AT 命令客户端
pub struct AtClient {
    commands: Sender<'static, CriticalSectionRawMutex, ModemCommand, COMMAND_CHANNEL_SIZE>,
    responses: Receiver<'static, CriticalSectionRawMutex, AtResponse, RESPONSE_CHANNEL_SIZE>,
}

impl AtClient {
    pub fn new(
        commands: Sender<'static, CriticalSectionRawMutex, ModemCommand, COMMAND_CHANNEL_SIZE>,
        responses: Receiver<'static, CriticalSectionRawMutex, AtResponse, RESPONSE_CHANNEL_SIZE>,
    ) -> Self {
        Self { commands, responses }
    }

    /// 发送命令行并收集响应直到最终结果码或超时
    pub async fn request(&self, line: CommandLine, timeout: Duration) -> Collected {
        self.drain_stale();
        self.commands.send(ModemCommand::Line(line)).await;
        self.collect(timeout).await
    }

    /// 发送命令行并等待数据提示符 "> "
    pub async fn request_prompt(&self, line: CommandLine, timeout: Duration) -> Result<()> {
        self.drain_stale();
        self.commands.send(ModemCommand::Line(line)).await;

        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            match with_timeout(deadline - now, self.responses.receive()).await {
                Ok(AtResponse::Prompt) => return Ok(()),
                Ok(AtResponse::Final(line)) => {
                    warn!("Expected prompt, got final: {=str}", line.as_str());
                    return Err(Error::ModemError);
                }
                Ok(AtResponse::Line(_)) => continue,
                Err(_) => return Err(Error::Timeout),
            }
        }
    }

    /// 写出原始载荷并收集发送结果
    pub async fn send_raw(&self, data: Vec<u8>, timeout: Duration) -> Collected {
        self.commands.send(ModemCommand::Raw(data)).await;
        self.collect(timeout).await
    }

    /// 丢弃上一次交互残留的响应
    fn drain_stale(&self) {
        while self.responses.try_receive().is_ok() {}
    }

    /// 收集响应行；超时返回已收到的内容，由调用方判定
    async fn collect(&self, timeout: Duration) -> Collected {
        let mut text = Collected::new();
        let deadline = Instant::now() + timeout;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return text;
            }
            match with_timeout(deadline - now, self.responses.receive()).await {
                Ok(AtResponse::Final(line)) => {
                    append(&mut text, &line);
                    return text;
                }
                Ok(AtResponse::Line(line)) => append(&mut text, &line),
                // 迟到的提示符对收集路径无意义
                Ok(AtResponse::Prompt) => continue,
                Err(_) => return text,
            }
        }
    }
}

fn append(text: &mut Collected, line: &str) {
    if !text.is_empty() {
        text.push('\n').ok();
    }
    if text.push_str(line).is_err() {
        warn!("AT response text truncated at {} bytes", COLLECTED_MAX);
    }
}
