// AT 命令传输（超时窗口式）
//
// 模块上电初始化阶段独占串口，按原始的"发命令、开窗口收响应"方式交互，
// 调用方对响应文本做固定子串匹配（"OK"、"READY" 等）。运行期的数据路径
// 不用这条通道，改走 line.rs 的行重组 + 分类（见 tasks/modem_task.rs）。
use defmt::debug;
use embassy_time::{Duration, Instant, Timer};
use heapless::String;

use crate::error::{Error, Result};

/// 响应窗口缓冲区大小
pub const RESPONSE_MAX: usize = 512;

/// 响应文本
pub type ResponseText = String<RESPONSE_MAX>;

/// 模块串口抽象：真实 UART 与 mock 驱动共用的接口
#[allow(async_fn_in_trait)]
pub trait ModemSerial {
    /// 写出全部字节
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// 有界等待读取；窗口内无数据返回 0
    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// 丢弃接收缓冲中的陈旧数据
    fn flush_input(&mut self);
}

/// 发送一条命令并捕获超时窗口内到达的响应
///
/// 不区分超时、无响应与硬件错误：无数据时返回空文本，
/// 调用方以"未匹配到成功子串"统一判定失败
pub async fn exchange<S: ModemSerial>(
    serial: &mut S,
    command: &str,
    timeout: Duration,
) -> Result<ResponseText> {
    serial.flush_input();
    serial.write(command.as_bytes()).await?;

    let mut buf = [0u8; RESPONSE_MAX];
    let n = serial.read(&mut buf, timeout).await?;

    let text = to_text(&buf[..n]);
    debug!("AT exchange: {=str} -> {} bytes", command.trim_end(), n);
    Ok(text)
}

/// 轮询读取直到出现期望子串、出现 "ERROR" 或超时
pub async fn wait_for<S: ModemSerial>(
    serial: &mut S,
    expected: &str,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; RESPONSE_MAX];

    while Instant::now() < deadline {
        let n = serial.read(&mut buf, Duration::from_millis(100)).await?;
        if n > 0 {
            let text = to_text(&buf[..n]);
            if text.contains(expected) {
                return Ok(());
            }
            if text.contains("ERROR") {
                return Err(Error::ModemError);
            }
        }
        Timer::after(Duration::from_millis(10)).await;
    }

    Err(Error::Timeout)
}

/// 原始字节转文本，非 ASCII 字节丢弃
fn to_text(bytes: &[u8]) -> ResponseText {
    let mut text = ResponseText::new();
    for &byte in bytes {
        if byte.is_ascii() {
            // 缓冲与窗口等大，push 不会失败
            text.push(byte as char).ok();
        }
    }
    text
}
