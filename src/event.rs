// 任务间消息定义
//
// 两条长驻数据路径任务只通过这些有界通道交换数据：
// - frames:   WiFi 侧 -> intake（原始 IP 帧）
// - events:   modem 任务/清扫定时器 -> intake（入站载荷、会话关闭、清扫节拍）
// - commands: intake -> modem 任务（AT 命令行与原始载荷写出）
// - responses: modem 任务 -> AT client（分类后的响应行）
// - outbound: intake -> WiFi 发送侧（回注给客户端的载荷）
//
// NAT 表只属于 intake 任务；modem 侧对表的一切影响都走 events 通道，
// 消除原始设计里跨任务直接共享表的竞态。
use alloc::vec::Vec;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::at::command::CommandLine;
use crate::at::line::LineText;
use crate::at::session::SessionId;
use crate::relay::packet::PacketBuf;

/// 通道容量
pub const FRAME_CHANNEL_SIZE: usize = 32;
pub const OUTBOUND_CHANNEL_SIZE: usize = 32;
pub const MODEM_EVENT_CHANNEL_SIZE: usize = 16;
pub const COMMAND_CHANNEL_SIZE: usize = 4;
pub const RESPONSE_CHANNEL_SIZE: usize = 8;

/// 模块侧事件（modem 任务 / 清扫定时器 -> intake 任务）
#[derive(Debug)]
pub enum ModemEvent {
    /// 某会话收到入站载荷
    Inbound { session: SessionId, payload: Vec<u8> },
    /// 模块上报会话已关闭
    SessionClosed(SessionId),
    /// 周期清扫节拍
    SweepTick,
}

/// 发往模块的写请求（intake 任务 -> modem 任务）
#[derive(Debug)]
pub enum ModemCommand {
    /// 一条完整的 AT 命令行
    Line(CommandLine),
    /// 数据提示符后的原始载荷
    Raw(Vec<u8>),
}

/// 分类后的响应（modem 任务 -> AT client）
#[derive(Debug)]
pub enum AtResponse {
    /// 信息行
    Line(LineText),
    /// 最终结果码
    Final(LineText),
    /// 数据提示符 "> "
    Prompt,
}

pub type FrameChannel = Channel<CriticalSectionRawMutex, Vec<u8>, FRAME_CHANNEL_SIZE>;
pub type OutboundChannel = Channel<CriticalSectionRawMutex, PacketBuf, OUTBOUND_CHANNEL_SIZE>;
pub type ModemEventChannel = Channel<CriticalSectionRawMutex, ModemEvent, MODEM_EVENT_CHANNEL_SIZE>;
pub type CommandChannel = Channel<CriticalSectionRawMutex, ModemCommand, COMMAND_CHANNEL_SIZE>;
pub type ResponseChannel = Channel<CriticalSectionRawMutex, AtResponse, RESPONSE_CHANNEL_SIZE>;
