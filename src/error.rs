// 错误定义
use defmt::Format;

/// 结果类型
pub type Result<T> = core::result::Result<T, Error>;

/// 错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum Error {
    /// NAT 表已满
    TableFull,
    /// 流缓冲区分配失败
    AllocFailed,
    /// 载荷超过流缓冲区容量
    Oversize,
    /// 命令或行被截断
    Truncated,
    /// 数据包解析失败
    BadPacket,
    /// 不支持的传输协议
    UnsupportedProtocol,
    /// 模块返回错误或未识别的响应
    ModemError,
    /// 超时
    Timeout,
}
