pub mod engine;
pub mod ipv4;
pub mod packet;

// 重新导出常用类型
pub use engine::RelayEngine;
pub use packet::PacketBuf;
