// 数据包描述符
use alloc::vec::Vec;

use crate::nat::FlowKey;

/// 一个独立所有权的转发工作单元：载荷 + 所属流
///
/// 描述符整体通过通道移动所有权，持有方丢弃即释放载荷，
/// 不存在生产方/消费方之间的释放约定问题
#[derive(Debug, Clone)]
pub struct PacketBuf {
    pub key: FlowKey,
    pub payload: Vec<u8>,
}
