// NAT 连接表
//
// 固定容量的流记录表，按 5 元组线性查找。表只被 intake 任务持有，
// 其他任务通过消息通道请求变更（单一所有者，见 relay/engine.rs）。
use alloc::vec::Vec;
use defmt::{info, warn};
use embassy_time::{Duration, Instant};

use super::flow::FlowKey;
use crate::at::session::SessionId;
use crate::error::{Error, Result};

/// NAT 表容量（进程启动时固定，满即拒绝，不做按需淘汰）
pub const MAX_NAT_CONNECTIONS: usize = 32;

/// 每条流的缓冲区容量（创建时一次性预留，之后不再扩容）
pub const FLOW_BUFFER_SIZE: usize = 2048;

/// 空闲流超时：超过该时长未活动的记录由周期清扫回收
pub const FLOW_TIMEOUT: Duration = Duration::from_secs(300);

/// NAT 连接记录
pub struct NatRecord {
    key: FlowKey,
    session: Option<SessionId>,
    last_activity: Instant,
    buffer: Vec<u8>,
}

impl NatRecord {
    fn new(key: FlowKey, now: Instant) -> Result<Self> {
        // 先预留缓冲区，失败时记录不会进入表中（槽位保持空闲）
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(FLOW_BUFFER_SIZE)
            .map_err(|_| Error::AllocFailed)?;

        Ok(Self {
            key,
            session: None,
            last_activity: now,
            buffer,
        })
    }

    pub fn key(&self) -> &FlowKey {
        &self.key
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn bind_session(&mut self, session: SessionId) {
        self.session = Some(session);
    }

    /// 建立失败后回到未分配状态
    pub fn clear_session(&mut self) {
        self.session = None;
    }

    /// 刷新活动时间戳（只向前推进）
    pub fn touch(&mut self, now: Instant) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// 缓存一个出站载荷，超过容量返回 Oversize
    pub fn store_payload(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > FLOW_BUFFER_SIZE {
            return Err(Error::Oversize);
        }
        self.buffer.clear();
        self.buffer.extend_from_slice(payload);
        Ok(())
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }
}

/// NAT 连接表
pub struct NatTable {
    slots: [Option<NatRecord>; MAX_NAT_CONNECTIONS],
}

impl NatTable {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// 按 5 元组查找活跃记录
    pub fn find(&mut self, key: &FlowKey) -> Option<&mut NatRecord> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.as_mut())
            .find(|rec| rec.key == *key)
    }

    /// 在第一个空闲槽位创建新记录
    ///
    /// 表满返回 TableFull，缓冲区预留失败返回 AllocFailed；
    /// 两种失败都不会改动任何已有记录
    pub fn create(&mut self, key: FlowKey, now: Instant) -> Result<&mut NatRecord> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or_else(|| {
                warn!("NAT table full ({} entries)", MAX_NAT_CONNECTIONS);
                Error::TableFull
            })?;

        let record = NatRecord::new(key, now)?;
        info!(
            "Created NAT connection: {}:{} -> {}:{} ({})",
            key.client, key.client_port, key.remote, key.remote_port, key.protocol
        );

        Ok(self.slots[index].insert(record))
    }

    /// 按模块会话 ID 查找（入站数据解复用路径）
    pub fn find_by_session(&mut self, session: SessionId) -> Option<&mut NatRecord> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.as_mut())
            .find(|rec| rec.session == Some(session))
    }

    /// 显式关闭：释放绑定到该会话的记录
    pub fn remove_by_session(&mut self, session: SessionId) -> bool {
        for slot in self.slots.iter_mut() {
            if let Some(rec) = slot {
                if rec.session == Some(session) {
                    info!(
                        "Closing NAT connection for session {}: {}:{}",
                        session, rec.key.client, rec.key.client_port
                    );
                    *slot = None;
                    return true;
                }
            }
        }
        false
    }

    /// 空闲超时记录已绑定的会话（清扫前调用，供下发 AT+CIPCLOSE）
    pub fn expired_sessions(
        &self,
        now: Instant,
        timeout: Duration,
    ) -> heapless::Vec<SessionId, MAX_NAT_CONNECTIONS> {
        let mut sessions = heapless::Vec::new();
        for rec in self.slots.iter().flatten() {
            if now.duration_since(rec.last_activity) > timeout {
                if let Some(session) = rec.session {
                    sessions.push(session).ok();
                }
            }
        }
        sessions
    }

    /// 周期清扫：回收空闲超过 timeout 的记录，返回回收数量
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> usize {
        let mut reclaimed = 0;

        for slot in self.slots.iter_mut() {
            if let Some(rec) = slot {
                if now.duration_since(rec.last_activity) > timeout {
                    info!(
                        "Sweeping idle NAT connection: {}:{} -> {}:{}",
                        rec.key.client, rec.key.client_port, rec.key.remote, rec.key.remote_port
                    );
                    *slot = None;
                    reclaimed += 1;
                }
            }
        }

        reclaimed
    }

    /// 活跃记录数量
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

impl Default for NatTable {
    fn default() -> Self {
        Self::new()
    }
}
