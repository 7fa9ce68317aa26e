// 模块会话管理
//
// ML307R 的并发 socket 数量有限，与 WiFi 侧 NAT 表容量无关。
// 分配池跟踪每个 ID 的占用状态：全部占用时拒绝分配（满即拒绝），
// 复用仍在线的 ID 会把两条流绑到同一个 socket 上。
use defmt::Format;

/// 模块支持的最大并发会话数
pub const MAX_AT_SESSIONS: u8 = 8;

/// 模块会话 ID（AT+CIPSTART 的连接编号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct SessionId(pub u8);

/// 会话 ID 分配池
pub struct SessionPool {
    busy: [bool; MAX_AT_SESSIONS as usize],
    next: u8,
}

impl SessionPool {
    pub const fn new() -> Self {
        Self {
            busy: [false; MAX_AT_SESSIONS as usize],
            next: 0,
        }
    }

    /// 从上次分配的位置起轮转查找空闲 ID；全忙返回 None
    pub fn allocate(&mut self) -> Option<SessionId> {
        for offset in 0..MAX_AT_SESSIONS {
            let id = (self.next + offset) % MAX_AT_SESSIONS;
            if !self.busy[id as usize] {
                self.busy[id as usize] = true;
                self.next = (id + 1) % MAX_AT_SESSIONS;
                return Some(SessionId(id));
            }
        }
        None
    }

    /// 归还会话 ID（建立失败、CLOSED 上报或清扫关闭之后）
    pub fn release(&mut self, session: SessionId) {
        if session.0 < MAX_AT_SESSIONS {
            self.busy[session.0 as usize] = false;
        }
    }

    /// 当前占用数量
    pub fn in_use(&self) -> usize {
        self.busy.iter().filter(|busy| **busy).count()
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new()
    }
}

/// 建连响应判定：调用方对收集到的响应文本做子串匹配
pub fn open_succeeded(response: &str) -> bool {
    response.contains("CONNECT OK") || response.contains("ALREADY CONNECT")
}

/// 发送响应判定
pub fn send_succeeded(response: &str) -> bool {
    response.contains("SEND OK")
}
