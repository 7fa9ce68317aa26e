// 转发引擎
//
// NAT 表、会话池与统计计数的唯一所有者，由 intake 任务驱动。
// WiFi 侧帧与模块侧事件都在这里汇合，表从不跨任务共享。
use defmt::{debug, info, warn, Format};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_time::{Duration, Instant};

use super::ipv4;
use super::packet::PacketBuf;
use crate::at::client::AtClient;
use crate::at::command;
use crate::at::session::{self, SessionPool};
use crate::error::Error;
use crate::event::{ModemEvent, OUTBOUND_CHANNEL_SIZE};
use crate::nat::{NatTable, FLOW_TIMEOUT};

/// AT+CIPSTART 建连超时
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);
/// 数据提示符等待超时
const PROMPT_TIMEOUT: Duration = Duration::from_secs(3);
/// 载荷发送结果超时
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// AT+CIPCLOSE 结果超时
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// 转发统计
#[derive(Debug, Clone, Copy, Default, Format)]
pub struct RelayStats {
    pub forwarded: u32,
    pub inbound: u32,
    pub parse_errors: u32,
    pub dropped_oversize: u32,
    pub dropped_table_full: u32,
    pub dropped_sessions_full: u32,
    pub establish_failures: u32,
    pub send_failures: u32,
}

/// 转发引擎
pub struct RelayEngine {
    table: NatTable,
    sessions: SessionPool,
    stats: RelayStats,
}

impl RelayEngine {
    pub fn new() -> Self {
        Self {
            table: NatTable::new(),
            sessions: SessionPool::new(),
            stats: RelayStats::default(),
        }
    }

    /// 处理一个来自 WiFi 客户端的原始 IP 帧
    pub async fn handle_frame(&mut self, client: &AtClient, frame: &[u8], now: Instant) {
        let parsed = match ipv4::parse(frame) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Dropping unparseable frame ({} bytes): {}", frame.len(), e);
                self.stats.parse_errors += 1;
                return;
            }
        };

        debug!(
            "Packet: {}:{} -> {}:{} ({} bytes)",
            parsed.key.client,
            parsed.key.client_port,
            parsed.key.remote,
            parsed.key.remote_port,
            parsed.payload.len()
        );

        // 查找或创建 NAT 记录
        if self.table.find(&parsed.key).is_none() {
            match self.table.create(parsed.key, now) {
                Ok(_) => {}
                Err(Error::TableFull) => {
                    self.stats.dropped_table_full += 1;
                    return;
                }
                Err(e) => {
                    warn!("NAT create failed: {}", e);
                    return;
                }
            }
        }
        let Some(rec) = self.table.find(&parsed.key) else {
            return;
        };

        // 缓存载荷并刷新活动时间
        if rec.store_payload(parsed.payload).is_err() {
            warn!(
                "Dropping oversized payload ({} bytes) from {}:{}",
                parsed.payload.len(),
                parsed.key.client,
                parsed.key.client_port
            );
            self.stats.dropped_oversize += 1;
            return;
        }
        rec.touch(now);

        // 无会话则先建立
        let session = match rec.session() {
            Some(session) => session,
            None => {
                // 会话位满即拒绝，记录保留等待重试或清扫
                let Some(session) = self.sessions.allocate() else {
                    self.stats.dropped_sessions_full += 1;
                    warn!(
                        "All {} modem sessions busy, dropping packet for {}:{}",
                        session::MAX_AT_SESSIONS,
                        parsed.key.client,
                        parsed.key.client_port
                    );
                    return;
                };
                let cmd = match command::open_session(session, rec.key()) {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        self.sessions.release(session);
                        warn!("Open command build failed: {}", e);
                        return;
                    }
                };

                let response = client.request(cmd, OPEN_TIMEOUT).await;
                if session::open_succeeded(&response) {
                    rec.bind_session(session);
                    info!(
                        "4G session {} established for {}:{}",
                        session,
                        rec.key().client,
                        rec.key().client_port
                    );
                    session
                } else {
                    // 建立失败：会话 ID 归还池子，记录保持未绑定，
                    // 当前数据包丢弃，后续包重试或由清扫回收
                    rec.clear_session();
                    self.sessions.release(session);
                    self.stats.establish_failures += 1;
                    warn!("4G session open failed: {=str}", response.as_str());
                    return;
                }
            }
        };

        // 纯控制帧（无载荷）只维持记录，不转发
        if rec.buffered().is_empty() {
            return;
        }

        let len = rec.buffered().len();
        let send_cmd = match command::send_payload(session, len) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Send command build failed: {}", e);
                return;
            }
        };

        if let Err(e) = client.request_prompt(send_cmd, PROMPT_TIMEOUT).await {
            warn!("No send prompt from modem: {}", e);
            self.stats.send_failures += 1;
            return;
        }

        let data = rec.buffered().to_vec();
        let response = client.send_raw(data, SEND_TIMEOUT).await;
        if session::send_succeeded(&response) {
            self.stats.forwarded += 1;
            debug!("Forwarded {} bytes on session {}", len, session);
        } else {
            self.stats.send_failures += 1;
            warn!("Send failed on session {}: {=str}", session, response.as_str());
        }
    }

    /// 处理模块侧事件
    pub async fn handle_modem_event(
        &mut self,
        client: &AtClient,
        event: ModemEvent,
        outbound: Sender<'static, CriticalSectionRawMutex, PacketBuf, OUTBOUND_CHANNEL_SIZE>,
        now: Instant,
    ) {
        match event {
            ModemEvent::Inbound { session, payload } => {
                match self.table.find_by_session(session) {
                    Some(rec) => {
                        rec.touch(now);
                        debug!(
                            "Inbound {} bytes on session {} -> {}:{}",
                            payload.len(),
                            session,
                            rec.key().client,
                            rec.key().client_port
                        );
                        let packet = PacketBuf {
                            key: *rec.key(),
                            payload,
                        };
                        outbound.send(packet).await;
                        self.stats.inbound += 1;
                    }
                    None => {
                        warn!("No NAT record for modem session {}, dropping", session);
                    }
                }
            }

            ModemEvent::SessionClosed(session) => {
                self.sessions.release(session);
                if !self.table.remove_by_session(session) {
                    debug!("CLOSED for unknown session {}", session);
                }
            }

            ModemEvent::SweepTick => {
                // 先关闭超时记录占用的模块会话，再回收表槽位
                for session in self.table.expired_sessions(now, FLOW_TIMEOUT) {
                    match command::close_session(session) {
                        Ok(cmd) => {
                            let response = client.request(cmd, CLOSE_TIMEOUT).await;
                            debug!("Closed session {}: {=str}", session, response.as_str());
                        }
                        Err(e) => warn!("Close command build failed: {}", e),
                    }
                    self.sessions.release(session);
                }

                let reclaimed = self.table.sweep(now, FLOW_TIMEOUT);
                info!(
                    "Sweep: {} reclaimed, {} active, {} sessions in use, stats: {}",
                    reclaimed,
                    self.table.active_count(),
                    self.sessions.in_use(),
                    self.stats
                );
            }
        }
    }
}

impl Default for RelayEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;

    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_time::Instant;

    use super::*;
    use crate::at::line::LineText;
    use crate::at::session::{SessionId, MAX_AT_SESSIONS};
    use crate::drivers::mock_wifi::build_ipv4_tcp;
    use crate::event::{
        AtResponse, CommandChannel, ModemCommand, OutboundChannel, ResponseChannel,
    };
    use crate::nat::Ipv4Addr;

    const CLIENT: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 100);
    const REMOTE: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);

    struct Harness {
        commands: &'static CommandChannel,
        responses: &'static ResponseChannel,
        outbound: &'static OutboundChannel,
        client: AtClient,
        engine: RelayEngine,
    }

    fn harness() -> Harness {
        let commands: &'static CommandChannel = Box::leak(Box::new(CommandChannel::new()));
        let responses: &'static ResponseChannel = Box::leak(Box::new(ResponseChannel::new()));
        let outbound: &'static OutboundChannel = Box::leak(Box::new(OutboundChannel::new()));
        Harness {
            commands,
            responses,
            outbound,
            client: AtClient::new(commands.sender(), responses.receiver()),
            engine: RelayEngine::new(),
        }
    }

    fn final_line(text: &str) -> AtResponse {
        let mut line = LineText::new();
        line.push_str(text).unwrap();
        AtResponse::Final(line)
    }

    async fn expect_line(commands: &'static CommandChannel, prefix: &str) {
        match commands.receive().await {
            ModemCommand::Line(line) => {
                assert!(line.starts_with(prefix), "unexpected command: {}", line.as_str())
            }
            other => panic!("expected command line, got {:?}", other),
        }
    }

    #[test]
    fn failed_open_leaves_session_unassigned_then_retries() {
        let mut h = harness();
        let now = Instant::from_millis(0);
        let frame = build_ipv4_tcp(CLIENT, 40000, REMOTE, 80, b"hello");
        let key = ipv4::parse(&frame).unwrap().key;

        let (commands, responses) = (h.commands, h.responses);

        // 模块拒绝建连：数据包丢弃，记录保留且会话未绑定
        block_on(join(h.engine.handle_frame(&h.client, &frame, now), async {
            expect_line(commands, "AT+CIPSTART=0,").await;
            responses.send(final_line("0, CONNECT FAIL")).await;
        }));

        assert_eq!(h.engine.stats.establish_failures, 1);
        assert_eq!(h.engine.stats.forwarded, 0);
        assert!(h.engine.table.find(&key).unwrap().session().is_none());

        // 客户端重传触发重试：重新下发 CIPSTART（轮转到下一个 ID）并完成转发
        block_on(join(h.engine.handle_frame(&h.client, &frame, now), async {
            expect_line(commands, "AT+CIPSTART=1,").await;
            responses.send(final_line("1, CONNECT OK")).await;
            expect_line(commands, "AT+CIPSEND=1,5").await;
            responses.send(AtResponse::Prompt).await;
            match commands.receive().await {
                ModemCommand::Raw(data) => assert_eq!(data, b"hello"),
                other => panic!("expected raw payload, got {:?}", other),
            }
            responses.send(final_line("1, SEND OK")).await;
        }));

        assert_eq!(h.engine.stats.forwarded, 1);
        assert_eq!(h.engine.table.find(&key).unwrap().session(), Some(SessionId(1)));
    }

    #[test]
    fn exhausted_session_pool_drops_packet() {
        let mut h = harness();
        let now = Instant::from_millis(0);

        for _ in 0..MAX_AT_SESSIONS {
            assert!(h.engine.sessions.allocate().is_some());
        }

        let frame = build_ipv4_tcp(CLIENT, 40001, REMOTE, 80, b"hello");
        let key = ipv4::parse(&frame).unwrap().key;
        block_on(h.engine.handle_frame(&h.client, &frame, now));

        // 满即拒绝：不复用在线 ID，也不下发任何 AT 命令
        assert_eq!(h.engine.stats.dropped_sessions_full, 1);
        assert!(h.commands.try_receive().is_err());
        assert!(h.engine.table.find(&key).unwrap().session().is_none());
    }

    #[test]
    fn closed_urc_releases_the_session_id() {
        let mut h = harness();

        for _ in 0..MAX_AT_SESSIONS {
            h.engine.sessions.allocate().unwrap();
        }
        assert!(h.engine.sessions.allocate().is_none());

        block_on(h.engine.handle_modem_event(
            &h.client,
            ModemEvent::SessionClosed(SessionId(2)),
            h.outbound.sender(),
            Instant::from_millis(0),
        ));

        assert_eq!(h.engine.sessions.allocate(), Some(SessionId(2)));
    }

    #[test]
    fn sweep_closes_and_releases_expired_sessions() {
        let mut h = harness();
        let now = Instant::from_millis(0);
        let frame = build_ipv4_tcp(CLIENT, 40002, REMOTE, 80, b"hello");

        let (commands, responses) = (h.commands, h.responses);

        // 建立一条绑定了会话 0 的流
        block_on(join(h.engine.handle_frame(&h.client, &frame, now), async {
            expect_line(commands, "AT+CIPSTART=0,").await;
            responses.send(final_line("0, CONNECT OK")).await;
            expect_line(commands, "AT+CIPSEND=0,5").await;
            responses.send(AtResponse::Prompt).await;
            let _ = commands.receive().await;
            responses.send(final_line("0, SEND OK")).await;
        }));

        // 占满其余会话位，使释放效果可观察
        for _ in 1..MAX_AT_SESSIONS {
            h.engine.sessions.allocate().unwrap();
        }
        assert!(h.engine.sessions.allocate().is_none());

        let later = now + FLOW_TIMEOUT + Duration::from_millis(1);
        block_on(join(
            h.engine
                .handle_modem_event(&h.client, ModemEvent::SweepTick, h.outbound.sender(), later),
            async {
                expect_line(commands, "AT+CIPCLOSE=0").await;
                responses.send(final_line("0, CLOSE OK")).await;
            },
        ));

        assert_eq!(h.engine.table.active_count(), 0);
        assert_eq!(h.engine.sessions.allocate(), Some(SessionId(0)));
    }
}
