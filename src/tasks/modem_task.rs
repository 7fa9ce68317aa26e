// 模块串口任务
//
// 串口两个方向的唯一所有者。初始化完成后进入解复用循环：
// 写出 intake 侧递交的命令/载荷，把收到的字节流重组分类后，
// 命令响应回给 AT client，URC 与入站载荷作为事件递交 intake。
use defmt::{info, warn};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_time::{Duration, Timer};

use ml307r_bridge::at::line::{LineBuffer, RxItem};
use ml307r_bridge::at::modem;
use ml307r_bridge::at::response::{classify, AtLine};
use ml307r_bridge::at::transport::ModemSerial;
use ml307r_bridge::drivers::MockModem;
use ml307r_bridge::event::{
    AtResponse, ModemCommand, ModemEvent, COMMAND_CHANNEL_SIZE, MODEM_EVENT_CHANNEL_SIZE,
    RESPONSE_CHANNEL_SIZE,
};

/// 空闲时的读等待窗口
const READ_POLL: Duration = Duration::from_secs(1);
/// 初始化失败后的重试间隔
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// 模块任务
///
/// 响应与事件都用 try_send：intake 可能正阻塞在命令交互上，
/// 本任务若在满通道上等待会形成互等，丢弃并告警更安全。
#[embassy_executor::task]
pub async fn modem_task(
    commands: Receiver<'static, CriticalSectionRawMutex, ModemCommand, COMMAND_CHANNEL_SIZE>,
    responses: Sender<'static, CriticalSectionRawMutex, AtResponse, RESPONSE_CHANNEL_SIZE>,
    events: Sender<'static, CriticalSectionRawMutex, ModemEvent, MODEM_EVENT_CHANNEL_SIZE>,
) -> ! {
    info!("Modem task started");

    let mut serial = MockModem::new();

    // 初始化直到成功
    loop {
        match modem::bring_up(&mut serial).await {
            Ok(modem_info) => {
                info!("4G ready, IP={=str}", modem_info.ip.as_str());
                break;
            }
            Err(e) => {
                warn!("4G bring-up failed: {}, retrying", e);
                Timer::after(RETRY_DELAY).await;
            }
        }
    }

    let mut lines = LineBuffer::new();
    let mut buf = [0u8; 256];

    loop {
        match select(commands.receive(), serial.read(&mut buf, READ_POLL)).await {
            Either::First(cmd) => {
                let result = match cmd {
                    ModemCommand::Line(line) => serial.write(line.as_bytes()).await,
                    ModemCommand::Raw(data) => serial.write(&data).await,
                };
                if let Err(e) = result {
                    warn!("Modem write failed: {}", e);
                }
            }

            Either::Second(Ok(n)) => {
                for item in lines.feed(&buf[..n]) {
                    dispatch(item, &responses, &events);
                }
            }

            Either::Second(Err(e)) => {
                warn!("Modem read failed: {}", e);
            }
        }
    }
}

/// 把一个重组结果分发到响应通道或事件通道
fn dispatch(
    item: RxItem,
    responses: &Sender<'static, CriticalSectionRawMutex, AtResponse, RESPONSE_CHANNEL_SIZE>,
    events: &Sender<'static, CriticalSectionRawMutex, ModemEvent, MODEM_EVENT_CHANNEL_SIZE>,
) {
    match item {
        RxItem::Line(text) => match classify(&text) {
            AtLine::Echo => {}
            AtLine::Final => {
                if responses.try_send(AtResponse::Final(text)).is_err() {
                    warn!("Response channel full, final dropped");
                }
            }
            AtLine::Info => {
                if responses.try_send(AtResponse::Line(text)).is_err() {
                    warn!("Response channel full, line dropped");
                }
            }
            AtLine::UrcClosed(session) => {
                if events.try_send(ModemEvent::SessionClosed(session)).is_err() {
                    warn!("Event channel full, CLOSED for session {} dropped", session);
                }
            }
        },

        RxItem::Payload { session, data } => {
            let len = data.len();
            if events.try_send(ModemEvent::Inbound { session, payload: data }).is_err() {
                warn!("Event channel full, {} inbound bytes on session {} dropped", len, session);
            }
        }

        RxItem::PayloadDiscarded { session, len } => {
            warn!("Discarded {} inbound bytes on session {}", len, session);
        }

        RxItem::Prompt => {
            if responses.try_send(AtResponse::Prompt).is_err() {
                warn!("Response channel full, prompt dropped");
            }
        }
    }
}
