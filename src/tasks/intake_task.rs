// 转发入口任务
//
// NAT 表与会话池的唯一所有者。WiFi 侧帧与模块侧事件在这里串行汇合，
// 表的每一次读写都发生在同一个任务里。
use defmt::info;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_time::Instant;

use alloc::vec::Vec;

use ml307r_bridge::at::client::AtClient;
use ml307r_bridge::event::{
    AtResponse, ModemCommand, ModemEvent, COMMAND_CHANNEL_SIZE, FRAME_CHANNEL_SIZE,
    MODEM_EVENT_CHANNEL_SIZE, OUTBOUND_CHANNEL_SIZE, RESPONSE_CHANNEL_SIZE,
};
use ml307r_bridge::relay::{PacketBuf, RelayEngine};

/// 入口任务
#[embassy_executor::task]
pub async fn intake_task(
    frames: Receiver<'static, CriticalSectionRawMutex, Vec<u8>, FRAME_CHANNEL_SIZE>,
    events: Receiver<'static, CriticalSectionRawMutex, ModemEvent, MODEM_EVENT_CHANNEL_SIZE>,
    commands: Sender<'static, CriticalSectionRawMutex, ModemCommand, COMMAND_CHANNEL_SIZE>,
    responses: Receiver<'static, CriticalSectionRawMutex, AtResponse, RESPONSE_CHANNEL_SIZE>,
    outbound: Sender<'static, CriticalSectionRawMutex, PacketBuf, OUTBOUND_CHANNEL_SIZE>,
) -> ! {
    info!("Intake task started");

    let client = AtClient::new(commands, responses);
    let mut engine = RelayEngine::new();

    loop {
        match select(frames.receive(), events.receive()).await {
            Either::First(frame) => {
                engine.handle_frame(&client, &frame, Instant::now()).await;
            }
            Either::Second(event) => {
                engine.handle_modem_event(&client, event, outbound, Instant::now()).await;
            }
        }
    }
}
