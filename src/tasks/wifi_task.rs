// WiFi 侧任务（Demo 用）
//
// 接收方向由模拟客户端周期生成帧，发送方向把出站载荷记录日志。
// 接入真实 WiFi 芯片时这两个任务换成对应驱动的收发循环。
use alloc::vec::Vec;

use defmt::{debug, info};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_time::{Duration, Timer};

use ml307r_bridge::drivers::MockWifiClient;
use ml307r_bridge::event::{FRAME_CHANNEL_SIZE, OUTBOUND_CHANNEL_SIZE};
use ml307r_bridge::relay::PacketBuf;

/// 合成流量的发包间隔
const FRAME_INTERVAL: Duration = Duration::from_secs(7);

/// WiFi 接收任务：客户端帧 -> intake
#[embassy_executor::task]
pub async fn wifi_rx_task(
    frames: Sender<'static, CriticalSectionRawMutex, Vec<u8>, FRAME_CHANNEL_SIZE>,
) -> ! {
    info!("WiFi RX task started");

    let mut wifi = MockWifiClient::new();

    loop {
        Timer::after(FRAME_INTERVAL).await;

        let frame = wifi.next_frame();
        debug!("WiFi frame generated ({} bytes)", frame.len());
        frames.send(frame).await;
    }
}

/// WiFi 发送任务：出站载荷 -> 客户端
#[embassy_executor::task]
pub async fn wifi_tx_task(
    outbound: Receiver<'static, CriticalSectionRawMutex, PacketBuf, OUTBOUND_CHANNEL_SIZE>,
) -> ! {
    info!("WiFi TX task started");

    loop {
        let packet = outbound.receive().await;
        info!(
            "Delivering {} bytes to {}:{}",
            packet.payload.len(),
            packet.key.client,
            packet.key.client_port
        );
    }
}
