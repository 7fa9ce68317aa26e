// 清扫定时任务
//
// 表归 intake 任务所有，这里只发节拍，清扫本身在 intake 里执行。
use defmt::info;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_time::{Duration, Timer};

use ml307r_bridge::event::{ModemEvent, MODEM_EVENT_CHANNEL_SIZE};

/// 清扫周期
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// 清扫节拍任务
#[embassy_executor::task]
pub async fn sweep_task(
    events: Sender<'static, CriticalSectionRawMutex, ModemEvent, MODEM_EVENT_CHANNEL_SIZE>,
) -> ! {
    info!("Sweep task started, interval {}s", SWEEP_INTERVAL.as_secs());

    loop {
        Timer::after(SWEEP_INTERVAL).await;
        events.send(ModemEvent::SweepTick).await;
    }
}
