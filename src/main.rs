#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

// 启用 alloc
#[cfg(target_os = "none")]
extern crate alloc;

#[cfg(target_os = "none")]
mod tasks;

#[cfg(target_os = "none")]
mod firmware {
    use defmt::info;
    use embassy_executor::Spawner;
    use embassy_stm32::Config;
    use embassy_time::Timer;
    use embedded_alloc::LlffHeap as Heap;
    use static_cell::StaticCell;
    use {defmt_rtt as _, panic_probe as _};

    use ml307r_bridge::event::{
        CommandChannel, FrameChannel, ModemEventChannel, OutboundChannel, ResponseChannel,
    };
    use ml307r_bridge::nat::{FLOW_BUFFER_SIZE, MAX_NAT_CONNECTIONS};

    use crate::tasks;

    #[global_allocator]
    static HEAP: Heap = Heap::empty();

    /// 堆容量：整张 NAT 表的流缓冲占 64K，其余给载荷与行缓冲，
    /// F407ZG 的 128K 连续 SRAM 中留 32K 给静态数据与任务栈
    const HEAP_SIZE: usize = 96 * 1024;

    // 堆必须装得下满表的流缓冲并留出载荷余量
    const _: () = assert!(HEAP_SIZE >= MAX_NAT_CONNECTIONS * FLOW_BUFFER_SIZE + 24 * 1024);

    #[embassy_executor::main]
    async fn main(spawner: Spawner) -> ! {
        // 初始化堆内存
        {
            use core::mem::MaybeUninit;
            use core::ptr::addr_of_mut;
            static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
            unsafe {
                let heap_ptr = addr_of_mut!(HEAP_MEM) as *mut u8;
                HEAP.init(heap_ptr as usize, HEAP_SIZE)
            }
        }

        let config = Config::default();
        let _p = embassy_stm32::init(config);

        info!("=== WiFi/4G NAT Bridge ===");
        info!("Initializing...");

        // 创建任务间通道
        static FRAMES: StaticCell<FrameChannel> = StaticCell::new();
        static OUTBOUND: StaticCell<OutboundChannel> = StaticCell::new();
        static EVENTS: StaticCell<ModemEventChannel> = StaticCell::new();
        static COMMANDS: StaticCell<CommandChannel> = StaticCell::new();
        static RESPONSES: StaticCell<ResponseChannel> = StaticCell::new();

        let frames = FRAMES.init(FrameChannel::new());
        let outbound = OUTBOUND.init(OutboundChannel::new());
        let events = EVENTS.init(ModemEventChannel::new());
        let commands = COMMANDS.init(CommandChannel::new());
        let responses = RESPONSES.init(ResponseChannel::new());

        info!("Channels initialized");

        // 启动所有任务
        info!("Spawning tasks...");

        spawner
            .spawn(tasks::modem_task::modem_task(
                commands.receiver(),
                responses.sender(),
                events.sender(),
            ))
            .unwrap();
        info!("  - Modem task spawned");

        spawner
            .spawn(tasks::intake_task::intake_task(
                frames.receiver(),
                events.receiver(),
                commands.sender(),
                responses.receiver(),
                outbound.sender(),
            ))
            .unwrap();
        info!("  - Intake task spawned");

        spawner.spawn(tasks::sweep_task::sweep_task(events.sender())).unwrap();
        info!("  - Sweep task spawned");

        spawner.spawn(tasks::wifi_task::wifi_rx_task(frames.sender())).unwrap();
        spawner.spawn(tasks::wifi_task::wifi_tx_task(outbound.receiver())).unwrap();
        info!("  - WiFi tasks spawned");

        info!("Bridge running");

        loop {
            Timer::after_secs(60).await;
            info!("Heartbeat...");
        }
    }
}

// 固件入口只在交叉目标上编译；宿主机构建只为运行库的单元测试
#[cfg(not(target_os = "none"))]
fn main() {}
