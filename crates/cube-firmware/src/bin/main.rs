#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::tcp::TcpSocket;
use embassy_net::{Runner, Stack, StackResources};
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Ticker, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::rng::Rng;
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::wifi::{
    ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent, WifiStaState,
};
use log::{error, info, warn};
use static_cell::StaticCell;

use cube_core::averaging::{LiveReadings, MovingAverageEngine};
use cube_core::commands::{CommandHandler, SharedAverages};
use cube_core::config::HistoryConfig;
use cube_core::history::{HISTORY_MEMORY_BUDGET, HistoryManager};
use cube_core::query::SharedHistory;
use cube_firmware::app_state::SharedLive;
use cube_firmware::clock::WallClock;
use cube_firmware::memory::PsramMemory;
use cube_firmware::net::{COMMAND_PORT, query_sntp, serve_connection};
use cube_firmware::wifi_secrets::{WIFI_PASSWORD, WIFI_SSID, has_credentials};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// SHT40 poll interval.
const SENSOR_INTERVAL: Duration = Duration::from_secs(2);

/// Averaging engine tick.
const HISTORY_TICK: Duration = Duration::from_secs(1);

/// Ticks between history fill-level log lines.
const STATUS_LOG_TICKS: u32 = 300;

const TIME_RESYNC: Duration = Duration::from_secs(60 * 60);
const TIME_RETRY: Duration = Duration::from_secs(30);

/// Concurrent dashboard connections.
const COMMAND_CONNECTIONS: usize = 2;

static CLOCK: WallClock = WallClock::new();

// ---------------------------------------------------------------------------
// Sampling and averaging
// ---------------------------------------------------------------------------

#[cfg(feature = "sensor-sht40")]
#[embassy_executor::task]
async fn sensor_task(i2c: I2c<'static, esp_hal::Async>, live: &'static SharedLive) {
    let mut sht40 = cube_firmware::sensors::Sht40Sensor::new(i2c);
    loop {
        let reading = match sht40.read().await {
            Ok(reading) => reading,
            Err(e) => {
                warn!("{}", e);
                Default::default()
            }
        };
        live.lock().await.sht40 = reading;
        Timer::after(SENSOR_INTERVAL).await;
    }
}

#[embassy_executor::task]
async fn history_task(
    live: &'static SharedLive,
    averages: &'static SharedAverages,
    history: &'static SharedHistory,
) {
    let mut ticker = Ticker::every(HISTORY_TICK);
    let mut ticks: u32 = 0;
    loop {
        ticker.next().await;

        let snapshot = *live.lock().await;
        let now = CLOCK.now_ms();
        {
            let mut engine = averages.lock().await;
            let mut manager = history.lock().await;
            engine.update_moving_averages(now, &snapshot, &mut manager);
        }

        ticks = ticks.wrapping_add(1);
        if ticks % STATUS_LOG_TICKS == 0 {
            history.lock().await.log_status();
        }
    }
}

// ---------------------------------------------------------------------------
// Networking
// ---------------------------------------------------------------------------

#[embassy_executor::task]
async fn connection_task(mut controller: WifiController<'static>) {
    info!("Connecting to WiFi network '{}'", WIFI_SSID);
    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            warn!("WiFi disconnected");
            Timer::after(Duration::from_secs(5)).await;
        }

        if !matches!(controller.is_started(), Ok(true)) {
            let config = ModeConfig::Client(
                ClientConfig::default()
                    .with_ssid(WIFI_SSID.into())
                    .with_password(WIFI_PASSWORD.into()),
            );
            if let Err(e) = controller.set_config(&config) {
                error!("WiFi configuration rejected: {:?}", e);
                Timer::after(Duration::from_secs(5)).await;
                continue;
            }
            if let Err(e) = controller.start_async().await {
                error!("WiFi start failed: {:?}", e);
                Timer::after(Duration::from_secs(5)).await;
                continue;
            }
        }

        match controller.connect_async().await {
            Ok(()) => info!("WiFi connected"),
            Err(e) => {
                error!("WiFi connection failed: {:?}", e);
                Timer::after(Duration::from_secs(5)).await;
            }
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

#[embassy_executor::task]
async fn time_task(stack: Stack<'static>) {
    stack.wait_config_up().await;
    loop {
        match query_sntp(stack).await {
            Ok(epoch_ms) => {
                CLOCK.sync(epoch_ms);
                Timer::after(TIME_RESYNC).await;
            }
            Err(e) => {
                warn!("{}", e);
                Timer::after(TIME_RETRY).await;
            }
        }
    }
}

#[embassy_executor::task(pool_size = COMMAND_CONNECTIONS)]
async fn command_task(
    stack: Stack<'static>,
    history: &'static SharedHistory,
    averages: &'static SharedAverages,
    config: &'static HistoryConfig,
) {
    let handler = CommandHandler::new(history, averages, config);
    let mut rx_buffer = [0u8; 1024];
    let mut tx_buffer = [0u8; 2048];

    loop {
        stack.wait_config_up().await;

        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(120)));

        if let Err(e) = socket.accept(COMMAND_PORT).await {
            warn!("Accept failed: {:?}", e);
            continue;
        }
        info!("Client connected from {:?}", socket.remote_endpoint());

        if let Err(e) = serve_connection(&mut socket, &handler, &CLOCK).await {
            warn!("{}", e);
        }

        socket.close();
        let _ = socket.flush().await;
        socket.abort();
        info!("Client disconnected");
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);
    esp_alloc::psram_allocator!(peripherals.PSRAM, esp_hal::psram);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    // --- History ---------------------------------------------------------
    static HISTORY_CONFIG: StaticCell<HistoryConfig> = StaticCell::new();
    let history_config: &'static HistoryConfig = HISTORY_CONFIG.init(HistoryConfig::default());

    let mut manager = HistoryManager::new();
    let report = manager.initialize_in(history_config, HISTORY_MEMORY_BUDGET, &PsramMemory);
    for (kind, e) in report.failures.iter() {
        error!("{} has no history: {}", kind, e);
    }

    static HISTORY: StaticCell<SharedHistory> = StaticCell::new();
    static AVERAGES: StaticCell<SharedAverages> = StaticCell::new();
    static LIVE: StaticCell<SharedLive> = StaticCell::new();
    let history = &*HISTORY.init(Mutex::new(manager));
    let averages = &*AVERAGES.init(Mutex::new(MovingAverageEngine::new(history_config)));
    let live = &*LIVE.init(Mutex::new(LiveReadings::default()));

    // --- Sensors ---------------------------------------------------------
    #[cfg(feature = "sensor-sht40")]
    {
        let i2c = I2c::new(
            peripherals.I2C0,
            I2cConfig::default().with_frequency(Rate::from_khz(100)),
        )
        .expect("Failed to configure I2C")
        .with_sda(peripherals.GPIO12)
        .with_scl(peripherals.GPIO11)
        .into_async();

        spawner.spawn(sensor_task(i2c, live).expect("sensor task already spawned"));
    }
    spawner.spawn(history_task(live, averages, history).expect("history task already spawned"));

    // --- WiFi ------------------------------------------------------------
    if !has_credentials() {
        error!("No WiFi credentials compiled in; history is collected but not served");
    } else {
        static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
        let radio_init = RADIO.init(
            esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"),
        );
        let (wifi_controller, interfaces) =
            esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
                .expect("Failed to initialize Wi-Fi controller");

        let rng = Rng::new();
        let seed = (rng.random() as u64) << 32 | rng.random() as u64;

        static RESOURCES: StaticCell<StackResources<6>> = StaticCell::new();
        let (stack, runner) = embassy_net::new(
            interfaces.sta,
            embassy_net::Config::dhcpv4(Default::default()),
            RESOURCES.init(StackResources::new()),
            seed,
        );

        spawner.spawn(connection_task(wifi_controller).expect("connection task already spawned"));
        spawner.spawn(net_task(runner).expect("net task already spawned"));
        spawner.spawn(time_task(stack).expect("time task already spawned"));
        for _ in 0..COMMAND_CONNECTIONS {
            spawner.spawn(
                command_task(stack, history, averages, history_config)
                    .expect("command task pool exhausted"),
            );
        }

        stack.wait_config_up().await;
        if let Some(config) = stack.config_v4() {
            info!("Serving history on {}:{}", config.address.address(), COMMAND_PORT);
        }
    }

    loop {
        Timer::after(Duration::from_secs(60)).await;
        info!(
            "Uptime {} s, clock {}",
            WallClock::uptime_ms() / 1000,
            if CLOCK.is_synced() { "synced" } else { "unsynced" }
        );
    }
}
