//! Desktop simulator for the Sensor Cube history service.
//!
//! Feeds synthetic sensor readings through the cube-core averaging engine
//! into a real [`HistoryManager`], then serves dashboard commands read from
//! stdin (one JSON object per line) with replies on stdout.
//!
//! # Usage
//!
//! ```text
//! cube-simulator [config.json]
//! {"cmd":"getHistoryInfo"}
//! {"cmd":"getHistory","sensor":"sht40","timeRange":"1h","packetSize":10}
//! {"cmd":"getAverages","sensor":"hcho","type":"slow"}
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=debug` to see every flush and packet.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use embassy_futures::block_on;
use embassy_sync::mutex::Mutex;
use log::{error, info, warn};

use cube_core::averaging::{LiveReadings, MovingAverageEngine};
use cube_core::commands::{CommandHandler, SharedAverages};
use cube_core::config::HistoryConfig;
use cube_core::history::HistoryManager;
use cube_core::query::SharedHistory;
use cube_core::samples::*;
use cube_core::transport::PacketSink;

// ---------------------------------------------------------------------------
// Timing constants
// ---------------------------------------------------------------------------

/// Interval between synthetic sensor readings.
const MOCK_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Simulated history generated before the first command is served.
const WARM_UP: Duration = Duration::from_secs(2 * 60 * 60);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Mock data generation
// ---------------------------------------------------------------------------

/// Generates synthetic readings for every sensor the cube carries.
struct MockSensorGenerator;

impl MockSensorGenerator {
    /// Readings at wall-clock time `timestamp_ms`.
    fn readings_at(&self, timestamp_ms: u64) -> LiveReadings {
        let t = timestamp_ms as f64 / 1000.0;
        let wave = |period: f64| (t / period).sin() as f32;

        // Temperature: 20–26 °C sinusoidal with slow drift
        let temperature = 23.0 + 3.0 * wave(1200.0) + 0.5 * wave(370.0);
        // Humidity: 40–60 % with a different period
        let humidity = 50.0 + 10.0 * wave(1800.0) + 2.0 * wave(230.0);
        let pressure = 1013.0 + 4.0 * wave(7200.0);

        let pm2_5 = 8.0 + 4.0 * wave(900.0);
        let battery_voltage = 3.9 + 0.2 * wave(3600.0);

        LiveReadings {
            i2c: I2cSensorData {
                temperature: temperature + 0.3,
                humidity: humidity - 1.0,
                pressure,
                co2: 600.0 + 200.0 * wave(3000.0) + 30.0 * wave(410.0),
                sensor_type: I2cSensorType::Scd41,
                valid: true,
            },
            sps30: Sps30Data {
                pm1_0: pm2_5 * 0.6,
                pm2_5,
                pm4_0: pm2_5 * 1.2,
                pm10: pm2_5 * 1.5,
                nc0_5: pm2_5 * 7.0,
                nc1_0: pm2_5 * 8.0,
                nc2_5: pm2_5 * 8.3,
                nc4_0: pm2_5 * 8.4,
                nc10: pm2_5 * 8.5,
                typical_particle_size: 0.6,
                valid: true,
            },
            ips: IpsData {
                pc: core::array::from_fn(|bin| {
                    (400.0 * (1.0 + wave(600.0)) / (bin + 1) as f32) as u32
                }),
                pm: core::array::from_fn(|bin| pm2_5 / (bin + 1) as f32),
                valid: true,
            },
            ads1110: Ads1110Data {
                voltage: 1.2 + 0.1 * wave(500.0),
                data_rate: 15,
                gain: 1,
                valid: true,
            },
            ina219: Ina219Data {
                bus_voltage: 5.0 + 0.05 * wave(60.0),
                shunt_voltage: 2.5,
                current: 250.0 + 40.0 * wave(300.0),
                power: 1250.0 + 200.0 * wave(300.0),
                valid: true,
            },
            sht40: Sht40Data {
                temperature,
                humidity,
                pressure,
                valid: true,
            },
            calibrated: CalibratedData {
                co: 0.4 + 0.1 * wave(1500.0),
                no2: 0.02,
                o3: 0.03 + 0.01 * wave(2400.0),
                co_ppb: 400.0 + 100.0 * wave(1500.0),
                no2_ppb: 20.0,
                o3_ppb: 30.0 + 10.0 * wave(2400.0),
                valid: true,
                ..Default::default()
            },
            hcho: HchoData {
                hcho: 0.02 + 0.005 * wave(1100.0),
                hcho_ppb: 16.0 + 4.0 * wave(1100.0),
                valid: true,
            },
            fan: FanData {
                duty_cycle: 40.0,
                rpm: 1200.0 + 50.0 * wave(45.0),
                enabled: true,
                gline_enabled: false,
                valid: true,
            },
            battery: BatteryData {
                voltage: battery_voltage,
                current: -120.0,
                power: battery_voltage * -120.0,
                charge_percent: 80.0 + 10.0 * wave(3600.0),
                on_battery: false,
                low: false,
                critical: false,
                valid: true,
            },
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Writes each frame as one line on stdout.
struct StdoutSink;

impl PacketSink for StdoutSink {
    type Error = io::Error;

    async fn send(&mut self, frame: &str) -> Result<(), io::Error> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", frame)?;
        stdout.flush()
    }
}

// ---------------------------------------------------------------------------
// Setup helpers
// ---------------------------------------------------------------------------

/// Load the configuration named on the command line, or the defaults.
fn load_config() -> HistoryConfig {
    let Some(path) = std::env::args().nth(1) else {
        return HistoryConfig::default();
    };

    let parsed = std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str::<HistoryConfig>(&text).map_err(|e| e.to_string()));

    match parsed {
        Ok(config) => {
            info!("Loaded configuration from {}", path);
            config.sanitized()
        }
        Err(e) => {
            error!("Failed to load {}: {}; using defaults", path, e);
            HistoryConfig::default()
        }
    }
}

/// Run the averaging engine over `WARM_UP` of simulated readings ending at
/// `end_ms`.
fn warm_up(
    generator: &MockSensorGenerator,
    engine: &mut MovingAverageEngine,
    history: &mut HistoryManager,
    end_ms: u64,
) {
    let step = MOCK_SAMPLE_INTERVAL.as_millis() as u64;
    let start = end_ms.saturating_sub(WARM_UP.as_millis() as u64);

    let mut recorded = 0;
    let mut t = start;
    while t < end_ms {
        recorded += engine.update_moving_averages(t, &generator.readings_at(t), history);
        t += step;
    }
    info!("Warm-up recorded {} history entries", recorded);
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting Sensor Cube simulator");

    let config = load_config();
    let generator = MockSensorGenerator;

    let mut manager = HistoryManager::new();
    manager.initialize(&config);
    let mut engine = MovingAverageEngine::new(&config);

    warm_up(&generator, &mut engine, &mut manager, now_ms());
    manager.log_status();

    let history: Arc<SharedHistory> = Arc::new(Mutex::new(manager));
    let averages: Arc<SharedAverages> = Arc::new(Mutex::new(engine));

    // --- Live sampling ----------------------------------------------------
    {
        let history = Arc::clone(&history);
        let averages = Arc::clone(&averages);
        std::thread::spawn(move || {
            loop {
                std::thread::sleep(MOCK_SAMPLE_INTERVAL);
                let now = now_ms();
                let live = generator.readings_at(now);
                let mut engine = block_on(averages.lock());
                let mut manager = block_on(history.lock());
                engine.update_moving_averages(now, &live, &mut manager);
            }
        });
    }

    // --- Command loop -----------------------------------------------------
    info!("Reading commands from stdin, one JSON object per line");
    let handler = CommandHandler::new(&history, &averages, &config);
    let mut sink = StdoutSink;

    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("stdin: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let outcome = block_on(handler.handle(line, now_ms(), &mut sink));
        if outcome.is_disconnected() {
            warn!("stdout closed");
            break;
        }
    }

    info!("Simulator exiting");
}
