use log::debug;
use serde_json::Value;

use super::DualAverage;
use crate::config::{HistoryConfig, SensorToggles};
use crate::errors::QueryError;
use crate::history::{HistoryManager, HistorySlot, Resolution};
use crate::samples::*;

/// Latest raw record from every sensor driver.
///
/// Drivers overwrite their own field on each poll; the engine reads the
/// whole snapshot once per tick and trusts only each record's `valid` flag.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveReadings {
    pub solar: SolarData,
    pub i2c: I2cSensorData,
    pub sps30: Sps30Data,
    pub ips: IpsData,
    pub mcp3424: Mcp3424Data,
    pub ads1110: Ads1110Data,
    pub ina219: Ina219Data,
    pub sht40: Sht40Data,
    pub calibrated: CalibratedData,
    pub hcho: HchoData,
    pub fan: FanData,
    pub battery: BatteryData,
}

/// Fold one reading into a sensor's windows and record whatever they flush.
///
/// Flushed averages that are still invalid (no valid reading has ever
/// arrived) are not recorded.
fn step<T>(
    averages: &mut DualAverage<T>,
    now: u64,
    reading: &T,
    history: &mut HistoryManager,
) -> usize
where
    T: Sample,
    HistoryManager: HistorySlot<T>,
{
    let flushed = averages.tick(now, reading);
    let mut recorded = 0;
    for (resolution, mean) in [
        (Resolution::Fast, flushed.fast),
        (Resolution::Slow, flushed.slow),
    ] {
        if let Some(mean) = mean.filter(|m| m.is_valid()) {
            history.record(resolution, now, mean);
            recorded += 1;
        }
    }
    recorded
}

fn average_json<T: Sample>(
    averages: &DualAverage<T>,
    resolution: Resolution,
) -> Result<Value, QueryError> {
    let average = match resolution {
        Resolution::Fast => averages.fast_average(),
        Resolution::Slow => averages.slow_average(),
    };
    serde_json::to_value(average).map_err(|_| QueryError::Serialization)
}

macro_rules! moving_average_engine {
    ($($field:ident: $sample:ty => $kind:ident,)*) => {
        /// Fast and slow moving averages for every sensor.
        ///
        /// [`update_moving_averages`](Self::update_moving_averages) is called
        /// once per main-loop tick by the single writer task. Each call folds
        /// the latest valid readings in, and every window whose period has
        /// elapsed pushes its mean into the [`HistoryManager`].
        ///
        /// Getters such as [`sht40`](Self::sht40) expose the most recently
        /// completed averages, never a partial window.
        #[derive(Debug, Clone)]
        pub struct MovingAverageEngine {
            sensors: SensorToggles,
            $($field: DualAverage<$sample>,)*
        }

        impl MovingAverageEngine {
            pub fn new(config: &HistoryConfig) -> Self {
                let fast = config.fast_period_ms;
                let slow = config.slow_period_ms;
                Self {
                    sensors: config.sensors,
                    $($field: DualAverage::new(fast, slow),)*
                }
            }

            /// Fold `live` into every enabled sensor's windows and record
            /// flushed averages at timestamp `now` (ms).
            ///
            /// Returns how many history entries were written.
            pub fn update_moving_averages(
                &mut self,
                now: u64,
                live: &LiveReadings,
                history: &mut HistoryManager,
            ) -> usize {
                let mut recorded = 0;
                $(
                    if self.sensors.is_enabled(SensorKind::$kind) {
                        recorded += step(&mut self.$field, now, &live.$field, history);
                    }
                )*
                if recorded > 0 {
                    debug!("Recorded {} averaged entries at {}", recorded, now);
                }
                recorded
            }

            $(
                pub fn $field(&self) -> &DualAverage<$sample> {
                    &self.$field
                }
            )*

            /// Most recently completed average for `kind`, as JSON.
            pub fn averages_json(
                &self,
                kind: SensorKind,
                resolution: Resolution,
            ) -> Result<Value, QueryError> {
                match kind {
                    $(SensorKind::$kind => average_json(&self.$field, resolution),)*
                }
            }
        }
    };
}

moving_average_engine! {
    solar: SolarData => Solar,
    i2c: I2cSensorData => I2c,
    sps30: Sps30Data => Sps30,
    ips: IpsData => Ips,
    mcp3424: Mcp3424Data => Mcp3424,
    ads1110: Ads1110Data => Ads1110,
    ina219: Ina219Data => Ina219,
    sht40: Sht40Data => Sht40,
    calibrated: CalibratedData => Calibrated,
    hcho: HchoData => Hcho,
    fan: FanData => Fan,
    battery: BatteryData => Battery,
}

impl MovingAverageEngine {
    pub fn is_enabled(&self, kind: SensorKind) -> bool {
        self.sensors.is_enabled(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HistoryConfig {
        HistoryConfig {
            fast_period_ms: 10_000,
            slow_period_ms: 60_000,
            ..Default::default()
        }
    }

    fn setup() -> (MovingAverageEngine, HistoryManager) {
        let config = config();
        let mut history = HistoryManager::new();
        history.initialize(&config);
        (MovingAverageEngine::new(&config), history)
    }

    #[test]
    fn test_flush_records_fast_entries() {
        let (mut engine, mut history) = setup();
        let mut live = LiveReadings::default();

        // One reading per second for 20 s
        for second in 0..=20u64 {
            live.sht40 = Sht40Data {
                temperature: second as f32,
                humidity: 40.0,
                pressure: 1000.0,
                valid: true,
            };
            engine.update_moving_averages(second * 1_000, &live, &mut history);
        }

        assert_eq!(history.sht40().fast_count(), 2);
        let latest = history.sht40().latest_fast().unwrap();
        assert_eq!(latest.timestamp, 20_000);
        // Second window covered seconds 11..=20
        assert!((latest.data.temperature - 15.5).abs() < 1e-4);
        assert!((engine.sht40().fast_average().temperature - 15.5).abs() < 1e-4);
        assert_eq!(history.sht40().slow_count(), 0);
    }

    #[test]
    fn test_invalid_sensor_records_nothing() {
        let (mut engine, mut history) = setup();
        let live = LiveReadings::default();
        for second in 0..=30u64 {
            engine.update_moving_averages(second * 1_000, &live, &mut history);
        }
        assert_eq!(history.sht40().fast_count(), 0);
        assert!(!engine.sht40().fast_average().valid);
    }

    #[test]
    fn test_dropout_repeats_last_average() {
        let (mut engine, mut history) = setup();
        let mut live = LiveReadings::default();
        live.hcho = HchoData {
            hcho: 0.05,
            hcho_ppb: 40.0,
            valid: true,
        };
        engine.update_moving_averages(0, &live, &mut history);
        engine.update_moving_averages(10_000, &live, &mut history);

        // Sensor drops out for the next window
        live.hcho.valid = false;
        engine.update_moving_averages(15_000, &live, &mut history);
        engine.update_moving_averages(20_000, &live, &mut history);

        let mut buf = [crate::history::HistoryEntry::default(); 4];
        let n = history.hcho().fast_samples(&mut buf, 0, u64::MAX);
        assert_eq!(n, 2);
        assert_eq!(buf[0].data, buf[1].data);
        assert_eq!(buf[1].timestamp, 20_000);
    }

    #[test]
    fn test_disabled_sensor_is_skipped() {
        let mut config = config();
        config.sensors.set(SensorKind::Fan, false);
        let mut history = HistoryManager::new();
        history.initialize(&config);
        let mut engine = MovingAverageEngine::new(&config);

        let mut live = LiveReadings::default();
        live.fan = FanData {
            rpm: 1200.0,
            valid: true,
            ..Default::default()
        };
        for second in 0..=10u64 {
            engine.update_moving_averages(second * 1_000, &live, &mut history);
        }
        assert!(!engine.fan().fast_average().valid);
        assert_eq!(history.fan().fast_count(), 0);
    }

    #[test]
    fn test_averages_json_by_kind() {
        let (mut engine, mut history) = setup();
        let mut live = LiveReadings::default();
        live.ina219 = Ina219Data {
            bus_voltage: 12.0,
            current: 100.0,
            valid: true,
            ..Default::default()
        };
        engine.update_moving_averages(0, &live, &mut history);
        engine.update_moving_averages(10_000, &live, &mut history);

        let fast = engine.averages_json(SensorKind::Ina219, Resolution::Fast).unwrap();
        assert_eq!(fast["busVoltage"], 12.0);
        assert_eq!(fast["valid"], true);

        let slow = engine.averages_json(SensorKind::Ina219, Resolution::Slow).unwrap();
        assert_eq!(slow["valid"], false);
    }
}
