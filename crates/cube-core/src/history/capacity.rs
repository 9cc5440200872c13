//! Per-sensor ring capacities and the PSRAM budget they must fit in
//!
//! Small records get a full hour of fast entries (360 × 10 s) and a full day
//! of slow entries (288 × 5 min). Larger records are trimmed so the sum
//! stays well under the budget.

use core::mem::size_of;

use super::{HistoryEntry, SensorHistory};
use crate::samples::*;

/// Total PSRAM reserved for all sensor histories.
pub const HISTORY_MEMORY_BUDGET: usize = 1024 * 1024;

pub const SOLAR_FAST: usize = 300;
pub const SOLAR_SLOW: usize = 240;

pub const I2C_FAST: usize = 360;
pub const I2C_SLOW: usize = 288;

pub const SPS30_FAST: usize = 300;
pub const SPS30_SLOW: usize = 240;

pub const IPS_FAST: usize = 200;
pub const IPS_SLOW: usize = 150;

pub const MCP3424_FAST: usize = 150;
pub const MCP3424_SLOW: usize = 120;

pub const ADS1110_FAST: usize = 360;
pub const ADS1110_SLOW: usize = 288;

pub const INA219_FAST: usize = 360;
pub const INA219_SLOW: usize = 288;

pub const SHT40_FAST: usize = 360;
pub const SHT40_SLOW: usize = 288;

pub const CALIBRATED_FAST: usize = 100;
pub const CALIBRATED_SLOW: usize = 80;

pub const HCHO_FAST: usize = 360;
pub const HCHO_SLOW: usize = 288;

pub const FAN_FAST: usize = 360;
pub const FAN_SLOW: usize = 288;

pub const BATTERY_FAST: usize = 360;
pub const BATTERY_SLOW: usize = 288;

pub type SolarHistory = SensorHistory<SolarData, SOLAR_FAST, SOLAR_SLOW>;
pub type I2cHistory = SensorHistory<I2cSensorData, I2C_FAST, I2C_SLOW>;
pub type Sps30History = SensorHistory<Sps30Data, SPS30_FAST, SPS30_SLOW>;
pub type IpsHistory = SensorHistory<IpsData, IPS_FAST, IPS_SLOW>;
pub type Mcp3424History = SensorHistory<Mcp3424Data, MCP3424_FAST, MCP3424_SLOW>;
pub type Ads1110History = SensorHistory<Ads1110Data, ADS1110_FAST, ADS1110_SLOW>;
pub type Ina219History = SensorHistory<Ina219Data, INA219_FAST, INA219_SLOW>;
pub type Sht40History = SensorHistory<Sht40Data, SHT40_FAST, SHT40_SLOW>;
pub type CalibratedHistory = SensorHistory<CalibratedData, CALIBRATED_FAST, CALIBRATED_SLOW>;
pub type HchoHistory = SensorHistory<HchoData, HCHO_FAST, HCHO_SLOW>;
pub type FanHistory = SensorHistory<FanData, FAN_FAST, FAN_SLOW>;
pub type BatteryHistory = SensorHistory<BatteryData, BATTERY_FAST, BATTERY_SLOW>;

/// Bytes one sensor's fast and slow rings occupy.
pub const fn footprint<T>(fast: usize, slow: usize) -> usize {
    (fast + slow) * size_of::<HistoryEntry<T>>()
}

/// Bytes all sensor histories occupy when every sensor is enabled.
pub const TOTAL_FOOTPRINT: usize = footprint::<SolarData>(SOLAR_FAST, SOLAR_SLOW)
    + footprint::<I2cSensorData>(I2C_FAST, I2C_SLOW)
    + footprint::<Sps30Data>(SPS30_FAST, SPS30_SLOW)
    + footprint::<IpsData>(IPS_FAST, IPS_SLOW)
    + footprint::<Mcp3424Data>(MCP3424_FAST, MCP3424_SLOW)
    + footprint::<Ads1110Data>(ADS1110_FAST, ADS1110_SLOW)
    + footprint::<Ina219Data>(INA219_FAST, INA219_SLOW)
    + footprint::<Sht40Data>(SHT40_FAST, SHT40_SLOW)
    + footprint::<CalibratedData>(CALIBRATED_FAST, CALIBRATED_SLOW)
    + footprint::<HchoData>(HCHO_FAST, HCHO_SLOW)
    + footprint::<FanData>(FAN_FAST, FAN_SLOW)
    + footprint::<BatteryData>(BATTERY_FAST, BATTERY_SLOW);
