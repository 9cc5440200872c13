//! History and averaging configuration
//!
//! Deserialized from JSON with every field optional; anything missing takes
//! the default below.

use serde::{Deserialize, Serialize};

use crate::samples::SensorKind;

/// Fast averaging window.
pub const DEFAULT_FAST_PERIOD_MS: u64 = 10 * 1000;

/// Slow averaging window.
pub const DEFAULT_SLOW_PERIOD_MS: u64 = 5 * 60 * 1000;

/// Samples per history packet when the client does not ask for a size.
pub const DEFAULT_PACKET_SIZE: usize = 20;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryConfig {
    /// Master switch for the PSRAM history store
    pub enable_history: bool,
    pub fast_period_ms: u64,
    pub slow_period_ms: u64,
    pub default_packet_size: usize,
    pub sensors: SensorToggles,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enable_history: true,
            fast_period_ms: DEFAULT_FAST_PERIOD_MS,
            slow_period_ms: DEFAULT_SLOW_PERIOD_MS,
            default_packet_size: DEFAULT_PACKET_SIZE,
            sensors: SensorToggles::default(),
        }
    }
}

impl HistoryConfig {
    /// Replace zero periods and packet sizes with their defaults.
    pub fn sanitized(mut self) -> Self {
        if self.fast_period_ms == 0 {
            self.fast_period_ms = DEFAULT_FAST_PERIOD_MS;
        }
        if self.slow_period_ms == 0 {
            self.slow_period_ms = DEFAULT_SLOW_PERIOD_MS;
        }
        if self.default_packet_size == 0 {
            self.default_packet_size = DEFAULT_PACKET_SIZE;
        }
        self
    }
}

/// Per-sensor enable flags, keyed by wire name.
///
/// The solar controller shares its UART pins with the IPS sensor and is off
/// by default.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct SensorToggles {
    pub solar: bool,
    pub i2c: bool,
    pub sps30: bool,
    pub ips: bool,
    pub mcp3424: bool,
    pub ads1110: bool,
    #[serde(rename = "power", alias = "ina219")]
    pub ina219: bool,
    pub sht40: bool,
    #[serde(rename = "calibration")]
    pub calibrated: bool,
    pub hcho: bool,
    pub fan: bool,
    pub battery: bool,
}

impl Default for SensorToggles {
    fn default() -> Self {
        Self {
            solar: false,
            i2c: true,
            sps30: true,
            ips: true,
            mcp3424: true,
            ads1110: true,
            ina219: true,
            sht40: true,
            calibrated: true,
            hcho: true,
            fan: true,
            battery: true,
        }
    }
}

impl SensorToggles {
    /// Every sensor switched on.
    pub const fn all() -> Self {
        Self {
            solar: true,
            i2c: true,
            sps30: true,
            ips: true,
            mcp3424: true,
            ads1110: true,
            ina219: true,
            sht40: true,
            calibrated: true,
            hcho: true,
            fan: true,
            battery: true,
        }
    }

    pub fn is_enabled(&self, kind: SensorKind) -> bool {
        match kind {
            SensorKind::Solar => self.solar,
            SensorKind::I2c => self.i2c,
            SensorKind::Sps30 => self.sps30,
            SensorKind::Ips => self.ips,
            SensorKind::Mcp3424 => self.mcp3424,
            SensorKind::Ads1110 => self.ads1110,
            SensorKind::Ina219 => self.ina219,
            SensorKind::Sht40 => self.sht40,
            SensorKind::Calibrated => self.calibrated,
            SensorKind::Hcho => self.hcho,
            SensorKind::Fan => self.fan,
            SensorKind::Battery => self.battery,
        }
    }

    pub fn set(&mut self, kind: SensorKind, enabled: bool) {
        let flag = match kind {
            SensorKind::Solar => &mut self.solar,
            SensorKind::I2c => &mut self.i2c,
            SensorKind::Sps30 => &mut self.sps30,
            SensorKind::Ips => &mut self.ips,
            SensorKind::Mcp3424 => &mut self.mcp3424,
            SensorKind::Ads1110 => &mut self.ads1110,
            SensorKind::Ina219 => &mut self.ina219,
            SensorKind::Sht40 => &mut self.sht40,
            SensorKind::Calibrated => &mut self.calibrated,
            SensorKind::Hcho => &mut self.hcho,
            SensorKind::Fan => &mut self.fan,
            SensorKind::Battery => &mut self.battery,
        };
        *flag = enabled;
    }
}
