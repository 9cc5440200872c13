use serde::Serialize;

use super::{Sample, SensorKind};

/// Number of MCP3424 converters that can share the bus.
pub const MCP3424_MAX_DEVICES: usize = 8;

/// Input channels per MCP3424 converter.
pub const MCP3424_CHANNELS: usize = 4;

/// Particle size bins reported by the IPS sensor.
pub const IPS_BINS: usize = 7;

/// Victron MPPT charge controller readings (VE.Direct text protocol).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolarData {
    /// Battery voltage [V]
    pub battery_voltage: f32,
    /// Battery current [A], negative when discharging
    pub battery_current: f32,
    /// Panel voltage [V]
    pub panel_voltage: f32,
    /// Panel power [W]
    pub panel_power: f32,
    /// Load output current [A]
    pub load_current: f32,
    pub charge_state: u8,
    pub mppt_state: u8,
    pub error_code: u8,
    pub load_on: bool,
    pub valid: bool,
}

averaged_sample!(
    SolarData => Solar,
    averaged: [battery_voltage, battery_current, panel_voltage, panel_power, load_current],
    latest: [charge_state, mppt_state, error_code, load_on],
);

/// Which environmental sensor populated an [`I2cSensorData`] record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum I2cSensorType {
    #[default]
    None,
    Sht30,
    Bme280,
    Scd41,
}

/// Readings from the general-purpose environmental I2C sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct I2cSensorData {
    /// [°C]
    pub temperature: f32,
    /// [%RH]
    pub humidity: f32,
    /// [hPa]
    pub pressure: f32,
    /// [ppm]
    pub co2: f32,
    pub sensor_type: I2cSensorType,
    pub valid: bool,
}

averaged_sample!(
    I2cSensorData => I2c,
    averaged: [temperature, humidity, pressure, co2],
    latest: [sensor_type],
);

/// Sensirion SPS30 particulate matter readings.
///
/// Field names keep the underscore form the dashboard charts bind to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Sps30Data {
    /// Mass concentrations [µg/m³]
    pub pm1_0: f32,
    pub pm2_5: f32,
    pub pm4_0: f32,
    pub pm10: f32,
    /// Number concentrations [#/cm³]
    pub nc0_5: f32,
    pub nc1_0: f32,
    pub nc2_5: f32,
    pub nc4_0: f32,
    pub nc10: f32,
    /// [µm]
    pub typical_particle_size: f32,
    pub valid: bool,
}

averaged_sample!(
    Sps30Data => Sps30,
    averaged: [
        pm1_0, pm2_5, pm4_0, pm10, nc0_5, nc1_0, nc2_5, nc4_0, nc10,
        typical_particle_size,
    ],
    latest: [],
);

/// IPS particle sensor bins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpsData {
    /// Particle counts per bin
    pub pc: [u32; IPS_BINS],
    /// Particle mass per bin [µg/m³]
    pub pm: [f32; IPS_BINS],
    pub valid: bool,
}

impl Sample for IpsData {
    const KIND: SensorKind = SensorKind::Ips;
    type Tally = u32;

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    fn accumulate(&mut self, reading: &Self, tally: &mut u32) {
        for (sum, value) in self.pc.iter_mut().zip(reading.pc) {
            *sum = sum.saturating_add(value);
        }
        for (sum, value) in self.pm.iter_mut().zip(reading.pm) {
            *sum += value;
        }
        *tally += 1;
    }

    fn finish(&mut self, tally: &u32) {
        if *tally > 0 {
            for count in &mut self.pc {
                *count /= *tally;
            }
            for mass in &mut self.pm {
                *mass /= *tally as f32;
            }
        }
        self.valid = *tally > 0;
    }
}

/// MCP3424 18-bit ADC readings for every converter on the bus.
///
/// Each converter is valid on its own; a record is valid if any converter is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mcp3424Data {
    pub device_count: u8,
    pub addresses: [u8; MCP3424_MAX_DEVICES],
    /// Channel voltages [V], indexed `[device][channel]`
    pub channels: [[f32; MCP3424_CHANNELS]; MCP3424_MAX_DEVICES],
    pub device_valid: [bool; MCP3424_MAX_DEVICES],
    /// Conversion resolution [bits]
    pub resolution: u8,
    pub gain: u8,
    pub valid: bool,
}

impl Sample for Mcp3424Data {
    const KIND: SensorKind = SensorKind::Mcp3424;
    type Tally = [u32; MCP3424_MAX_DEVICES];

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    fn accumulate(&mut self, reading: &Self, tally: &mut Self::Tally) {
        self.device_count = reading.device_count;
        self.addresses = reading.addresses;
        self.resolution = reading.resolution;
        self.gain = reading.gain;

        for device in 0..MCP3424_MAX_DEVICES {
            if !reading.device_valid[device] {
                continue;
            }
            for (sum, value) in self.channels[device]
                .iter_mut()
                .zip(reading.channels[device])
            {
                *sum += value;
            }
            tally[device] += 1;
        }
    }

    fn finish(&mut self, tally: &Self::Tally) {
        for device in 0..MCP3424_MAX_DEVICES {
            let n = tally[device];
            if n > 0 {
                for value in &mut self.channels[device] {
                    *value /= n as f32;
                }
            }
            self.device_valid[device] = n > 0;
        }
        self.valid = self.device_valid.iter().any(|v| *v);
    }
}

/// ADS1110 16-bit ADC reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ads1110Data {
    /// [V]
    pub voltage: f32,
    /// Samples per second setting
    pub data_rate: u8,
    pub gain: u8,
    pub valid: bool,
}

averaged_sample!(
    Ads1110Data => Ads1110,
    averaged: [voltage],
    latest: [data_rate, gain],
);

/// INA219 power monitor readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ina219Data {
    /// [V]
    pub bus_voltage: f32,
    /// [mV]
    pub shunt_voltage: f32,
    /// [mA]
    pub current: f32,
    /// [mW]
    pub power: f32,
    pub valid: bool,
}

averaged_sample!(
    Ina219Data => Ina219,
    averaged: [bus_voltage, shunt_voltage, current, power],
    latest: [],
);

/// SHT40 temperature and humidity, plus pressure from the companion barometer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sht40Data {
    /// [°C]
    pub temperature: f32,
    /// [%RH]
    pub humidity: f32,
    /// [hPa]
    pub pressure: f32,
    pub valid: bool,
}

averaged_sample!(
    Sht40Data => Sht40,
    averaged: [temperature, humidity, pressure],
    latest: [],
);

/// Electrochemical and MOS gas readings after calibration.
///
/// Concentrations are in µg/m³ with a ppb twin for each gas; TGS readings
/// are sensor resistance [Ω].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CalibratedData {
    pub co: f32,
    pub no: f32,
    pub no2: f32,
    pub o3: f32,
    pub so2: f32,
    pub h2s: f32,
    pub nh3: f32,
    pub co_ppb: f32,
    pub no_ppb: f32,
    pub no2_ppb: f32,
    pub o3_ppb: f32,
    pub so2_ppb: f32,
    pub h2s_ppb: f32,
    pub nh3_ppb: f32,
    pub tgs02: f32,
    pub tgs03: f32,
    pub tgs12: f32,
    pub hcho: f32,
    pub pid: f32,
    pub valid: bool,
}

averaged_sample!(
    CalibratedData => Calibrated,
    averaged: [
        co, no, no2, o3, so2, h2s, nh3,
        co_ppb, no_ppb, no2_ppb, o3_ppb, so2_ppb, h2s_ppb, nh3_ppb,
        tgs02, tgs03, tgs12, hcho, pid,
    ],
    latest: [],
);

/// CB-HCHO-V4 formaldehyde readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HchoData {
    /// [mg/m³]
    pub hcho: f32,
    pub hcho_ppb: f32,
    pub valid: bool,
}

averaged_sample!(
    HchoData => Hcho,
    averaged: [hcho, hcho_ppb],
    latest: [],
);

/// Cooling fan state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanData {
    /// PWM duty cycle [%]
    pub duty_cycle: f32,
    pub rpm: f32,
    pub enabled: bool,
    pub gline_enabled: bool,
    pub valid: bool,
}

averaged_sample!(
    FanData => Fan,
    averaged: [duty_cycle, rpm],
    latest: [enabled, gline_enabled],
);

/// Battery monitor readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryData {
    /// [V]
    pub voltage: f32,
    /// [mA], negative while charging
    pub current: f32,
    /// [mW]
    pub power: f32,
    /// [%]
    pub charge_percent: f32,
    pub on_battery: bool,
    pub low: bool,
    pub critical: bool,
    pub valid: bool,
}

averaged_sample!(
    BatteryData => Battery,
    averaged: [voltage, current, power, charge_percent],
    latest: [on_battery, low, critical],
);
