//! Sensor sample records and the [`Sample`] trait that averages them
//!
//! Every sensor on the cube produces one fixed-layout record per poll. The
//! records are plain `Copy` data with a `valid` flag set by the driver; the
//! history core never trusts a record whose flag is cleared.
//!
//! ## Sensor identifiers
//!
//! | Kind         | Wire name     | Record              |
//! |--------------|---------------|---------------------|
//! | `Solar`      | `solar`       | [`SolarData`]       |
//! | `I2c`        | `i2c`         | [`I2cSensorData`]   |
//! | `Sps30`      | `sps30`       | [`Sps30Data`]       |
//! | `Ips`        | `ips`         | [`IpsData`]         |
//! | `Mcp3424`    | `mcp3424`     | [`Mcp3424Data`]     |
//! | `Ads1110`    | `ads1110`     | [`Ads1110Data`]     |
//! | `Ina219`     | `power`       | [`Ina219Data`]      |
//! | `Sht40`      | `sht40`       | [`Sht40Data`]       |
//! | `Calibrated` | `calibration` | [`CalibratedData`]  |
//! | `Hcho`       | `hcho`        | [`HchoData`]        |
//! | `Fan`        | `fan`         | [`FanData`]         |
//! | `Battery`    | `battery`     | [`BatteryData`]     |

use core::fmt;

use serde::{Serialize, Serializer};

/// Identifies one sensor family on the cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorKind {
    Solar,
    I2c,
    Sps30,
    Ips,
    Mcp3424,
    Ads1110,
    Ina219,
    Sht40,
    Calibrated,
    Hcho,
    Fan,
    Battery,
}

impl SensorKind {
    /// Every sensor kind, in history initialization order.
    pub const ALL: [SensorKind; 12] = [
        SensorKind::Solar,
        SensorKind::I2c,
        SensorKind::Sps30,
        SensorKind::Ips,
        SensorKind::Mcp3424,
        SensorKind::Ads1110,
        SensorKind::Ina219,
        SensorKind::Sht40,
        SensorKind::Calibrated,
        SensorKind::Hcho,
        SensorKind::Fan,
        SensorKind::Battery,
    ];

    /// Name used for this sensor in client requests and responses.
    pub const fn name(self) -> &'static str {
        match self {
            SensorKind::Solar => "solar",
            SensorKind::I2c => "i2c",
            SensorKind::Sps30 => "sps30",
            SensorKind::Ips => "ips",
            SensorKind::Mcp3424 => "mcp3424",
            SensorKind::Ads1110 => "ads1110",
            SensorKind::Ina219 => "power",
            SensorKind::Sht40 => "sht40",
            SensorKind::Calibrated => "calibration",
            SensorKind::Hcho => "hcho",
            SensorKind::Fan => "fan",
            SensorKind::Battery => "battery",
        }
    }

    /// Look up a sensor by its wire name. Matching is case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        // `ina219` is accepted as an alias of `power`
        if name == "ina219" {
            return Some(SensorKind::Ina219);
        }
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for SensorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// A sensor record that can be averaged over a window.
///
/// Averaging is split in two steps so that the running sum can live in a
/// record of the same type:
///
/// 1. [`accumulate`](Sample::accumulate) adds a valid reading into a running
///    sum and bumps the contributor tally.
/// 2. [`finish`](Sample::finish) divides the sum by the tally and sets the
///    validity flags of the result.
///
/// Settings that are not meaningful to average (gain, sensor type, on/off
/// flags) are copied from the most recent reading instead.
pub trait Sample: Copy + Default + fmt::Debug + Serialize {
    /// Which sensor this record belongs to.
    const KIND: SensorKind;

    /// Per-field contributor counts. Most records are valid or invalid as a
    /// whole and use a single `u32`.
    type Tally: Copy + Default + fmt::Debug;

    fn is_valid(&self) -> bool;

    fn set_valid(&mut self, valid: bool);

    /// Fold `reading` into `self`, which holds a running sum.
    fn accumulate(&mut self, reading: &Self, tally: &mut Self::Tally);

    /// Turn the running sum in `self` into a mean over `tally` readings.
    fn finish(&mut self, tally: &Self::Tally);
}

/// Implements [`Sample`] for a record whose averaged fields are all `f32`
/// and which is valid or invalid as a whole.
macro_rules! averaged_sample {
    (
        $ty:ident => $kind:ident,
        averaged: [$($avg:ident),* $(,)?],
        latest: [$($latest:ident),* $(,)?] $(,)?
    ) => {
        impl $crate::samples::Sample for $ty {
            const KIND: $crate::samples::SensorKind = $crate::samples::SensorKind::$kind;
            type Tally = u32;

            fn is_valid(&self) -> bool {
                self.valid
            }

            fn set_valid(&mut self, valid: bool) {
                self.valid = valid;
            }

            fn accumulate(&mut self, reading: &Self, tally: &mut u32) {
                $(self.$avg += reading.$avg;)*
                $(self.$latest = reading.$latest;)*
                *tally += 1;
            }

            fn finish(&mut self, tally: &u32) {
                if *tally > 0 {
                    let n = *tally as f32;
                    $(self.$avg /= n;)*
                }
                self.valid = *tally > 0;
            }
        }
    };
}

mod records;

pub use records::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for kind in SensorKind::ALL {
            assert_eq!(SensorKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_power_alias() {
        assert_eq!(SensorKind::from_name("power"), Some(SensorKind::Ina219));
        assert_eq!(SensorKind::from_name("ina219"), Some(SensorKind::Ina219));
    }

    #[test]
    fn test_unknown_and_case_sensitive_names() {
        assert_eq!(SensorKind::from_name("bogus"), None);
        assert_eq!(SensorKind::from_name("SHT40"), None);
        assert_eq!(SensorKind::from_name(""), None);
    }

    #[test]
    fn test_kind_serializes_as_wire_name() {
        let json = serde_json::to_string(&SensorKind::Calibrated).unwrap();
        assert_eq!(json, "\"calibration\"");
    }
}
