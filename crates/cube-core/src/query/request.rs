extern crate alloc;
use alloc::string::String;

use serde::Deserialize;

use crate::errors::{QueryError, label};
use crate::history::Resolution;
use crate::samples::SensorKind;

/// Look-back window a client may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    OneHour,
    SixHours,
    Day,
}

impl TimeRange {
    pub const fn label(&self) -> &'static str {
        match self {
            TimeRange::OneHour => "1h",
            TimeRange::SixHours => "6h",
            TimeRange::Day => "24h",
        }
    }

    pub const fn duration_ms(&self) -> u64 {
        match self {
            TimeRange::OneHour => 60 * 60 * 1000,
            TimeRange::SixHours => 6 * 60 * 60 * 1000,
            TimeRange::Day => 24 * 60 * 60 * 1000,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "1h" => Some(TimeRange::OneHour),
            "6h" => Some(TimeRange::SixHours),
            "24h" => Some(TimeRange::Day),
            _ => None,
        }
    }
}

/// How packets of a result set are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketMode {
    /// The server pushes every packet without further requests
    Auto,
    /// The server sends exactly this packet
    Manual(usize),
}

/// A `getHistory` request as sent by the client.
///
/// Every field is optional on the wire. Times are milliseconds since the
/// epoch.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryRequest {
    pub sensor: String,
    pub time_range: Option<String>,
    pub sample_type: Option<String>,
    pub from_time: Option<u64>,
    pub to_time: Option<u64>,
    pub packet_index: Option<i64>,
    pub packet_size: Option<i64>,
}

/// A validated request with concrete bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub sensor: SensorKind,
    pub time_range: TimeRange,
    pub resolution: Resolution,
    pub from: u64,
    pub to: u64,
    pub mode: PacketMode,
    pub packet_size: usize,
}

impl HistoryRequest {
    /// Validate the request and pin its time bounds relative to `now`.
    ///
    /// - `timeRange` defaults to `1h` and `sampleType` to `fast`.
    /// - Non-zero `fromTime`/`toTime` override the range; a missing
    ///   `toTime` means `now`.
    /// - `packetSize` of zero, below zero or absent becomes
    ///   `default_packet_size`.
    /// - A supplied `packetIndex` selects manual mode; negative indexes are
    ///   out of range.
    pub fn resolve(
        &self,
        now: u64,
        default_packet_size: usize,
    ) -> Result<HistoryQuery, QueryError> {
        let sensor = SensorKind::from_name(&self.sensor)
            .ok_or_else(|| QueryError::UnknownSensor(label(&self.sensor)))?;

        let range_label = self.time_range.as_deref().unwrap_or("1h");
        let time_range = TimeRange::from_label(range_label)
            .ok_or_else(|| QueryError::InvalidRange(label(range_label)))?;

        let sample_type = self.sample_type.as_deref().unwrap_or("fast");
        let resolution = Resolution::from_label(sample_type)
            .ok_or_else(|| QueryError::UnknownSampleType(label(sample_type)))?;

        let explicit_from = self.from_time.filter(|t| *t > 0);
        let explicit_to = self.to_time.filter(|t| *t > 0);
        let (from, to) = if explicit_from.is_some() || explicit_to.is_some() {
            (explicit_from.unwrap_or(0), explicit_to.unwrap_or(now))
        } else {
            (now.saturating_sub(time_range.duration_ms()), now)
        };
        if from > to {
            return Err(QueryError::InvalidRange(label("fromTime is after toTime")));
        }

        let packet_size = self
            .packet_size
            .filter(|size| *size > 0)
            .map(|size| usize::try_from(size).unwrap_or(usize::MAX))
            .unwrap_or(default_packet_size.max(1));

        let mode = match self.packet_index {
            None => PacketMode::Auto,
            Some(index) => PacketMode::Manual(usize::try_from(index).unwrap_or(usize::MAX)),
        };

        Ok(HistoryQuery {
            sensor,
            time_range,
            resolution,
            from,
            to,
            mode,
            packet_size,
        })
    }
}
