use core::fmt::Write;

use chrono::{DateTime, Datelike, Timelike};
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// `"YYYY-MM-DD HH:MM:SS"`
pub type FormattedTime = heapless::String<19>;

/// One timestamped sample in a history ring.
///
/// Slots are zero-filled at allocation, so `data` is always initialized;
/// readers check the record's own `valid` flag for freshness.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistoryEntry<T> {
    /// Milliseconds since the Unix epoch (or since boot before time sync)
    pub timestamp: u64,
    pub data: T,
}

impl<T> HistoryEntry<T> {
    pub const fn new(timestamp: u64, data: T) -> Self {
        Self { timestamp, data }
    }

    /// Human-readable UTC form of the timestamp.
    ///
    /// Computed on demand when an entry is served to a client rather than on
    /// every insert.
    pub fn formatted_time(&self) -> FormattedTime {
        format_timestamp(self.timestamp)
    }
}

/// Format a millisecond timestamp as `"YYYY-MM-DD HH:MM:SS"` (UTC).
///
/// Timestamps chrono cannot represent yield an empty string.
pub fn format_timestamp(timestamp_ms: u64) -> FormattedTime {
    let mut out = FormattedTime::new();
    let Ok(millis) = i64::try_from(timestamp_ms) else {
        return out;
    };
    let Some(dt) = DateTime::from_timestamp_millis(millis) else {
        return out;
    };

    let written = write!(
        out,
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    );
    if written.is_err() {
        // Years past 9999 do not fit the fixed layout
        out.clear();
    }
    out
}

impl<T: Serialize> Serialize for HistoryEntry<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let formatted = self.formatted_time();
        let mut state = serializer.serialize_struct("HistoryEntry", 3)?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("formattedTime", formatted.as_str())?;
        state.serialize_field("data", &self.data)?;
        state.end()
    }
}
