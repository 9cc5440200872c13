extern crate alloc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::Serialize;
use serde_json::{Value, json};

use super::HistoryQuery;
use crate::errors::QueryError;
use crate::history::HistoryManager;

/// How a result set of `total_available` samples splits into packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketPlan {
    pub total_available: usize,
    pub packet_size: usize,
}

impl PacketPlan {
    pub fn new(total_available: usize, packet_size: usize) -> Self {
        Self {
            total_available,
            packet_size: packet_size.max(1),
        }
    }

    /// Always at least one, so an empty result still answers with a packet.
    pub fn total_packets(&self) -> usize {
        self.total_available.div_ceil(self.packet_size).max(1)
    }

    /// `(skip, len)` of packet `index`, or `None` past the last packet.
    pub fn slice(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.total_packets() {
            return None;
        }
        let skip = index.saturating_mul(self.packet_size);
        let len = self.packet_size.min(self.total_available.saturating_sub(skip));
        Some((skip, len))
    }

    pub fn has_more(&self, index: usize) -> bool {
        index.saturating_add(1) < self.total_packets()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPacket<'a> {
    cmd: &'static str,
    sensor: &'static str,
    time_range: &'static str,
    sample_type: &'static str,
    data: &'a [Value],
    packet_index: usize,
    total_packets: usize,
    has_more_packets: bool,
    total_available_samples: usize,
    from_time: u64,
    to_time: u64,
}

/// One serialized `history` packet.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPacket {
    pub json: String,
    /// Entries carried in `data`
    pub samples: usize,
    pub total_packets: usize,
    pub has_more: bool,
}

/// Where an auto-mode session stands in its result set.
///
/// Pages are located by the newest timestamp already delivered rather than
/// by offset, so entries evicted from the front of a full ring between
/// packets do not shift the pages that follow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketCursor {
    /// Index of the next packet
    pub index: usize,
    /// Entries delivered so far
    pub sent: usize,
    /// Newest delivered timestamp and how many delivered entries carry it
    last: Option<(u64, usize)>,
}

impl PacketCursor {
    fn advance(&self, data: &[Value]) -> Self {
        let mut last = self.last;
        for stamp in data.iter().filter_map(|entry| entry["timestamp"].as_u64()) {
            last = match last {
                Some((ts, seen)) if ts == stamp => Some((ts, seen + 1)),
                _ => Some((stamp, 1)),
            };
        }
        Self {
            index: self.index + 1,
            sent: self.sent + data.len(),
            last,
        }
    }
}

fn check_ready(manager: &HistoryManager) -> Result<(), QueryError> {
    if !manager.is_enabled() {
        return Err(QueryError::HistoryDisabled);
    }
    if !manager.is_initialized() {
        return Err(QueryError::NotInitialized);
    }
    Ok(())
}

fn encode(
    query: &HistoryQuery,
    data: &[Value],
    index: usize,
    total_packets: usize,
    has_more: bool,
    total_available: usize,
) -> Result<BuiltPacket, QueryError> {
    let packet = HistoryPacket {
        cmd: "history",
        sensor: query.sensor.name(),
        time_range: query.time_range.label(),
        sample_type: query.resolution.label(),
        data,
        packet_index: index,
        total_packets,
        has_more_packets: has_more,
        total_available_samples: total_available,
        from_time: query.from,
        to_time: query.to,
    };

    let json = serde_json::to_string(&packet).map_err(|_| QueryError::Serialization)?;
    Ok(BuiltPacket {
        json,
        samples: data.len(),
        total_packets,
        has_more,
    })
}

/// Serialize packet `index` of `query` against the current contents of
/// `manager`.
///
/// Indexes past the last packet produce an empty `data` array with
/// `hasMorePackets: false`. A sensor without storage answers like one with
/// no samples.
pub fn build_packet(
    manager: &HistoryManager,
    query: &HistoryQuery,
    index: usize,
) -> Result<BuiltPacket, QueryError> {
    check_ready(manager)?;

    let source = manager.source(query.sensor);
    let plan = PacketPlan::new(
        source.count_in_range(query.resolution, query.from, query.to),
        query.packet_size,
    );

    let data = match plan.slice(index) {
        Some((skip, len)) => source.page_json(query.resolution, query.from, query.to, skip, len)?,
        None => Vec::new(),
    };

    encode(
        query,
        &data,
        index,
        plan.total_packets(),
        plan.has_more(index),
        plan.total_available,
    )
}

/// Serialize the packet after `cursor` and return the cursor for the one
/// after it.
///
/// `totalPackets` and `totalAvailableSamples` count what was already sent
/// plus what is left in the store right now.
pub fn build_next_packet(
    manager: &HistoryManager,
    query: &HistoryQuery,
    cursor: &PacketCursor,
) -> Result<(BuiltPacket, PacketCursor), QueryError> {
    check_ready(manager)?;

    let source = manager.source(query.sensor);
    let (from, skip) = cursor.last.unwrap_or((query.from, 0));
    let remaining = source
        .count_in_range(query.resolution, from, query.to)
        .saturating_sub(skip);
    let plan = PacketPlan::new(remaining, query.packet_size);

    let data = match plan.slice(0) {
        Some((_, len)) if len > 0 => source.page_json(query.resolution, from, query.to, skip, len)?,
        _ => Vec::new(),
    };

    let packet = encode(
        query,
        &data,
        cursor.index,
        cursor.index + plan.total_packets(),
        plan.has_more(0),
        cursor.sent + remaining,
    )?;
    Ok((packet, cursor.advance(&data)))
}

/// `{"cmd":"history","sensor":..,"error":..}` for a request that failed.
pub fn error_response(sensor: &str, error: &QueryError) -> String {
    json!({
        "cmd": "history",
        "sensor": sensor,
        "error": error.to_string(),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::history::Resolution;
    use crate::history::capacity::SHT40_FAST;
    use crate::query::{PacketMode, TimeRange};
    use crate::samples::{SensorKind, Sht40Data};
    use proptest::prelude::*;

    fn query(from: u64, to: u64, packet_size: usize) -> HistoryQuery {
        HistoryQuery {
            sensor: SensorKind::Sht40,
            time_range: TimeRange::OneHour,
            resolution: Resolution::Fast,
            from,
            to,
            mode: PacketMode::Auto,
            packet_size,
        }
    }

    fn manager_with(samples: u64) -> HistoryManager {
        let mut manager = HistoryManager::new();
        manager.initialize(&HistoryConfig::default());
        for i in 1..=samples {
            manager.record(
                Resolution::Fast,
                i * 10_000,
                Sht40Data {
                    temperature: i as f32,
                    valid: true,
                    ..Default::default()
                },
            );
        }
        manager
    }

    #[test]
    fn test_plan_arithmetic() {
        let plan = PacketPlan::new(45, 20);
        assert_eq!(plan.total_packets(), 3);
        assert_eq!(plan.slice(0), Some((0, 20)));
        assert_eq!(plan.slice(2), Some((40, 5)));
        assert_eq!(plan.slice(3), None);
        assert!(plan.has_more(1));
        assert!(!plan.has_more(2));

        let empty = PacketPlan::new(0, 20);
        assert_eq!(empty.total_packets(), 1);
        assert_eq!(empty.slice(0), Some((0, 0)));
        assert!(!empty.has_more(0));
    }

    #[test]
    fn test_packet_fields() {
        let manager = manager_with(45);
        let packet = build_packet(&manager, &query(0, u64::MAX, 20), 1).unwrap();
        assert_eq!(packet.samples, 20);
        assert!(packet.has_more);

        let json: Value = serde_json::from_str(&packet.json).unwrap();
        assert_eq!(json["cmd"], "history");
        assert_eq!(json["sensor"], "sht40");
        assert_eq!(json["timeRange"], "1h");
        assert_eq!(json["sampleType"], "fast");
        assert_eq!(json["packetIndex"], 1);
        assert_eq!(json["totalPackets"], 3);
        assert_eq!(json["hasMorePackets"], true);
        assert_eq!(json["totalAvailableSamples"], 45);
        assert_eq!(json["data"][0]["timestamp"], 210_000);
        assert_eq!(json["data"][0]["data"]["temperature"], 21.0);
    }

    #[test]
    fn test_index_past_end_is_empty() {
        let manager = manager_with(5);
        let packet = build_packet(&manager, &query(0, u64::MAX, 20), 7).unwrap();
        let json: Value = serde_json::from_str(&packet.json).unwrap();
        assert_eq!(json["data"].as_array().unwrap().len(), 0);
        assert_eq!(json["hasMorePackets"], false);
        assert_eq!(json["totalPackets"], 1);
        assert_eq!(json["totalAvailableSamples"], 5);
    }

    #[test]
    fn test_uninitialized_manager_errors() {
        let manager = HistoryManager::new();
        assert_eq!(
            build_packet(&manager, &query(0, 1, 20), 0),
            Err(QueryError::NotInitialized)
        );

        let mut disabled = HistoryManager::new();
        disabled.initialize(&HistoryConfig {
            enable_history: false,
            ..Default::default()
        });
        assert_eq!(
            build_packet(&disabled, &query(0, 1, 20), 0),
            Err(QueryError::HistoryDisabled)
        );
    }

    #[test]
    fn test_sensor_without_storage_is_empty() {
        let manager = manager_with(3);
        let mut q = query(0, u64::MAX, 20);
        q.sensor = SensorKind::Solar;
        let packet = build_packet(&manager, &q, 0).unwrap();
        assert_eq!(packet.samples, 0);
        assert_eq!(packet.total_packets, 1);
    }

    fn stamps(json: &str) -> Vec<u64> {
        let json: Value = serde_json::from_str(json).unwrap();
        json["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["timestamp"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn test_cursor_matches_index_on_static_data() {
        let manager = manager_with(45);
        let q = query(0, u64::MAX, 20);

        let mut cursor = PacketCursor::default();
        for index in 0..3 {
            let (packet, next) = build_next_packet(&manager, &q, &cursor).unwrap();
            assert_eq!(packet, build_packet(&manager, &q, index).unwrap());
            cursor = next;
        }
        assert_eq!(cursor.sent, 45);
    }

    #[test]
    fn test_cursor_survives_eviction_between_packets() {
        // Fill the SHT40 fast ring exactly, then keep recording past `to`
        let mut manager = manager_with(SHT40_FAST as u64);
        let to = SHT40_FAST as u64 * 10_000;
        let q = query(0, to, 20);

        let mut delivered = Vec::new();
        let mut cursor = PacketCursor::default();
        loop {
            let (packet, next) = build_next_packet(&manager, &q, &cursor).unwrap();
            delivered.extend(stamps(&packet.json));
            if !packet.has_more {
                break;
            }
            cursor = next;
            manager.record(
                Resolution::Fast,
                to + cursor.index as u64 * 10_000,
                Sht40Data::default(),
            );
        }

        let expected: Vec<u64> = (1..=SHT40_FAST as u64).map(|i| i * 10_000).collect();
        assert_eq!(delivered, expected);
    }

    #[test]
    fn test_cursor_splits_equal_timestamps() {
        let mut manager = manager_with(0);
        for i in 0..5 {
            manager.record(
                Resolution::Fast,
                1_000,
                Sht40Data {
                    temperature: i as f32,
                    valid: true,
                    ..Default::default()
                },
            );
        }
        let q = query(0, u64::MAX, 2);

        let mut temperatures = Vec::new();
        let mut cursor = PacketCursor::default();
        loop {
            let (packet, next) = build_next_packet(&manager, &q, &cursor).unwrap();
            let json: Value = serde_json::from_str(&packet.json).unwrap();
            for entry in json["data"].as_array().unwrap() {
                temperatures.push(entry["data"]["temperature"].as_f64().unwrap());
            }
            cursor = next;
            if !packet.has_more {
                break;
            }
        }
        assert_eq!(temperatures, [0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(cursor.index, 3);
    }

    #[test]
    fn test_error_response_shape() {
        let json: Value =
            serde_json::from_str(&error_response("sht40", &QueryError::NotInitialized)).unwrap();
        assert_eq!(json["cmd"], "history");
        assert_eq!(json["sensor"], "sht40");
        assert_eq!(json["error"], "History not initialized");
    }

    proptest! {
        #[test]
        fn prop_packets_partition_results(total in 0usize..500, size in 1usize..64) {
            let plan = PacketPlan::new(total, size);
            let mut covered = 0;
            for index in 0..plan.total_packets() {
                let (skip, len) = plan.slice(index).unwrap();
                prop_assert_eq!(skip, covered);
                prop_assert!(len <= size);
                covered += len;
                prop_assert_eq!(plan.has_more(index), index + 1 < plan.total_packets());
            }
            prop_assert_eq!(covered, total);
            prop_assert!(plan.slice(plan.total_packets()).is_none());
        }
    }
}
