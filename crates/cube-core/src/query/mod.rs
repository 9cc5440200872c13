//! Packetized time-range queries over the history store
//!
//! A client asks for one sensor's history over a look-back window (`1h`,
//! `6h`, `24h`) or explicit `fromTime`/`toTime` bounds. The matching entries
//! are split into packets of `packetSize` samples, each a self-describing
//! JSON object:
//!
//! ```text
//! {"cmd":"history","sensor":"sht40","timeRange":"1h","sampleType":"fast",
//!  "data":[{"timestamp":..,"formattedTime":"..","data":{..}}, ..],
//!  "packetIndex":0,"totalPackets":3,"hasMorePackets":true,
//!  "totalAvailableSamples":45,"fromTime":..,"toTime":..}
//! ```
//!
//! Without a `packetIndex` the server pushes every packet in order (auto
//! mode). With one, it answers that packet only and the client pulls the
//! rest (manual mode).

extern crate alloc;
use alloc::string::String;

mod packet;
mod request;
mod session;

pub use packet::{
    BuiltPacket, PacketCursor, PacketPlan, build_next_packet, build_packet, error_response,
};
pub use request::{HistoryQuery, HistoryRequest, PacketMode, TimeRange};
pub use session::{HistorySession, SessionOutcome, SessionSummary, SharedHistory};

use crate::config::DEFAULT_PACKET_SIZE;
use crate::history::HistoryManager;

/// Answer one packet of `request` into `json_response`.
///
/// Without a `packetIndex` the first packet is returned. Failures leave an
/// error object in `json_response`. Returns the number of samples in the
/// packet, zero on failure.
pub fn get_historical_data(
    manager: &HistoryManager,
    request: &HistoryRequest,
    now: u64,
    json_response: &mut String,
) -> usize {
    let built = request.resolve(now, DEFAULT_PACKET_SIZE).and_then(|query| {
        let index = match query.mode {
            PacketMode::Auto => 0,
            PacketMode::Manual(index) => index,
        };
        build_packet(manager, &query, index)
    });

    match built {
        Ok(packet) => {
            *json_response = packet.json;
            packet.samples
        }
        Err(e) => {
            *json_response = error_response(&request.sensor, &e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::history::Resolution;
    use crate::samples::Sht40Data;
    use serde_json::Value;

    #[test]
    fn test_get_historical_data_first_packet() {
        let mut manager = HistoryManager::new();
        manager.initialize(&HistoryConfig::default());
        let now = 3_600_000;
        for i in 0..30u64 {
            manager.record(
                Resolution::Fast,
                now - i * 10_000,
                Sht40Data {
                    temperature: 20.0,
                    valid: true,
                    ..Default::default()
                },
            );
        }

        let request = HistoryRequest {
            sensor: "sht40".into(),
            ..Default::default()
        };
        let mut response = String::new();
        assert_eq!(get_historical_data(&manager, &request, now, &mut response), 20);

        let json: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(json["totalAvailableSamples"], 30);
        assert_eq!(json["hasMorePackets"], true);
    }

    #[test]
    fn test_get_historical_data_error() {
        let manager = HistoryManager::new();
        let request = HistoryRequest {
            sensor: "nope".into(),
            ..Default::default()
        };
        let mut response = String::new();
        assert_eq!(get_historical_data(&manager, &request, 0, &mut response), 0);

        let json: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(json["error"], "Unknown sensor: nope");
        assert_eq!(json["sensor"], "nope");
    }
}
