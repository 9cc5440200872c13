use cube_core::config::HistoryConfig;
use cube_core::history::{
    GlobalMemory, HistoryEntry, HistoryManager, PsramBudget, Resolution, SensorHistory,
};
use cube_core::query::{HistoryRequest, PacketMode, build_packet, get_historical_data};
use cube_core::samples::{Ina219Data, SensorKind, Sht40Data};
use proptest::prelude::*;
use serde_json::Value;

const HOUR: u64 = 60 * 60 * 1000;
// 2024-06-01 12:00:00 UTC
const NOW: u64 = 1_717_243_200_000;

fn sht40(temperature: f32) -> Sht40Data {
    Sht40Data {
        temperature,
        humidity: 50.0,
        pressure: 1013.0,
        valid: true,
    }
}

fn manager() -> HistoryManager {
    let mut manager = HistoryManager::new();
    manager.initialize(&HistoryConfig::default());
    manager
}

fn request(json: &str) -> HistoryRequest {
    serde_json::from_str(json).unwrap()
}

#[test]
fn test_scenario_a_ring_overwrites_oldest() {
    let mut history: SensorHistory<Sht40Data, 3, 2> = SensorHistory::new();
    let mut budget = PsramBudget::new(1024);
    history.initialize(&mut budget, &GlobalMemory).unwrap();

    for (ts, v) in [(10, 1.0), (20, 2.0), (30, 3.0)] {
        history.add_fast_sample(sht40(v), ts);
    }
    let mut buf = [HistoryEntry::default(); 3];
    let n = history.fast_samples(&mut buf, 0, 100);
    let got: Vec<(u64, f32)> = buf[..n].iter().map(|e| (e.timestamp, e.data.temperature)).collect();
    assert_eq!(got, [(10, 1.0), (20, 2.0), (30, 3.0)]);

    history.add_fast_sample(sht40(4.0), 40);
    let n = history.fast_samples(&mut buf, 0, 100);
    let got: Vec<(u64, f32)> = buf[..n].iter().map(|e| (e.timestamp, e.data.temperature)).collect();
    assert_eq!(got, [(20, 2.0), (30, 3.0), (40, 4.0)]);
}

#[test]
fn test_scenario_b_empty_history() {
    let manager = manager();
    let mut response = String::new();
    let n = get_historical_data(
        &manager,
        &request(r#"{"sensor":"sht40","timeRange":"24h"}"#),
        NOW,
        &mut response,
    );
    assert_eq!(n, 0);

    let json: Value = serde_json::from_str(&response).unwrap();
    assert!(json.get("error").is_none());
    assert_eq!(json["totalAvailableSamples"], 0);
    assert_eq!(json["totalPackets"], 1);
    assert_eq!(json["hasMorePackets"], false);
    assert_eq!(json["data"].as_array().unwrap().len(), 0);
}

#[test]
fn test_scenario_c_three_packets() {
    let mut manager = manager();
    for i in 0..45u64 {
        manager.record(Resolution::Fast, NOW - HOUR + 1_000 + i * 10_000, sht40(i as f32));
    }

    let mut sizes = Vec::new();
    let mut more = Vec::new();
    for index in 0..3 {
        let mut response = String::new();
        let req = request(&format!(
            r#"{{"sensor":"sht40","packetIndex":{index},"packetSize":20}}"#
        ));
        let n = get_historical_data(&manager, &req, NOW, &mut response);

        let json: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(json["totalPackets"], 3);
        assert_eq!(json["totalAvailableSamples"], 45);
        assert_eq!(json["data"].as_array().unwrap().len(), n);
        sizes.push(n);
        more.push(json["hasMorePackets"].as_bool().unwrap());
    }
    assert_eq!(sizes, [20, 20, 5]);
    assert_eq!(more, [true, true, false]);
}

#[test]
fn test_scenario_d_unknown_sensor() {
    let manager = manager();
    let mut response = String::new();
    let n = get_historical_data(&manager, &request(r#"{"sensor":"bogus"}"#), NOW, &mut response);
    assert_eq!(n, 0);

    let json: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(json["error"], "Unknown sensor: bogus");
    assert!(json.get("data").is_none());
}

#[test]
fn test_time_range_excludes_older_entries() {
    let mut manager = manager();
    // Two entries inside the last hour, one just outside it
    manager.record(Resolution::Slow, NOW - HOUR - 1, sht40(1.0));
    manager.record(Resolution::Slow, NOW - HOUR, sht40(2.0));
    manager.record(Resolution::Slow, NOW, sht40(3.0));

    let mut response = String::new();
    let n = get_historical_data(
        &manager,
        &request(r#"{"sensor":"sht40","sampleType":"slow"}"#),
        NOW,
        &mut response,
    );
    assert_eq!(n, 2);

    let json: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(json["sampleType"], "slow");
    assert_eq!(json["fromTime"], NOW - HOUR);
    assert_eq!(json["data"][0]["formattedTime"], "2024-06-01 11:00:00");
    assert_eq!(json["data"][1]["data"]["temperature"], 3.0);
}

#[test]
fn test_power_alias_queries_ina219() {
    let mut manager = manager();
    manager.record(
        Resolution::Fast,
        NOW,
        Ina219Data {
            bus_voltage: 5.1,
            current: 250.0,
            valid: true,
            ..Default::default()
        },
    );

    let mut response = String::new();
    let n = get_historical_data(&manager, &request(r#"{"sensor":"power"}"#), NOW, &mut response);
    assert_eq!(n, 1);
    let json: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(json["sensor"], "power");
    assert_eq!(json["data"][0]["data"]["current"], 250.0);
}

#[test]
fn test_history_survives_budget_degradation() {
    let mut manager = HistoryManager::new();
    let config = HistoryConfig::default();
    // Far too small for everything; whatever fits still answers queries
    let report = manager.initialize_with_budget(&config, 64 * 1024);
    assert!(!report.failures.is_empty());
    assert!(manager.total_memory_used() <= 64 * 1024);

    let kind = report.initialized[0];
    let query = request(&format!(r#"{{"sensor":"{}"}}"#, kind.name()))
        .resolve(NOW, 20)
        .unwrap();
    assert!(build_packet(&manager, &query, 0).is_ok());

    let failed = report.failures[0].0;
    assert_ne!(failed, SensorKind::Solar);
    assert!(!manager.source(failed).is_initialized());
}

proptest! {
    #[test]
    fn prop_packets_cover_every_sample(count in 0u64..120, size in 1i64..40) {
        let mut manager = manager();
        for i in (0..count).rev() {
            manager.record(Resolution::Fast, NOW - i * 1_000, sht40(i as f32));
        }

        let first = request(&format!(r#"{{"sensor":"sht40","packetSize":{size}}}"#))
            .resolve(NOW, 20)
            .unwrap();
        prop_assert_eq!(first.mode, PacketMode::Auto);
        let total_packets = build_packet(&manager, &first, 0).unwrap().total_packets;

        let mut stamps = Vec::new();
        for index in 0..total_packets {
            let packet = build_packet(&manager, &first, index).unwrap();
            let json: Value = serde_json::from_str(&packet.json).unwrap();
            for entry in json["data"].as_array().unwrap() {
                stamps.push(entry["timestamp"].as_u64().unwrap());
            }
        }

        // Every retained sample exactly once, oldest first
        let retained = count.min(360);
        prop_assert_eq!(stamps.len() as u64, retained);
        prop_assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }
}
