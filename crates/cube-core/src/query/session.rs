use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use log::{debug, warn};

use super::{
    HistoryQuery, PacketCursor, PacketMode, build_next_packet, build_packet, error_response,
};
use crate::errors::QueryError;
use crate::history::HistoryManager;
use crate::transport::PacketSink;

/// The history store as shared between the averaging task and the
/// connection handlers.
///
/// The averaging task locks it once per tick to record; a session locks it
/// once per packet and never across an `await` on the transport.
pub type SharedHistory = Mutex<CriticalSectionRawMutex, HistoryManager>;

/// What a completed session delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub packets_sent: usize,
    pub samples_sent: usize,
    pub total_packets: usize,
}

/// How a [`HistorySession`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed(SessionSummary),
    /// The request was answered with an error frame instead of packets
    Refused(QueryError),
    /// The sink failed after `sent` of `total` packets
    Abandoned { sent: usize, total: usize },
}

/// Streams the answer to one `getHistory` request.
///
/// In [`PacketMode::Auto`] every packet is built and sent in order, each
/// from a fresh snapshot of the store. A [`PacketCursor`] carries the newest
/// timestamp delivered so far, so entries recorded or evicted between
/// packets never cause a gap or a repeat. In [`PacketMode::Manual`] exactly
/// one packet is sent.
pub struct HistorySession<'a> {
    history: &'a SharedHistory,
    query: HistoryQuery,
}

impl<'a> HistorySession<'a> {
    pub fn new(history: &'a SharedHistory, query: HistoryQuery) -> Self {
        Self { history, query }
    }

    pub fn query(&self) -> &HistoryQuery {
        &self.query
    }

    /// Send the session's packets to `sink`.
    ///
    /// Each packet is awaited into the sink before the next one is built.
    /// A sink error abandons the session at once; nothing is retried.
    pub async fn run<S: PacketSink>(self, sink: &mut S) -> SessionOutcome {
        let sensor = self.query.sensor.name();
        let mut cursor = PacketCursor::default();
        let mut summary = SessionSummary::default();

        loop {
            let (index, built) = {
                let manager = self.history.lock().await;
                match self.query.mode {
                    PacketMode::Auto => (
                        cursor.index,
                        build_next_packet(&manager, &self.query, &cursor),
                    ),
                    PacketMode::Manual(index) => (
                        index,
                        build_packet(&manager, &self.query, index).map(|packet| (packet, cursor)),
                    ),
                }
            };

            let (packet, next) = match built {
                Ok(built) => built,
                Err(e) => {
                    warn!("History request for {} refused: {}", sensor, e);
                    if let Err(send_error) = sink.send(&error_response(sensor, &e)).await {
                        warn!("Could not deliver history error for {}: {:?}", sensor, send_error);
                        return SessionOutcome::Abandoned { sent: 0, total: 0 };
                    }
                    return SessionOutcome::Refused(e);
                }
            };

            if let Err(e) = sink.send(&packet.json).await {
                warn!(
                    "History session for {} abandoned after {} of {} packet(s): {:?}",
                    sensor, summary.packets_sent, packet.total_packets, e
                );
                return SessionOutcome::Abandoned {
                    sent: summary.packets_sent,
                    total: packet.total_packets,
                };
            }

            summary.packets_sent += 1;
            summary.samples_sent += packet.samples;
            summary.total_packets = packet.total_packets;
            debug!(
                "{} packet {}/{} sent ({} samples)",
                sensor,
                index.saturating_add(1),
                packet.total_packets,
                packet.samples
            );

            if self.query.mode != PacketMode::Auto || !packet.has_more {
                return SessionOutcome::Completed(summary);
            }
            cursor = next;
        }
    }
}
