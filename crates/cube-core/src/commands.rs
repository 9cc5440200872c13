//! JSON command dispatch for dashboard connections
//!
//! Each inbound message is one JSON object with a `cmd` field:
//!
//! | `cmd`            | Reply                                             |
//! |------------------|---------------------------------------------------|
//! | `getHistory`     | one or more `history` packets                     |
//! | `getHistoryInfo` | `{"cmd":"historyInfo", ..status}`                 |
//! | `getAverages`    | `{"cmd":"averages","sensor","type","data"}`       |
//! | anything else    | `{"error":"Unknown command: .."}`                 |

extern crate alloc;
use alloc::string::{String, ToString};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::averaging::MovingAverageEngine;
use crate::config::HistoryConfig;
use crate::errors::{CommandError, QueryError, label, truncated};
use crate::history::{HistoryStatus, Resolution};
use crate::query::{HistoryRequest, HistorySession, SessionOutcome, SharedHistory};
use crate::samples::SensorKind;
use crate::transport::PacketSink;

/// The moving-average engine as shared between the averaging task and the
/// connection handlers.
pub type SharedAverages = Mutex<CriticalSectionRawMutex, MovingAverageEngine>;

/// How one command was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A `getHistory` session ran
    History(SessionOutcome),
    /// A single reply frame was sent
    Replied,
    /// The message was answered with an `{"error":..}` frame
    Rejected(CommandError),
    /// The sink failed while replying
    Disconnected,
}

impl CommandOutcome {
    /// True if the connection should be closed.
    pub fn is_disconnected(&self) -> bool {
        matches!(
            self,
            CommandOutcome::Disconnected | CommandOutcome::History(SessionOutcome::Abandoned { .. })
        )
    }
}

#[derive(Serialize)]
struct HistoryInfo<'a> {
    cmd: &'static str,
    #[serde(flatten)]
    status: &'a HistoryStatus,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct AveragesRequest {
    sensor: String,
    #[serde(rename = "type")]
    sample_type: Option<String>,
}

pub struct CommandHandler<'a> {
    history: &'a SharedHistory,
    averages: &'a SharedAverages,
    default_packet_size: usize,
}

impl<'a> CommandHandler<'a> {
    pub fn new(
        history: &'a SharedHistory,
        averages: &'a SharedAverages,
        config: &HistoryConfig,
    ) -> Self {
        Self {
            history,
            averages,
            default_packet_size: config.default_packet_size.max(1),
        }
    }

    /// Parse one message and answer it through `sink`.
    ///
    /// `now` is the current wall-clock time in milliseconds.
    pub async fn handle<S: PacketSink>(
        &self,
        text: &str,
        now: u64,
        sink: &mut S,
    ) -> CommandOutcome {
        let message: Value = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                let error = CommandError::InvalidJson(truncated(&e.to_string()));
                return reject(sink, error).await;
            }
        };

        let cmd = message.get("cmd").and_then(Value::as_str).unwrap_or("");
        debug!("Command: {}", cmd);

        match cmd {
            "getHistory" => self.get_history(&message, now, sink).await,
            "getHistoryInfo" => self.get_history_info(sink).await,
            "getAverages" => self.get_averages(&message, sink).await,
            other => reject(sink, CommandError::UnknownCommand(label(other))).await,
        }
    }

    async fn get_history<S: PacketSink>(
        &self,
        message: &Value,
        now: u64,
        sink: &mut S,
    ) -> CommandOutcome {
        let sensor = message.get("sensor").and_then(Value::as_str).unwrap_or("");

        let query = HistoryRequest::deserialize(message)
            .map_err(|e| CommandError::InvalidRequest(truncated(&e.to_string())).to_string())
            .and_then(|request| {
                request
                    .resolve(now, self.default_packet_size)
                    .map_err(|e| e.to_string())
            });

        match query {
            Ok(query) => {
                CommandOutcome::History(HistorySession::new(self.history, query).run(sink).await)
            }
            Err(error) => {
                warn!("Rejected history request for '{}': {}", sensor, error);
                let frame =
                    json!({ "cmd": "history", "sensor": sensor, "error": error }).to_string();
                send(sink, &frame).await
            }
        }
    }

    async fn get_history_info<S: PacketSink>(&self, sink: &mut S) -> CommandOutcome {
        let status = self.history.lock().await.status();

        let frame = if !status.enabled {
            error_frame("historyInfo", &QueryError::HistoryDisabled)
        } else {
            match serde_json::to_string(&HistoryInfo {
                cmd: "historyInfo",
                status: &status,
            }) {
                Ok(frame) => frame,
                Err(_) => error_frame("historyInfo", &QueryError::Serialization),
            }
        };
        send(sink, &frame).await
    }

    async fn get_averages<S: PacketSink>(&self, message: &Value, sink: &mut S) -> CommandOutcome {
        let request = match AveragesRequest::deserialize(message) {
            Ok(request) => request,
            Err(e) => {
                return reject(sink, CommandError::InvalidRequest(truncated(&e.to_string()))).await;
            }
        };
        let sample_type = request.sample_type.as_deref().unwrap_or("fast");

        let data = SensorKind::from_name(&request.sensor)
            .ok_or_else(|| QueryError::UnknownSensor(label(&request.sensor)))
            .and_then(|kind| {
                Resolution::from_label(sample_type)
                    .map(|resolution| (kind, resolution))
                    .ok_or_else(|| QueryError::UnknownSampleType(label(sample_type)))
            });

        let frame = match data {
            Ok((kind, resolution)) => {
                let averages = self.averages.lock().await.averages_json(kind, resolution);
                match averages {
                    Ok(data) => json!({
                        "cmd": "averages",
                        "sensor": kind.name(),
                        "type": resolution.label(),
                        "data": data,
                    })
                    .to_string(),
                    Err(e) => error_frame("averages", &e),
                }
            }
            Err(e) => error_frame("averages", &e),
        };
        send(sink, &frame).await
    }
}

fn error_frame(cmd: &str, error: &QueryError) -> String {
    json!({ "cmd": cmd, "error": error.to_string() }).to_string()
}

async fn send<S: PacketSink>(sink: &mut S, frame: &str) -> CommandOutcome {
    match sink.send(frame).await {
        Ok(()) => CommandOutcome::Replied,
        Err(e) => {
            warn!("Reply dropped: {:?}", e);
            CommandOutcome::Disconnected
        }
    }
}

async fn reject<S: PacketSink>(sink: &mut S, error: CommandError) -> CommandOutcome {
    warn!("{}", error);
    let frame = json!({ "error": error.to_string() }).to_string();
    match send(sink, &frame).await {
        CommandOutcome::Replied => CommandOutcome::Rejected(error),
        other => other,
    }
}
