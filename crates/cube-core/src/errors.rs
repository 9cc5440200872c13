//! Error types shared across the history core

use thiserror_no_std::Error;

/// Short owned label carried inside errors (sensor names, range labels).
/// Longer inputs are truncated.
pub type Label = heapless::String<32>;

/// Copy `text` into a [`Label`], dropping whatever does not fit.
pub fn label(text: &str) -> Label {
    truncated(text)
}

/// Copy `text` into a fixed-capacity string, dropping whatever does not fit.
pub fn truncated<const N: usize>(text: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Failures while bringing up the history store at boot.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    #[error("failed to allocate {bytes} bytes of history storage")]
    AllocationFailed { bytes: usize },

    #[error("history budget exceeded: requested {requested} bytes, {remaining} remaining")]
    BudgetExceeded { requested: usize, remaining: usize },

    #[error("history not initialized")]
    NotInitialized,
}

/// Failures answering a historical-data request.
///
/// The `Display` text is what the client sees in the `error` field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unknown sensor: {0}")]
    UnknownSensor(Label),

    #[error("Invalid time range: {0}")]
    InvalidRange(Label),

    #[error("Unknown sample type: {0}")]
    UnknownSampleType(Label),

    #[error("History disabled in configuration")]
    HistoryDisabled,

    #[error("History not initialized")]
    NotInitialized,

    #[error("Failed to encode history packet")]
    Serialization,
}

/// Failures decoding a client command before it reaches a handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(heapless::String<96>),

    #[error("Unknown command: {0}")]
    UnknownCommand(Label),

    #[error("Invalid request: {0}")]
    InvalidRequest(heapless::String<96>),
}
