//! Shared firmware state and error types

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use thiserror_no_std::Error;

use cube_core::averaging::LiveReadings;

/// Latest raw reading from every driver, written by the sensor task and
/// snapshotted once per tick by the history task.
pub type SharedLive = AsyncMutex<CriticalSectionRawMutex, LiveReadings>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Time sync failed: {0}")]
    TimeSync(heapless::String<64>),
    #[error("Connection error: {0}")]
    Connection(heapless::String<64>),
}

impl AppError {
    pub fn time_sync(details: &str) -> Self {
        AppError::TimeSync(cube_core::errors::truncated(details))
    }

    pub fn connection(details: &str) -> Self {
        AppError::Connection(cube_core::errors::truncated(details))
    }
}
