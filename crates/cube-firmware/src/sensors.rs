//! Sensor drivers producing cube-core sample records

use cube_core::samples::Sht40Data;
use embedded_hal_async::i2c::I2c;
use log::error;
use sht4x::Sht4xAsync;
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: {operation} failed ({details})")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
}

pub struct Sht40Sensor<I> {
    sensor: Sht4xAsync<I, embassy_time::Delay>,
}

impl<I: I2c> Sht40Sensor<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Sht4xAsync::<I, embassy_time::Delay>::new(i2c),
        }
    }

    /// One high-precision measurement. The SHT40 has no barometer, so
    /// `pressure` stays zero.
    pub async fn read(&mut self) -> Result<Sht40Data, SensorError> {
        let measurement = self
            .sensor
            .measure(sht4x::Precision::High, &mut embassy_time::Delay)
            .await
            .map_err(|e| {
                error!("SHT40 measurement failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: "SHT40",
                    operation: "measure temperature/humidity",
                    details: "I2C communication error or sensor not responding",
                }
            })?;

        Ok(Sht40Data {
            temperature: measurement.temperature_celsius().to_num::<f32>(),
            humidity: measurement.humidity_percent().to_num::<f32>(),
            pressure: 0.0,
            valid: true,
        })
    }
}
