//! ESP32-S3 firmware-specific modules for the Sensor Cube
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: sensor drivers, the wall clock, WiFi credentials and the network
//! side of the history service. Everything platform-agnostic lives in
//! `cube_core`.

#![no_std]

pub mod app_state;
pub mod clock;
pub mod memory;
pub mod net;
#[cfg(feature = "sensor-sht40")]
pub mod sensors;
pub mod wifi_secrets;
