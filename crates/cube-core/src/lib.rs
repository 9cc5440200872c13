//! Hardware-independent core library for the Sensor Cube
//!
//! This crate holds the platform-agnostic parts of the cube firmware: the
//! averaged sample records, the fixed-capacity PSRAM history store, the
//! moving-average engine that feeds it, and the packetized JSON query
//! protocol served to dashboard clients.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both the
//! ESP32-S3 target and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod averaging;
pub mod commands;
pub mod config;
pub mod errors;
pub mod history;
pub mod query;
pub mod samples;
pub mod transport;
