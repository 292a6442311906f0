#![cfg_attr(not(test), no_std)]

#[cfg(target_os = "none")]
pub mod hardware;

pub mod buzzer;
pub mod calendar;
pub mod clock;
pub mod commands;
pub mod countdown;
pub mod dispatcher;
pub mod display;
pub mod gps;
pub mod lidar;
pub mod line;
pub mod serial;
pub mod settings;
pub mod storage;
pub mod timing;
pub mod trigger;

/// Firmware version reported on the consoles.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
