//! # Chronometer firmware
//!
//! Hardware specific setup etc.

pub use stm32h7xx_hal as hal;

pub mod board;
pub mod flash;
pub mod gpio;
pub mod metadata;
pub mod setup;
pub mod system_timer;
pub mod uart;
pub mod usb;

/// Independent watchdog window. Covers the longest dispatcher step, a flash sector erase.
pub const WATCHDOG_TIMEOUT_MS: u32 = 4_000;

/// HSE startup wait, in status register polls.
pub const HSE_READY_POLLS: u32 = 100_000;
