use serde::Serialize;

use super::WATCHDOG_TIMEOUT_MS;
use crate::clock::TICK_HZ;
use crate::trigger::TRIGGERS;

mod build_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Why the device came up, from the RCC reset status flags.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ResetCause {
    PowerOn,
    Watchdog,
    /// `reset` command or panic.
    Software,
    Pin,
    Other,
}

#[derive(Serialize, Debug)]
pub struct ApplicationMetadata {
    pub app: &'static str,
    pub firmware_version: &'static str,
    pub rust_version: &'static str,
    pub profile: &'static str,
    pub features: &'static str,
    pub reset_cause: ResetCause,
    /// System clock derived from the crystal, HSI otherwise.
    pub hse: bool,
    pub triggers: usize,
    pub tick_hz: u32,
    pub watchdog_ms: u32,
}

impl ApplicationMetadata {
    /// Construct the global metadata.
    ///
    /// # Note
    /// This may only be called once.
    ///
    /// # Returns
    /// A reference to the global metadata.
    pub fn new(reset_cause: ResetCause, hse: bool) -> &'static ApplicationMetadata {
        cortex_m::singleton!(: ApplicationMetadata = ApplicationMetadata {
            app: env!("CARGO_PKG_NAME"),
            firmware_version: build_info::PKG_VERSION,
            rust_version: build_info::RUSTC_VERSION,
            profile: build_info::PROFILE,
            features: build_info::FEATURES_STR,
            reset_cause,
            hse,
            triggers: TRIGGERS,
            tick_hz: TICK_HZ,
            watchdog_ms: WATCHDOG_TIMEOUT_MS,
        })
        .unwrap()
    }
}
