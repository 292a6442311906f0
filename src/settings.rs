//! # Runtime settings
//!
//! Settings are loaded once at boot, before any pin is configured: the trigger wiring in
//! [Settings::channels] is fixed from then on. Everything else may be changed at runtime through
//! the command shell, which addresses single values by their `miniconf` path (`/pause_ms/2`).
//! Persistence lives in [crate::storage].

use core::fmt;

use heapless::String;
use miniconf::Tree;
use serde::{Deserialize, Serialize};

use crate::trigger::{Channels, TriggerConfig, TRIGGERS};

/// Longest accepted settings path.
pub const PATH_SIZE: usize = 32;

/// Upper bound of one rendered value.
const VALUE_SIZE: usize = 32;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The stored record could not be decoded.
    Decode(postcard::Error),
    Encode(postcard::Error),
    /// No setting at this path.
    Path,
    /// Value could not be parsed or is out of range.
    Value,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Tree)]
pub struct Settings {
    /// Channel is triggered by a high level.
    pub trigger_high: [bool; TRIGGERS],
    /// Channel input has its pull-up enabled.
    pub pullup: [bool; TRIGGERS],
    /// Per-channel minimum spacing between accepted shots.
    pub pause_ms: [u32; TRIGGERS],
    /// Bridge the auxiliary UART to the GPS receiver instead of running a console on it.
    pub gps_proxy: bool,
    /// No range finder attached: the LIDAR UART is an additional console.
    pub no_lidar: bool,
    /// Show the clock on the display.
    pub show_time: bool,
    /// Show the time of the last shot on the display.
    pub show_shot: bool,
    /// How long a shot is shown after it happened.
    pub show_duration_ms: u32,
    /// Buzzer length after a shot, 0 disables the buzzer.
    pub buzzer_ms: u32,
    /// Calendar second at which a start is announced.
    pub start_second: u8,
    /// Length of the visible countdown preceding a start.
    pub countdown_seconds: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // idle high with pull-up, a contact to ground triggers
            trigger_high: [false; TRIGGERS],
            pullup: [true; TRIGGERS],
            pause_ms: [400; TRIGGERS],
            gps_proxy: false,
            no_lidar: false,
            show_time: true,
            show_shot: true,
            show_duration_ms: 3000,
            buzzer_ms: 250,
            start_second: 59,
            countdown_seconds: 31,
        }
    }
}

/// Normalize a shell key (`pause_ms/2` or `/pause_ms/2`) into a tree path.
fn path(key: &str) -> Result<String<PATH_SIZE>, Error> {
    let mut path = String::new();
    if !key.starts_with('/') {
        path.push('/').map_err(|_| Error::Path)?;
    }
    path.push_str(key).map_err(|_| Error::Path)?;
    Ok(path)
}

impl Settings {
    /// Decode a stored record.
    pub fn load(bytes: &[u8]) -> Result<Self, Error> {
        postcard::from_bytes(bytes).map_err(Error::Decode)
    }

    /// Encode for storage.
    ///
    /// # Returns
    /// The used part of `buf`.
    pub fn store<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], Error> {
        postcard::to_slice(self, buf).map_err(Error::Encode)
    }

    /// Trigger wiring derived from the settings.
    pub fn channels(&self) -> Channels<TRIGGERS> {
        Channels::new(core::array::from_fn(|i| TriggerConfig {
            edge_polarity: self.trigger_high[i],
            pullup_enabled: self.pullup[i],
            pause_ms: self.pause_ms[i],
        }))
    }

    /// Cross-field constraints of the countdown geometry.
    fn validate(&self) -> Result<(), Error> {
        if self.start_second > 59 || self.countdown_seconds > self.start_second {
            return Err(Error::Value);
        }
        Ok(())
    }

    /// Write the JSON value of a single setting.
    pub fn get(&self, key: &str, out: &mut dyn fmt::Write) -> Result<(), Error> {
        let mut buf = [0u8; VALUE_SIZE];
        let len = miniconf::json::get(self, path(key)?.as_str(), &mut buf).map_err(|_| Error::Path)?;
        let value = core::str::from_utf8(&buf[..len]).map_err(|_| Error::Value)?;
        // truncated output is not a settings error
        out.write_str(value).ok();
        Ok(())
    }

    /// Change a single setting from its JSON value.
    ///
    /// The change is only applied if the result is consistent.
    ///
    /// # Note
    /// Trigger wiring changes only take effect after they were saved and the device was reset.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let path = path(key)?;
        let mut current = [0u8; VALUE_SIZE];
        miniconf::json::get(self, path.as_str(), &mut current).map_err(|_| Error::Path)?;
        let mut next = *self;
        miniconf::json::set(&mut next, path.as_str(), value.as_bytes()).map_err(|_| Error::Value)?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Render all settings as JSON.
    pub fn dump<'a>(&self, buf: &'a mut [u8]) -> Option<&'a str> {
        let len = serde_json_core::to_slice(self, buf).ok()?;
        core::str::from_utf8(&buf[..len]).ok()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::string::String;

    use super::*;

    #[test]
    fn record_survives_storage() {
        let mut s = Settings::default();
        s.pause_ms[2] = 75;
        s.gps_proxy = true;
        let mut buf = [0u8; 128];
        let stored = s.store(&mut buf).unwrap().to_vec();
        assert_eq!(Settings::load(&stored).unwrap(), s);
        assert!(matches!(Settings::load(&stored[..4]), Err(Error::Decode(_))));
    }

    #[test]
    fn channels_follow_flags() {
        let s = Settings {
            trigger_high: [true, false, true, false],
            pullup: [false, true, false, false],
            pause_ms: [10, 20, 30, 40],
            ..Default::default()
        };
        let channels = s.channels();
        let ch1 = channels.get(1).unwrap();
        assert!(!ch1.edge_polarity);
        assert!(ch1.pullup_enabled);
        assert_eq!(ch1.pause_ms, 20);
        assert!(channels.get(2).unwrap().edge_polarity);
        assert!(channels.get(TRIGGERS).is_none());
    }

    #[test]
    fn set_and_get_by_path() {
        let mut s = Settings::default();
        s.set("pause_ms/3", "120").unwrap();
        s.set("/trigger_high/0", "true").unwrap();
        s.set("no_lidar", "true").unwrap();
        assert_eq!(s.pause_ms[3], 120);
        assert!(s.trigger_high[0]);
        assert!(s.no_lidar);

        assert_eq!(s.set("pause_ms/4", "1"), Err(Error::Path));
        assert_eq!(s.set("pause_ms", "1"), Err(Error::Path));
        assert_eq!(s.set("bogus", "1"), Err(Error::Path));
        assert_eq!(s.set("buzzer_ms", "x"), Err(Error::Value));
        assert_eq!(s.set("gps_proxy", "1"), Err(Error::Value));

        let mut out = String::new();
        s.get("pause_ms/3", &mut out).unwrap();
        out.push(' ');
        s.get("/no_lidar", &mut out).unwrap();
        assert_eq!(out, "120 true");
        assert_eq!(s.get("show", &mut out), Err(Error::Path));
    }

    #[test]
    fn countdown_geometry_stays_consistent() {
        let mut s = Settings::default();
        assert_eq!(s.set("start_second", "60"), Err(Error::Value));
        assert_eq!(s.set("countdown_seconds", "5"), Ok(()));
        assert_eq!(s.set("start_second", "33"), Ok(()));
        assert_eq!(s.set("countdown_seconds", "40"), Err(Error::Value));
        assert_eq!(s.set("start_second", "4"), Err(Error::Value));
        assert_eq!((s.start_second, s.countdown_seconds), (33, 5));
    }

    #[test]
    fn dump_is_json() {
        let mut buf = [0u8; 512];
        let json = Settings::default().dump(&mut buf).unwrap();
        assert!(json.starts_with(
            "{\"trigger_high\":[false,false,false,false],\"pullup\":[true,true,true,true],\"pause_ms\":[400,400,400,400]"
        ));
        assert!(json.ends_with("\"start_second\":59,\"countdown_seconds\":31}"));
    }
}
