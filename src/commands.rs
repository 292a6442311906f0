//! # Command shell
//!
//! Lines received on any console are handed to a [CommandParser]. The parser never blocks and
//! reports its own errors on the output it is given. Actions that need the board (saving the
//! settings, resetting) are returned through the [Session] and executed by the dispatcher.

use core::fmt::{self, Write as _};

use heapless::String;
use strum::IntoEnumIterator;

use crate::calendar::Timestamp;
use crate::countdown::Countdown;
use crate::gps::GpsStatus;
use crate::settings::{self, Settings};
use crate::trigger::{ShotRecord, TRIGGERS};

/// Longest accepted countdown in minutes.
const MAX_START_MINUTES: u8 = 99;

/// Longest rendered setting value.
const VALUE_SIZE: usize = 32;

/// Board actions requested by a command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Save,
    Reset,
}

/// The state a command may inspect or change.
pub struct Session<'a> {
    pub settings: &'a mut Settings,
    pub countdown: &'a mut Countdown,
    pub now: Timestamp,
    pub shots: [ShotRecord; TRIGGERS],
    pub gps: GpsStatus,
    pub action: Option<Action>,
}

pub trait CommandParser {
    /// Execute one line.
    ///
    /// # Args
    /// * `line` - Received line, possibly with its terminator.
    /// * `session` - State available to commands.
    /// * `out` - Sink for the textual response.
    fn parse(&mut self, line: &[u8], session: &mut Session<'_>, out: &mut dyn fmt::Write);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::EnumString, strum::AsRefStr, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
enum Command {
    Help,
    Version,
    Time,
    Shots,
    Gps,
    Start,
    Autostart,
    Stop,
    Get,
    Set,
    Dump,
    Save,
    Reset,
}

impl Command {
    fn usage(self) -> &'static str {
        match self {
            Self::Help => "list commands",
            Self::Version => "firmware version",
            Self::Time => "current date and time",
            Self::Shots => "last accepted shot of every channel",
            Self::Gps => "GPS fix status",
            Self::Start => "<min>: single start after <min> minutes",
            Self::Autostart => "<min>: repeated start every <min> minutes",
            Self::Stop => "cancel the countdown",
            Self::Get => "<path>: show a setting, e.g. pause_ms/2",
            Self::Set => "<path> <json>: change a setting",
            Self::Dump => "all settings as JSON",
            Self::Save => "store the settings in flash",
            Self::Reset => "restart the device",
        }
    }
}

/// Write the report line of an accepted shot.
pub fn report_shot(out: &mut dyn fmt::Write, channel: usize, shot: &ShotRecord) -> fmt::Result {
    writeln!(out, "TRIG{channel}={}", shot.stamp)
}

#[derive(Debug)]
enum Error {
    Utf8,
    UnknownCommand,
    MissingArgument,
    Minutes,
    Armed,
    Settings(settings::Error),
}

impl From<settings::Error> for Error {
    fn from(e: settings::Error) -> Self {
        Self::Settings(e)
    }
}

/// The default command set.
#[derive(Copy, Clone, Debug, Default)]
pub struct Shell;

impl Shell {
    fn execute<'a>(
        &mut self,
        mut words: impl Iterator<Item = &'a str>,
        session: &mut Session<'_>,
        out: &mut dyn fmt::Write,
    ) -> Result<(), Error> {
        let Some(word) = words.next() else {
            return Ok(());
        };
        let command: Command = word.parse().map_err(|_| Error::UnknownCommand)?;
        match command {
            Command::Help => {
                for c in Command::iter() {
                    writeln!(out, "{:<10}{}", c.as_ref(), c.usage()).ok();
                }
                writeln!(out, "setting paths follow dump, array elements by index").ok();
            }
            Command::Version => {
                writeln!(out, "Chronometer version {}", crate::VERSION).ok();
            }
            Command::Time => {
                writeln!(out, "TIME={}", session.now).ok();
            }
            Command::Shots => {
                for (channel, shot) in session.shots.iter().enumerate() {
                    report_shot(out, channel, shot).ok();
                }
            }
            Command::Gps => {
                writeln!(out, "GPS={}", session.gps.as_ref()).ok();
            }
            Command::Start | Command::Autostart => {
                let minutes: u8 = words
                    .next()
                    .ok_or(Error::MissingArgument)?
                    .parse()
                    .map_err(|_| Error::Minutes)?;
                if !(1..=MAX_START_MINUTES).contains(&minutes) {
                    return Err(Error::Minutes);
                }
                if command == Command::Start {
                    session.countdown.arm_manual(minutes);
                } else {
                    session.countdown.arm_auto(minutes);
                }
                writeln!(out, "OK").ok();
            }
            Command::Stop => {
                session.countdown.disarm();
                writeln!(out, "OK").ok();
            }
            Command::Get => {
                let key = words.next().ok_or(Error::MissingArgument)?;
                let mut value: String<VALUE_SIZE> = String::new();
                session.settings.get(key, &mut value)?;
                writeln!(out, "{}={value}", key.trim_start_matches('/')).ok();
            }
            Command::Set => {
                let key = words.next().ok_or(Error::MissingArgument)?;
                let value = words.next().ok_or(Error::MissingArgument)?;
                let geometry = matches!(
                    key.trim_start_matches('/'),
                    "start_second" | "countdown_seconds"
                );
                if geometry && session.countdown.is_armed() {
                    return Err(Error::Armed);
                }
                session.settings.set(key, value)?;
                if geometry {
                    *session.countdown =
                        Countdown::new(session.settings.start_second, session.settings.countdown_seconds);
                }
                writeln!(out, "OK").ok();
            }
            Command::Dump => {
                let mut buf = [0u8; 384];
                match session.settings.dump(&mut buf) {
                    Some(json) => writeln!(out, "{json}").ok(),
                    None => writeln!(out, "ERR dump").ok(),
                };
            }
            Command::Save => {
                session.action = Some(Action::Save);
            }
            Command::Reset => {
                writeln!(out, "Reset").ok();
                session.action = Some(Action::Reset);
            }
        }
        Ok(())
    }
}

impl CommandParser for Shell {
    fn parse(&mut self, line: &[u8], session: &mut Session<'_>, out: &mut dyn fmt::Write) {
        let result = core::str::from_utf8(crate::line::trim_line(line))
            .map_err(|_| Error::Utf8)
            .and_then(|line| self.execute(line.split_ascii_whitespace(), session, out));
        if let Err(e) = result {
            log::debug!("Command failed: {e:?}");
            let msg = match e {
                Error::Utf8 => "not text",
                Error::UnknownCommand => "unknown command, try help",
                Error::MissingArgument => "missing argument",
                Error::Minutes => "minutes out of range",
                Error::Armed => "countdown running",
                Error::Settings(settings::Error::Path) => "unknown setting",
                Error::Settings(_) => "bad value",
            };
            writeln!(out, "ERR {msg}").ok();
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::string::String;

    use super::*;
    use crate::calendar::CalendarTime;
    use crate::countdown::CountdownState;

    struct Fixture {
        settings: Settings,
        countdown: Countdown,
    }

    impl Fixture {
        fn new() -> Self {
            let settings = Settings::default();
            Self {
                countdown: Countdown::new(settings.start_second, settings.countdown_seconds),
                settings,
            }
        }

        fn run(&mut self, line: &str) -> (String, Option<Action>) {
            let mut session = Session {
                settings: &mut self.settings,
                countdown: &mut self.countdown,
                now: Timestamp::new(
                    CalendarTime {
                        year: 2024,
                        month: 7,
                        day: 14,
                        hour: 10,
                        minute: 0,
                        second: 5,
                    },
                    250,
                ),
                shots: Default::default(),
                gps: GpsStatus::NotValid,
                action: None,
            };
            let mut out = String::new();
            Shell.parse(line.as_bytes(), &mut session, &mut out);
            (out, session.action)
        }
    }

    #[test]
    fn queries() {
        let mut f = Fixture::new();
        assert_eq!(f.run("time\r\n").0, "TIME=2024-07-14 10:00:05.250\n");
        assert_eq!(f.run("gps\n").0, "GPS=NotValid\n");
        assert!(f.run("version\n").0.starts_with("Chronometer version "));
        let shots = f.run("shots\n").0;
        assert_eq!(shots.lines().count(), TRIGGERS);
        assert!(shots.starts_with("TRIG0=2000-01-01 00:00:00.000\n"));
        assert!(f.run("help\n").0.contains("autostart"));
    }

    #[test]
    fn countdown_commands() {
        let mut f = Fixture::new();
        assert_eq!(f.run("start 3\n").0, "OK\n");
        assert_eq!(f.countdown.state(), CountdownState::ArmedManual);
        assert_eq!(f.countdown.minutes(), 3);
        assert_eq!(f.run("autostart 0\n").0, "ERR minutes out of range\n");
        assert_eq!(f.run("set start_second 30\n").0, "ERR countdown running\n");
        f.run("stop\n");
        assert!(!f.countdown.is_armed());
        f.run("autostart 2\n");
        assert_eq!(f.countdown.state(), CountdownState::ArmedAuto);
    }

    #[test]
    fn settings_commands() {
        let mut f = Fixture::new();
        assert_eq!(f.run("set pause_ms/1 75\n").0, "OK\n");
        assert_eq!(f.run("get pause_ms/1\n").0, "pause_ms/1=75\n");
        assert_eq!(f.run("get /pause_ms/9\n").0, "ERR unknown setting\n");
        assert_eq!(f.run("set gps_proxy true\n").0, "OK\n");
        assert_eq!(f.run("get /gps_proxy\n").0, "gps_proxy=true\n");
        assert_eq!(f.run("set gps_proxy 1\n").0, "ERR bad value\n");
        assert_eq!(f.run("set bogus 1\n").0, "ERR unknown setting\n");
        assert_eq!(f.run("set buzzer_ms\n").0, "ERR missing argument\n");
        assert_eq!(f.run("set countdown_seconds 5\n").0, "OK\n");
        assert_eq!(f.countdown.threshold_second(), 54);
        assert!(f.run("dump\n").0.contains("\"pause_ms\":[400,75,400,400]"));
    }

    #[test]
    fn actions_and_errors() {
        let mut f = Fixture::new();
        assert_eq!(f.run("save\n"), (String::new(), Some(Action::Save)));
        assert_eq!(f.run("reset\n").1, Some(Action::Reset));
        assert_eq!(f.run("launch\n").0, "ERR unknown command, try help\n");
        assert_eq!(f.run("   \n"), (String::new(), None));
    }
}
