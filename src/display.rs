//! # Display frames
//!
//! The dispatcher decides *what* to show as a [Frame]; turning a frame into pixels is up to the
//! board's display driver. [Frame] implements `Display` with the text each frame carries, which
//! is what a character display (or a log) shows.

use core::fmt;

use crate::calendar::{Precision, Timestamp};
use crate::countdown::CountdownFrame;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Boot banner.
    Splash,
    /// Time of the last accepted shot, shown once per event.
    Shot(Timestamp),
    /// Live clock. While a start is armed the mode letter and the minutes left are overlaid.
    Clock {
        now: Timestamp,
        marker: Option<(char, u8)>,
    },
    /// Seconds left until the start.
    Remaining(u8),
    Start,
}

impl Frame {
    /// The frame for the live view in the current second.
    pub fn live(now: Timestamp, countdown: CountdownFrame) -> Self {
        match countdown {
            CountdownFrame::Clock => Frame::Clock { now, marker: None },
            CountdownFrame::Marked { mode, minutes } => Frame::Clock {
                now,
                marker: Some((mode, minutes)),
            },
            CountdownFrame::Remaining(n) => Frame::Remaining(n),
            CountdownFrame::Start => Frame::Start,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Splash => f.write_str("Chrono"),
            // the display has room for hundredths only
            Frame::Shot(stamp) => f.write_str(&stamp.time_of_day(Precision::Hundredths)),
            Frame::Clock { now, marker } => {
                f.write_str(&now.time_of_day(Precision::Seconds))?;
                if let Some((mode, minutes)) = marker {
                    write!(f, " {mode}{minutes}")?;
                }
                Ok(())
            }
            Frame::Remaining(n) => write!(f, "{n}"),
            Frame::Start => f.write_str("START!"),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::string::ToString;

    use super::*;
    use crate::calendar::CalendarTime;

    #[test]
    fn text() {
        let now = Timestamp::new(
            CalendarTime {
                hour: 9,
                minute: 5,
                second: 28,
                ..CalendarTime::EPOCH
            },
            987,
        );
        assert_eq!(Frame::Shot(now).to_string(), "09:05:28.98");
        assert_eq!(Frame::live(now, CountdownFrame::Clock).to_string(), "09:05:28");
        assert_eq!(
            Frame::live(now, CountdownFrame::Marked { mode: 'A', minutes: 3 }).to_string(),
            "09:05:28 A3"
        );
        assert_eq!(Frame::live(now, CountdownFrame::Remaining(12)).to_string(), "12");
        assert_eq!(Frame::live(now, CountdownFrame::Start).to_string(), "START!");
    }
}
