//! # Calendar time
//!
//! Wall-clock date and time of day, advanced one second at a time by the tick
//! interrupt and replaced wholesale by the PPS discipline.

use core::fmt;

/// Date and time of day with one second resolution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CalendarTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl CalendarTime {
    /// Power-on value until the GPS collaborator delivers a fix.
    pub const EPOCH: Self = Self {
        year: 2000,
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
    };

    /// Advance by exactly one second, carrying into the higher fields.
    pub fn increment(&mut self) {
        self.second += 1;
        if self.second < 60 {
            return;
        }
        self.second = 0;
        self.minute += 1;
        if self.minute < 60 {
            return;
        }
        self.minute = 0;
        self.hour += 1;
        if self.hour < 24 {
            return;
        }
        self.hour = 0;
        self.day += 1;
        if self.day <= days_in_month(self.year, self.month) {
            return;
        }
        self.day = 1;
        self.month += 1;
        if self.month <= 12 {
            return;
        }
        self.month = 1;
        self.year = self.year.wrapping_add(1);
    }

    /// Check the fields against the calendar. Used to reject bogus GPS data.
    pub fn is_valid(&self) -> bool {
        (1..=12).contains(&self.month)
            && self.day >= 1
            && self.day <= days_in_month(self.year, self.month)
            && self.hour < 24
            && self.minute < 60
            && self.second < 60
    }
}

impl Default for CalendarTime {
    fn default() -> Self {
        Self::EPOCH
    }
}

impl fmt::Display for CalendarTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

fn is_leap(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if is_leap(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// A CalendarTime together with the millisecond within that second, taken in
/// one piece at capture time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub time: CalendarTime,
    pub millis: u16,
}

/// Display precision of a rendered timestamp.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Precision {
    Seconds,
    Hundredths,
    Millis,
}

impl Timestamp {
    pub const fn new(time: CalendarTime, millis: u16) -> Self {
        Self { time, millis }
    }

    /// Time of day as `HH:MM:SS[.ff[f]]`.
    pub fn time_of_day(&self, precision: Precision) -> heapless::String<12> {
        use core::fmt::Write;
        let t = &self.time;
        let mut s = heapless::String::new();
        // Note(unwrap): at most 12 characters are written.
        write!(s, "{:02}:{:02}:{:02}", t.hour, t.minute, t.second).unwrap();
        match precision {
            Precision::Seconds => {}
            Precision::Hundredths => write!(s, ".{:02}", self.millis / 10).unwrap(),
            Precision::Millis => write!(s, ".{:03}", self.millis).unwrap(),
        }
        s
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.time, self.millis)
    }
}
