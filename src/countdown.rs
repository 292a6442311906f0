//! # Start countdown
//!
//! A start is armed a number of minutes ahead. Once per calendar second the dispatcher steps the
//! countdown with the current second value. While minutes remain, the live clock is shown with a
//! mode marker; the minute counter drops when the second reaches `start_second -
//! countdown_seconds`. When no minutes remain the final seconds are counted down and the start is
//! announced at `start_second`.

/// Countdown phase.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CountdownState {
    Idle,
    /// One start, then disarm.
    ArmedManual,
    /// Re-arm with the auto interval after every start.
    ArmedAuto,
    /// Final seconds before a start.
    Firing,
}

/// What the display should show for this second.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CountdownFrame {
    /// Not armed, live clock only.
    Clock,
    /// Live clock with the mode letter and minutes remaining overlaid.
    Marked { mode: char, minutes: u8 },
    /// Seconds remaining until the start.
    Remaining(u8),
    /// The start happened this second.
    Start,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Countdown {
    state: CountdownState,
    auto: bool,
    minutes: u8,
    interval: u8,
    seconds: u8,
    start_second: u8,
    countdown_seconds: u8,
}

impl Countdown {
    /// Construct an idle countdown.
    ///
    /// # Args
    /// * `start_second` - Calendar second at which the start is announced.
    /// * `countdown_seconds` - Length of the final visible countdown.
    pub fn new(start_second: u8, countdown_seconds: u8) -> Self {
        let start_second = start_second.min(59);
        Self {
            state: CountdownState::Idle,
            auto: false,
            minutes: 0,
            interval: 0,
            seconds: 0,
            start_second,
            countdown_seconds: countdown_seconds.min(start_second),
        }
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn minutes(&self) -> u8 {
        self.minutes
    }

    pub fn is_armed(&self) -> bool {
        self.state != CountdownState::Idle
    }

    /// Calendar second at which the minute counter is decremented.
    pub fn threshold_second(&self) -> u8 {
        self.start_second - self.countdown_seconds
    }

    /// Arm a single start after `minutes` threshold crossings.
    pub fn arm_manual(&mut self, minutes: u8) {
        self.auto = false;
        self.interval = 0;
        self.arm(minutes);
    }

    /// Arm repeating starts every `minutes`.
    pub fn arm_auto(&mut self, minutes: u8) {
        self.auto = true;
        self.interval = minutes;
        self.arm(minutes);
    }

    fn arm(&mut self, minutes: u8) {
        self.minutes = minutes;
        self.seconds = 0;
        self.state = if self.auto {
            CountdownState::ArmedAuto
        } else {
            CountdownState::ArmedManual
        };
    }

    pub fn disarm(&mut self) {
        self.state = CountdownState::Idle;
        self.auto = false;
        self.minutes = 0;
        self.interval = 0;
        self.seconds = 0;
    }

    /// Step the countdown. Call exactly once per calendar second.
    pub fn on_second(&mut self, second: u8) -> CountdownFrame {
        match self.state {
            CountdownState::Idle => CountdownFrame::Clock,
            CountdownState::ArmedManual | CountdownState::ArmedAuto => {
                if second == self.threshold_second() {
                    self.minutes = self.minutes.saturating_sub(1);
                    if self.minutes == 0 {
                        self.state = CountdownState::Firing;
                        return self.fire(second);
                    }
                }
                CountdownFrame::Marked {
                    mode: if self.auto { 'A' } else { 'O' },
                    minutes: self.minutes,
                }
            }
            CountdownState::Firing => self.fire(second),
        }
    }

    fn fire(&mut self, second: u8) -> CountdownFrame {
        self.seconds = self.start_second.saturating_sub(second);
        if self.seconds != 0 {
            return CountdownFrame::Remaining(self.seconds);
        }
        if self.auto {
            let interval = self.interval;
            self.arm(interval);
        } else {
            self.disarm();
        }
        CountdownFrame::Start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_shows_clock() {
        let mut c = Countdown::new(59, 31);
        assert_eq!(c.on_second(10), CountdownFrame::Clock);
        assert!(!c.is_armed());
        assert_eq!(c.threshold_second(), 28);
    }

    #[test]
    fn manual_start_disarms() {
        // five second countdown ending at second 33
        let mut c = Countdown::new(33, 5);
        c.arm_manual(1);
        assert_eq!(c.state(), CountdownState::ArmedManual);
        assert_eq!(c.on_second(27), CountdownFrame::Marked { mode: 'O', minutes: 1 });
        assert_eq!(c.on_second(28), CountdownFrame::Remaining(5));
        assert_eq!(c.state(), CountdownState::Firing);
        for (second, left) in [(29, 4), (30, 3), (31, 2), (32, 1)] {
            assert_eq!(c.on_second(second), CountdownFrame::Remaining(left));
        }
        assert_eq!(c.on_second(33), CountdownFrame::Start);
        assert_eq!(c.state(), CountdownState::Idle);
        assert_eq!(c.on_second(34), CountdownFrame::Clock);
    }

    #[test]
    fn auto_rearms_with_interval() {
        let mut c = Countdown::new(33, 5);
        c.arm_auto(2);
        assert_eq!(c.on_second(28), CountdownFrame::Marked { mode: 'A', minutes: 1 });
        assert_eq!(c.on_second(40), CountdownFrame::Marked { mode: 'A', minutes: 1 });
        assert_eq!(c.on_second(28), CountdownFrame::Remaining(5));
        for s in 29..33 {
            c.on_second(s);
        }
        assert_eq!(c.on_second(33), CountdownFrame::Start);
        assert_eq!(c.state(), CountdownState::ArmedAuto);
        assert_eq!(c.minutes(), 2);
    }

    #[test]
    fn default_geometry_counts_from_thirty_one() {
        let mut c = Countdown::new(59, 31);
        c.arm_manual(1);
        assert_eq!(c.on_second(28), CountdownFrame::Remaining(31));
        assert_eq!(c.on_second(58), CountdownFrame::Remaining(1));
        assert_eq!(c.on_second(59), CountdownFrame::Start);
    }

    #[test]
    fn disarm_stops() {
        let mut c = Countdown::new(59, 31);
        c.arm_auto(3);
        c.disarm();
        assert_eq!(c.on_second(28), CountdownFrame::Clock);
        assert_eq!(c.minutes(), 0);
    }
}
