//! # Clock arithmetic and PPS discipline
//!
//! The free-running counters themselves live in [crate::timing::TimingCore].
//! This module holds the arithmetic that operates on them.
//!
//! # Design
//! `millis_total` is a `u32` that wraps after ~49.7 days. It is never corrected; every consumer
//! compares instants with [elapsed], which is correct across the wrap as long as the compared
//! instants are less than one wrap period apart.

/// Tick interrupt rate.
pub const TICK_HZ: u32 = 1_000;

/// Sub-second ticks per calendar second.
pub const SUBSEC_PER_SECOND: u16 = 1_000;

/// Milliseconds elapsed from `since` to `now`, wraparound safe.
#[inline]
pub fn elapsed(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Advance the sub-second counter by one tick.
///
/// # Returns
/// The new counter value and whether a calendar second rolled over.
#[inline]
pub fn advance_subsec(subsec: u16) -> (u16, bool) {
    let next = subsec + 1;
    if next >= SUBSEC_PER_SECOND {
        (0, true)
    } else {
        (next, false)
    }
}

/// Signed offset of the local second boundary against a PPS edge observed at `subsec`.
///
/// Positive values mean the local clock runs fast (the second already rolled over before the
/// pulse arrived), negative values mean it runs slow.
pub fn pps_drift(subsec: u16) -> i16 {
    if subsec >= SUBSEC_PER_SECOND / 2 {
        subsec as i16 - SUBSEC_PER_SECOND as i16
    } else {
        subsec as i16
    }
}

/// Accepted spacing of two PPS edges, in local milliseconds, for the later one to carry a
/// frequency reading.
pub const PPS_INTERVAL_MS: core::ops::RangeInclusive<u32> = 950..=1050;

/// Proportional trim of the tick timer reload value from successive PPS drift readings.
///
/// A drift reading is only a frequency error if the previous edge was seen one second earlier.
/// The first edge after boot, or the first after lost pulses, carries an arbitrary phase offset:
/// it realigns the second boundary and arms the discipline but leaves the trim untouched.
#[derive(Copy, Clone, Debug)]
pub struct PpsDiscipline {
    nominal: u32,
    trim: i32,
    last_edge: Option<u32>,
}

impl PpsDiscipline {
    /// Construct the discipline.
    ///
    /// # Args
    /// * `nominal` - Tick timer reload value (timer counts per tick) at the nominal timer clock.
    pub const fn new(nominal: u32) -> Self {
        Self {
            nominal,
            trim: 0,
            last_edge: None,
        }
    }

    /// Fold in a drift reading and return the reload value to program.
    ///
    /// A drift of `d` ms over one second needs each of the 1000 ticks stretched by
    /// `d * nominal / 1000` counts. Half of that is applied per pulse, bounded to 2 % of nominal.
    ///
    /// # Args
    /// * `drift_ms` - Offset of the local second boundary at this edge, see [pps_drift].
    /// * `millis` - Free-running millisecond counter at this edge.
    pub fn update(&mut self, drift_ms: i16, millis: u32) -> u32 {
        let previous = self.last_edge.replace(millis);
        match previous {
            Some(since) if PPS_INTERVAL_MS.contains(&elapsed(millis, since)) => {}
            _ => return self.reload(),
        }
        let limit = (self.nominal / 50) as i32;
        let step = (drift_ms as i64 * self.nominal as i64 / (2 * TICK_HZ as i64)) as i32;
        self.trim = (self.trim + step).clamp(-limit, limit);
        self.reload()
    }

    pub fn reload(&self) -> u32 {
        (self.nominal as i64 + self.trim as i64) as u32
    }

    pub fn trim(&self) -> i32 {
        self.trim
    }
}

/// A bounded wait gave up.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timeout;

/// Spin until `ready` returns true, at most `max_iterations` times.
///
/// Used for peripheral readiness flags during boot: a flag that never comes up must not hang the
/// boot sequence, the caller logs the timeout and continues degraded.
pub fn bounded_wait(max_iterations: u32, mut ready: impl FnMut() -> bool) -> Result<u32, Timeout> {
    for i in 0..max_iterations {
        if ready() {
            return Ok(i);
        }
    }
    Err(Timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_across_wrap() {
        assert_eq!(elapsed(1030, 1000), 30);
        assert_eq!(elapsed(5, u32::MAX - 4), 10);
        assert!(elapsed(5, u32::MAX - 4) <= 50);
    }

    #[test]
    fn subsec_rolls_at_thousand() {
        assert_eq!(advance_subsec(0), (1, false));
        assert_eq!(advance_subsec(998), (999, false));
        assert_eq!(advance_subsec(999), (0, true));
    }

    #[test]
    fn drift_sign() {
        assert_eq!(pps_drift(0), 0);
        assert_eq!(pps_drift(3), 3);
        assert_eq!(pps_drift(998), -2);
        assert_eq!(pps_drift(500), -500);
    }

    #[test]
    fn discipline_is_bounded() {
        let mut d = PpsDiscipline::new(200_000);
        let mut millis = 0;
        let mut edge = |d: &mut PpsDiscipline, drift| {
            millis += 1000;
            d.update(drift, millis)
        };
        assert_eq!(edge(&mut d, 0), 200_000);
        // 1 ms fast: stretch by 100 counts per tick (half of 200)
        assert_eq!(edge(&mut d, 1), 200_100);
        assert_eq!(d.trim(), 100);
        for _ in 0..100 {
            edge(&mut d, 100);
        }
        assert_eq!(d.reload(), 204_000);
        for _ in 0..1000 {
            edge(&mut d, -100);
        }
        assert_eq!(d.reload(), 196_000);
    }

    #[test]
    fn first_edge_only_aligns() {
        let mut d = PpsDiscipline::new(200_000);
        // boot phase is arbitrary: 300 ms into the local second
        assert_eq!(d.update(pps_drift(300), 4_300), 200_000);
        assert_eq!(d.trim(), 0);
        // a clean second later the drift is a frequency reading
        assert_eq!(d.update(2, 5_302), 200_200);
    }

    #[test]
    fn lost_pulses_rearm() {
        let mut d = PpsDiscipline::new(200_000);
        d.update(0, 1_000);
        d.update(2, 2_000);
        assert_eq!(d.trim(), 200);
        // three pulses missing, then one arrives off phase
        assert_eq!(d.update(-400, 5_600), 200_200);
        assert_eq!(d.update(1, 6_601), 200_300);
        // and across the counter wrap
        d.update(0, u32::MAX - 499);
        assert_eq!(d.update(0, 500), 200_300);
        assert_eq!(d.update(-1, 1_500), 200_200);
    }

    #[test]
    fn wait_gives_up() {
        assert_eq!(bounded_wait(10, || false), Err(Timeout));
        let mut n = 0;
        assert_eq!(
            bounded_wait(10, || {
                n += 1;
                n == 3
            }),
            Ok(2)
        );
    }
}
