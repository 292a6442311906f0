//! # Interrupt-shared timing state
//!
//! # Design
//! All state touched by both the interrupt handlers and the dispatcher lives in one `'static`
//! [TimingCore]. It is never accessed directly; [TimingCore::split] hands out exactly one
//! [IsrDomain] and one [LoopDomain], and the set of methods on each handle is the single-writer
//! rule:
//!
//! | field                         | written by                  | read by              |
//! |-------------------------------|-----------------------------|----------------------|
//! | `millis_total`, `subsec`      | [IsrDomain] (tick, PPS)     | both                 |
//! | CalendarTime                  | [IsrDomain] (tick, PPS)     | both                 |
//! | shot records                  | [IsrDomain] (trigger)       | [LoopDomain]         |
//! | shot register bit set         | [IsrDomain] (trigger)       | [LoopDomain]         |
//! | shot register bit clear       | [LoopDomain]                | -                    |
//! | time mailbox                  | [LoopDomain] posts          | [IsrDomain] takes    |
//!
//! The interrupt domain runs at a single priority level, so its handlers never preempt each
//! other. Multi-word values (CalendarTime with `subsec`, the shot records) are accessed inside a
//! critical section so that the dispatcher never observes a partial update.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

use critical_section::Mutex;

use crate::calendar::{CalendarTime, Timestamp};
use crate::clock::{advance_subsec, elapsed, pps_drift};
use crate::trigger::{Channels, ShotRecord, ShotRegister, TriggerLevels, TriggerVector};

/// Shared timing state for `N` trigger channels.
pub struct TimingCore<const N: usize> {
    millis_total: AtomicU32,
    subsec: AtomicU16,
    calendar: Mutex<Cell<CalendarTime>>,
    records: [Mutex<Cell<ShotRecord>>; N],
    shots: ShotRegister,
    mailbox: Mutex<Cell<Option<CalendarTime>>>,
    taken: AtomicBool,
}

impl<const N: usize> TimingCore<N> {
    pub const fn new() -> Self {
        const { assert!(N <= 8, "the shot register holds at most 8 channels") };
        Self {
            millis_total: AtomicU32::new(0),
            subsec: AtomicU16::new(0),
            calendar: Mutex::new(Cell::new(CalendarTime::EPOCH)),
            records: [const {
                Mutex::new(Cell::new(ShotRecord {
                    millis: 0,
                    stamp: Timestamp::new(CalendarTime::EPOCH, 0),
                }))
            }; N],
            shots: ShotRegister::new(),
            mailbox: Mutex::new(Cell::new(None)),
            taken: AtomicBool::new(false),
        }
    }

    /// Split into the interrupt-domain and dispatcher-domain handles.
    ///
    /// # Args
    /// * `channels` - Trigger wiring as configured at boot.
    ///
    /// # Returns
    /// The handles on the first call, `None` afterwards.
    pub fn split(&'static self, channels: Channels<N>) -> Option<(IsrDomain<N>, LoopDomain<N>)> {
        if self.taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some((
            IsrDomain {
                core: self,
                channels,
            },
            LoopDomain {
                core: self,
                channels,
            },
        ))
    }

    fn now(&self) -> Timestamp {
        critical_section::with(|cs| {
            Timestamp::new(
                self.calendar.borrow(cs).get(),
                self.subsec.load(Ordering::Relaxed),
            )
        })
    }
}

impl<const N: usize> Default for TimingCore<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The instant seen by one trigger interrupt entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Capture {
    pub millis: u32,
    pub stamp: Timestamp,
}

/// Write handle for the interrupt domain (tick, PPS and trigger handlers).
pub struct IsrDomain<const N: usize> {
    core: &'static TimingCore<N>,
    channels: Channels<N>,
}

impl<const N: usize> IsrDomain<N> {
    /// Periodic 1 kHz tick.
    pub fn tick(&mut self) {
        let core = self.core;
        core.millis_total.fetch_add(1, Ordering::Release);
        let (subsec, rolled) = advance_subsec(core.subsec.load(Ordering::Relaxed));
        if rolled {
            critical_section::with(|cs| {
                let calendar = core.calendar.borrow(cs);
                let mut time = calendar.get();
                time.increment();
                calendar.set(time);
                core.subsec.store(subsec, Ordering::Release);
            });
        } else {
            core.subsec.store(subsec, Ordering::Release);
        }
    }

    /// Realign the second boundary to a PPS edge.
    ///
    /// A time posted through [LoopDomain::post_time] is the time of this edge and replaces the
    /// calendar. Otherwise a second that is due but has not rolled yet is rolled now.
    ///
    /// # Returns
    /// The drift of the local second boundary in ms, positive when the local clock runs fast.
    pub fn pps(&mut self) -> i16 {
        let core = self.core;
        critical_section::with(|cs| {
            let subsec = core.subsec.load(Ordering::Relaxed);
            let drift = pps_drift(subsec);
            let calendar = core.calendar.borrow(cs);
            if let Some(time) = core.mailbox.borrow(cs).take() {
                calendar.set(time);
            } else if drift < 0 {
                let mut time = calendar.get();
                time.increment();
                calendar.set(time);
            }
            core.subsec.store(0, Ordering::Release);
            drift
        })
    }

    /// Snapshot the clock for one trigger interrupt entry.
    pub fn capture(&self) -> Capture {
        let core = self.core;
        critical_section::with(|cs| Capture {
            millis: core.millis_total.load(Ordering::Acquire),
            stamp: Timestamp::new(core.calendar.borrow(cs).get(), core.subsec.load(Ordering::Relaxed)),
        })
    }

    /// Apply the debounce rule to one channel and commit the shot if it passes.
    ///
    /// # Returns
    /// True if the shot was accepted. Out of range channels are ignored.
    pub fn commit(&mut self, capture: &Capture, channel: usize) -> bool {
        let (Some(cfg), Some(record)) = (self.channels.get(channel), self.core.records.get(channel))
        else {
            return false;
        };
        let accepted = critical_section::with(|cs| {
            let record = record.borrow(cs);
            if elapsed(capture.millis, record.get().millis) <= cfg.pause_ms {
                return false;
            }
            record.set(ShotRecord {
                millis: capture.millis,
                stamp: capture.stamp,
            });
            true
        });
        if accepted {
            self.core.shots.set(channel);
        }
        accepted
    }

    /// Service one trigger vector.
    ///
    /// The clock is captured once before any channel is looked at, so every channel serviced by
    /// this entry gets the same instant.
    ///
    /// # Args
    /// * `vector` - The interrupt vector that fired.
    /// * `pending` - Whether the hardware pending flag of a channel is set.
    ///
    /// # Returns
    /// Bitmask of channels whose pending flag must be cleared before returning.
    pub fn handle(&mut self, vector: TriggerVector, mut pending: impl FnMut(usize) -> bool) -> u8 {
        let capture = self.capture();
        let mut serviced = 0;
        for &channel in vector.channels() {
            if channel >= N || !pending(channel) {
                continue;
            }
            self.commit(&capture, channel);
            serviced |= 1 << channel;
        }
        serviced
    }

    pub fn millis(&self) -> u32 {
        self.core.millis_total.load(Ordering::Acquire)
    }
}

/// Read handle for the dispatcher.
pub struct LoopDomain<const N: usize> {
    core: &'static TimingCore<N>,
    channels: Channels<N>,
}

impl<const N: usize> LoopDomain<N> {
    pub fn millis(&self) -> u32 {
        self.core.millis_total.load(Ordering::Acquire)
    }

    pub fn subsec(&self) -> u16 {
        self.core.subsec.load(Ordering::Acquire)
    }

    /// Current calendar time and sub-second value, mutually consistent.
    pub fn now(&self) -> Timestamp {
        self.core.now()
    }

    /// Bitmask of channels with an unconsumed shot.
    pub fn pending(&self) -> u8 {
        self.core.shots.load()
    }

    /// Committed record of the last accepted shot of a channel.
    pub fn shot(&self, channel: usize) -> Option<ShotRecord> {
        let record = self.core.records.get(channel)?;
        Some(critical_section::with(|cs| record.borrow(cs).get()))
    }

    /// Mark a channel's shot as consumed.
    pub fn release(&mut self, channel: usize) {
        if channel < N {
            self.core.shots.clear(channel);
        }
    }

    pub fn gettrig(&self, channel: usize, levels: &impl TriggerLevels) -> bool {
        self.channels.gettrig(channel, levels)
    }

    pub fn channels(&self) -> &Channels<N> {
        &self.channels
    }

    /// Hand the time of the next PPS edge to the interrupt domain.
    pub fn post_time(&mut self, time: CalendarTime) {
        critical_section::with(|cs| self.core.mailbox.borrow(cs).set(Some(time)));
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::boxed::Box;

    use super::*;
    use crate::trigger::{TriggerConfig, TRIGGERS};

    fn domains(pause_ms: u32) -> (IsrDomain<TRIGGERS>, LoopDomain<TRIGGERS>) {
        let core: &'static TimingCore<TRIGGERS> = Box::leak(Box::new(TimingCore::new()));
        let cfg = TriggerConfig {
            edge_polarity: false,
            pullup_enabled: true,
            pause_ms,
        };
        core.split(Channels::new([cfg; TRIGGERS])).unwrap()
    }

    fn advance(isr: &mut IsrDomain<TRIGGERS>, ms: u32) {
        for _ in 0..ms {
            isr.tick();
        }
    }

    #[test]
    fn split_once() {
        let core: &'static TimingCore<TRIGGERS> = Box::leak(Box::new(TimingCore::new()));
        let channels = Channels::new([TriggerConfig::default(); TRIGGERS]);
        assert!(core.split(channels).is_some());
        assert!(core.split(channels).is_none());
    }

    #[test]
    fn tick_rolls_calendar_once_per_thousand() {
        let (mut isr, clock) = domains(0);
        advance(&mut isr, 999);
        assert_eq!(clock.now().time.second, 0);
        assert_eq!(clock.subsec(), 999);
        isr.tick();
        assert_eq!(clock.now(), Timestamp::new(CalendarTime { second: 1, ..CalendarTime::EPOCH }, 0));
        advance(&mut isr, 2500);
        assert_eq!(clock.now().time.second, 3);
        assert_eq!(clock.subsec(), 500);
        assert_eq!(clock.millis(), 3500);
    }

    #[test]
    fn debounce_window() {
        let (mut isr, mut clock) = domains(50);
        advance(&mut isr, 1000);
        assert_eq!(isr.handle(TriggerVector::Exti15_10, |ch| ch == 0), 0b01);
        assert_eq!(clock.pending(), 0b01);
        let first = clock.shot(0).unwrap();
        assert_eq!(first.millis, 1000);

        clock.release(0);
        advance(&mut isr, 30);
        isr.handle(TriggerVector::Exti15_10, |ch| ch == 0);
        assert_eq!(clock.pending(), 0);
        assert_eq!(clock.shot(0).unwrap(), first);

        advance(&mut isr, 30);
        isr.handle(TriggerVector::Exti15_10, |ch| ch == 0);
        assert_eq!(clock.pending(), 0b01);
        assert_eq!(clock.shot(0).unwrap().millis, 1060);
    }

    #[test]
    fn boundary_of_pause_is_rejected() {
        let (mut isr, clock) = domains(50);
        advance(&mut isr, 100);
        let c = isr.capture();
        assert!(isr.commit(&c, 2));
        advance(&mut isr, 50);
        let c = isr.capture();
        assert!(!isr.commit(&c, 2));
        isr.tick();
        let c = isr.capture();
        assert!(isr.commit(&c, 2));
        assert_eq!(clock.shot(2).unwrap().millis, 151);
    }

    #[test]
    fn shared_vector_stamps_identically() {
        let (mut isr, clock) = domains(10);
        advance(&mut isr, 1234);
        let cleared = isr.handle(TriggerVector::Exti15_10, |_| true);
        assert_eq!(cleared, 0b11);
        assert_eq!(clock.shot(0).unwrap(), clock.shot(1).unwrap());
        assert_eq!(clock.shot(0).unwrap().stamp.millis, 234);
    }

    #[test]
    fn shared_vector_debounces_per_channel() {
        let (mut isr, clock) = domains(100);
        advance(&mut isr, 500);
        isr.handle(TriggerVector::Exti15_10, |ch| ch == 0);
        advance(&mut isr, 20);
        // channel 0 is inside its window, channel 1 is not
        let cleared = isr.handle(TriggerVector::Exti15_10, |_| true);
        assert_eq!(cleared, 0b11);
        assert_eq!(clock.shot(0).unwrap().millis, 500);
        assert_eq!(clock.shot(1).unwrap().millis, 520);
    }

    #[test]
    fn out_of_range_channel_is_ignored() {
        let (mut isr, mut clock) = domains(0);
        advance(&mut isr, 10);
        let c = isr.capture();
        assert!(!isr.commit(&c, TRIGGERS));
        assert!(!isr.commit(&c, 200));
        clock.release(200);
        assert_eq!(clock.pending(), 0);
        assert!(clock.shot(TRIGGERS).is_none());
    }

    #[test]
    fn debounce_across_millis_wrap() {
        let (mut isr, clock) = domains(50);
        isr.core.millis_total.store(u32::MAX - 9, Ordering::Relaxed);
        let c = isr.capture();
        assert!(isr.commit(&c, 0));
        advance(&mut isr, 20);
        let c = isr.capture();
        assert_eq!(c.millis, 10);
        assert!(!isr.commit(&c, 0));
        advance(&mut isr, 31);
        let c = isr.capture();
        assert!(isr.commit(&c, 0));
        assert_eq!(clock.shot(0).unwrap().millis, 41);
    }

    #[test]
    fn pps_rolls_late_second() {
        let (mut isr, clock) = domains(0);
        advance(&mut isr, 998);
        assert_eq!(isr.pps(), -2);
        let now = clock.now();
        assert_eq!(now.time.second, 1);
        assert_eq!(now.millis, 0);
        // local clock now 3 ms fast
        advance(&mut isr, 1003);
        assert_eq!(isr.pps(), 3);
        let now = clock.now();
        assert_eq!(now.time.second, 2);
        assert_eq!(now.millis, 0);
    }

    #[test]
    fn pps_applies_posted_time() {
        let (mut isr, mut clock) = domains(0);
        advance(&mut isr, 400);
        let gps = CalendarTime {
            year: 2024,
            month: 6,
            day: 1,
            hour: 12,
            minute: 30,
            second: 15,
        };
        clock.post_time(gps);
        // not applied before the edge
        assert_eq!(clock.now().time, CalendarTime::EPOCH);
        isr.pps();
        assert_eq!(clock.now(), Timestamp::new(gps, 0));
        // mailbox is consumed
        advance(&mut isr, 999);
        isr.pps();
        assert_eq!(clock.now().time.second, 16);
    }
}
