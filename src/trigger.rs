//! # Trigger channels
//!
//! Per-channel wiring (polarity, pull-up, pause) fixed at boot, the shot register bitmask shared
//! between the interrupt domain and the dispatcher, and the mapping of trigger interrupt vectors
//! to the channels they service.

use core::sync::atomic::{AtomicU8, Ordering};

use num_enum::TryFromPrimitive;

use crate::calendar::Timestamp;

/// Number of trigger channels.
pub const TRIGGERS: usize = 4;

/// Trigger channel index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(usize)]
pub enum TriggerIdx {
    Zero = 0,
    One = 1,
    Two = 2,
    /// Not wired to an interrupt, sampled by the dispatcher.
    Three = 3,
}

/// Hardware binding of one trigger channel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TriggerConfig {
    /// Pin level that constitutes "triggered".
    pub edge_polarity: bool,
    pub pullup_enabled: bool,
    /// Minimum spacing between two accepted shots on this channel.
    pub pause_ms: u32,
}

/// Source of instantaneous trigger pin levels.
pub trait TriggerLevels {
    /// Current electrical level of the channel's pin, `true` for high.
    ///
    /// # Note
    /// Only called with valid channel indices.
    fn level(&self, channel: usize) -> bool;
}

/// The wiring of all channels. Immutable after boot and copied into both domains.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Channels<const N: usize> {
    configs: [TriggerConfig; N],
}

impl<const N: usize> Channels<N> {
    pub const fn new(configs: [TriggerConfig; N]) -> Self {
        Self { configs }
    }

    pub fn get(&self, channel: usize) -> Option<&TriggerConfig> {
        self.configs.get(channel)
    }

    /// Whether the channel's input currently sits at its triggered level.
    ///
    /// Independent of debounce history. Out of range channels are never triggered.
    pub fn gettrig(&self, channel: usize, levels: &impl TriggerLevels) -> bool {
        match self.configs.get(channel) {
            Some(cfg) => levels.level(channel) == cfg.edge_polarity,
            None => false,
        }
    }
}

/// Last accepted shot of a channel: the `millis_total` value and the calendar stamp, committed
/// together.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ShotRecord {
    pub millis: u32,
    pub stamp: Timestamp,
}

/// One bit per channel with an unconsumed shot.
///
/// Bits are set only from the interrupt domain and cleared only by the dispatcher. Both are single
/// atomic read-modify-write operations, so a set can never be lost to a concurrent clear of
/// another bit.
#[derive(Debug)]
pub struct ShotRegister(AtomicU8);

impl ShotRegister {
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub(crate) fn set(&self, channel: usize) {
        self.0.fetch_or(1 << channel, Ordering::AcqRel);
    }

    pub(crate) fn clear(&self, channel: usize) {
        self.0.fetch_and(!(1 << channel), Ordering::AcqRel);
    }

    pub fn load(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_set(&self, channel: usize) -> bool {
        channel < 8 && self.load() & (1 << channel) != 0
    }
}

impl Default for ShotRegister {
    fn default() -> Self {
        Self::new()
    }
}

/// Trigger interrupt vectors and the channels behind them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TriggerVector {
    /// Shared line carrying channels 0 and 1.
    Exti15_10,
    /// Channel 2.
    Exti4,
    /// Software-pended by the dispatcher for the polled channel 3.
    Polled,
}

impl TriggerVector {
    pub const ALL: [Self; 3] = [Self::Exti15_10, Self::Exti4, Self::Polled];

    /// Channels serviced by this vector, in evaluation order.
    pub const fn channels(self) -> &'static [usize] {
        match self {
            Self::Exti15_10 => &[0, 1],
            Self::Exti4 => &[2],
            Self::Polled => &[3],
        }
    }
}

/// Rising-edge detector for the channel sampled by the dispatcher instead of an interrupt.
#[derive(Copy, Clone, Debug, Default)]
pub struct PolledTrigger {
    triggered: bool,
}

impl PolledTrigger {
    /// Feed the current `gettrig` value.
    ///
    /// # Returns
    /// True on the transition into the triggered level.
    pub fn update(&mut self, triggered: bool) -> bool {
        let edge = triggered && !self.triggered;
        self.triggered = triggered;
        edge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pins([bool; TRIGGERS]);

    impl TriggerLevels for Pins {
        fn level(&self, channel: usize) -> bool {
            self.0[channel]
        }
    }

    #[test]
    fn gettrig_follows_polarity() {
        let mut cfg = [TriggerConfig::default(); TRIGGERS];
        cfg[0].edge_polarity = true;
        cfg[1].edge_polarity = false;
        let channels = Channels::new(cfg);

        let pins = Pins([true, true, false, false]);
        assert!(channels.gettrig(0, &pins));
        assert!(!channels.gettrig(1, &pins));
        let pins = Pins([false, false, false, false]);
        assert!(!channels.gettrig(0, &pins));
        assert!(channels.gettrig(1, &pins));
        assert!(!channels.gettrig(TRIGGERS, &pins));
        assert!(!channels.gettrig(usize::MAX, &pins));
    }

    #[test]
    fn register_bits_are_independent() {
        let reg = ShotRegister::new();
        reg.set(0);
        reg.set(2);
        assert_eq!(reg.load(), 0b101);
        reg.clear(0);
        assert!(!reg.is_set(0));
        assert!(reg.is_set(2));
        assert!(!reg.is_set(9));
    }

    #[test]
    fn every_channel_has_one_vector() {
        for ch in 0..TRIGGERS {
            let n = TriggerVector::ALL
                .iter()
                .filter(|v| v.channels().contains(&ch))
                .count();
            assert_eq!(n, 1, "channel {ch}");
        }
        assert_eq!(TriggerIdx::try_from(3usize).ok(), Some(TriggerIdx::Three));
        assert!(TriggerIdx::try_from(TRIGGERS).is_err());
    }

    #[test]
    fn polled_edge() {
        let mut p = PolledTrigger::default();
        assert!(!p.update(false));
        assert!(p.update(true));
        assert!(!p.update(true));
        assert!(!p.update(false));
        assert!(p.update(true));
    }
}
