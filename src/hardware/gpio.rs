use super::hal::{
    self,
    gpio::{gpioe::*, Edge, ExtiPin, Input, Output, PushPull},
};

use crate::dispatcher::Led;
use crate::trigger::{Channels, TriggerIdx, TriggerLevels, TRIGGERS};

/// EXTI line of each trigger channel. The polled channel has none.
pub const TRIGGER_LINES: [Option<u8>; TRIGGERS] = [Some(10), Some(11), Some(4), None];

/// EXTI line of the PPS input.
pub const PPS_LINE: u8 = 1;

/// Trigger inputs, configured from the settings at boot.
pub struct TriggerPins {
    pub ch0: PE10<Input>,
    pub ch1: PE11<Input>,
    pub ch2: PE4<Input>,
    pub ch3: PE5<Input>,
}

impl TriggerPins {
    /// Apply the pull-up policy and route the interrupt lines.
    ///
    /// Interrupts fire on the transition into the triggered level of each channel.
    ///
    /// # Args
    /// * `channels` - Channel wiring from the settings.
    pub fn new(
        mut pins: Self,
        channels: &Channels<TRIGGERS>,
        syscfg: &mut hal::pac::SYSCFG,
        exti: &mut hal::pac::EXTI,
    ) -> Self {
        // Note(unwrap): every channel index below TRIGGERS is configured.
        let pull_up = |ch: usize| channels.get(ch).unwrap().pullup_enabled;
        let edge = |ch: usize| {
            if channels.get(ch).unwrap().edge_polarity {
                Edge::Rising
            } else {
                Edge::Falling
            }
        };
        pins.ch0 = pins.ch0.internal_pull_up(pull_up(0));
        pins.ch1 = pins.ch1.internal_pull_up(pull_up(1));
        pins.ch2 = pins.ch2.internal_pull_up(pull_up(2));
        pins.ch3 = pins.ch3.internal_pull_up(pull_up(3));

        pins.ch0.make_interrupt_source(syscfg);
        pins.ch0.trigger_on_edge(exti, edge(0));
        pins.ch0.enable_interrupt(exti);
        pins.ch1.make_interrupt_source(syscfg);
        pins.ch1.trigger_on_edge(exti, edge(1));
        pins.ch1.enable_interrupt(exti);
        pins.ch2.make_interrupt_source(syscfg);
        pins.ch2.trigger_on_edge(exti, edge(2));
        pins.ch2.enable_interrupt(exti);
        pins
    }
}

impl TriggerLevels for TriggerPins {
    fn level(&self, channel: usize) -> bool {
        match TriggerIdx::try_from(channel) {
            Ok(TriggerIdx::Zero) => self.ch0.is_high(),
            Ok(TriggerIdx::One) => self.ch1.is_high(),
            Ok(TriggerIdx::Two) => self.ch2.is_high(),
            Ok(TriggerIdx::Three) => self.ch3.is_high(),
            Err(_) => false,
        }
    }
}

/// Pending flags of the EXTI lines.
///
/// The trigger and PPS interrupts only ever touch their own lines, and both the flag check and
/// the clear are single register accesses.
pub struct ExtiLines;

impl ExtiLines {
    fn regs() -> &'static hal::pac::exti::RegisterBlock {
        // Note(unsafe): Reading the pending register and writing ones to clear is free of side
        // effects on other lines.
        unsafe { &*hal::pac::EXTI::ptr() }
    }

    pub fn is_pending(line: u8) -> bool {
        Self::regs().cpupr1.read().bits() & (1 << line) != 0
    }

    pub fn clear(line: u8) {
        Self::regs().cpupr1.write(|w| unsafe { w.bits(1 << line) });
    }

    /// Whether the pending flag of a trigger channel is set.
    pub fn channel_pending(channel: usize) -> bool {
        match TRIGGER_LINES.get(channel) {
            Some(Some(line)) => Self::is_pending(*line),
            _ => false,
        }
    }

    /// Clear the pending flags of a bitmask of trigger channels.
    pub fn clear_channels(mask: u8) {
        let lines = TRIGGER_LINES
            .iter()
            .enumerate()
            .filter(|(ch, _)| mask & (1 << ch) != 0)
            .filter_map(|(_, line)| *line)
            .fold(0u32, |bits, line| bits | 1 << line);
        if lines != 0 {
            Self::regs().cpupr1.write(|w| unsafe { w.bits(lines) });
        }
    }
}

/// PPS indicator LED, switched on by the dispatcher and off by the PPS interrupt.
///
/// Writes go through the atomic set/reset register, so both contexts may drive it.
#[derive(Copy, Clone, Debug)]
pub struct PpsLed(());

impl PpsLed {
    const PIN: u32 = 0;

    /// # Args
    /// * `_pin` - The configured LED pin, consumed as proof of configuration.
    pub fn new(_pin: hal::gpio::gpiob::PB0<Output<PushPull>>) -> Self {
        Self(())
    }

    pub fn set(&self, on: bool) {
        // Note(unsafe): BSRR writes only affect the bits written as one.
        let regs = unsafe { &*hal::pac::GPIOB::ptr() };
        let bit = if on { Self::PIN } else { Self::PIN + 16 };
        regs.bsrr.write(|w| unsafe { w.bits(1 << bit) });
    }
}

/// Board outputs owned by the dispatcher.
pub struct Outputs {
    pub gps_led: hal::gpio::gpioe::PE1<Output<PushPull>>,
    pub buzzer: hal::gpio::gpiob::PB14<Output<PushPull>>,
}

impl Outputs {
    pub fn new(mut outputs: Self) -> Self {
        outputs.gps_led.set_low();
        outputs.buzzer.set_low();
        outputs
    }

    pub fn set_gps_led(&mut self, state: Led) {
        match state {
            Led::On => self.gps_led.set_high(),
            Led::Off => self.gps_led.set_low(),
            Led::Toggle => self.gps_led.toggle(),
        }
    }

    pub fn set_buzzer(&mut self, on: bool) {
        if on {
            self.buzzer.set_high();
        } else {
            self.buzzer.set_low();
        }
    }
}
