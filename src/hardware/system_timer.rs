///! Tick timer
///!
///! # Design
///! TIM2 generates the 1 kHz tick that drives the millisecond counter and the calendar. It runs
///! unprescaled from its kernel clock, so the auto-reload value is the number of kernel clock cycles
///! per tick. The PPS discipline trims that value to track the GPS second.
use hal::timer::{Event, Timer};
use stm32h7xx_hal as hal;

use crate::clock::{PpsDiscipline, TICK_HZ};

/// The 1 kHz tick timer.
pub struct TickTimer {
    timer: Timer<hal::pac::TIM2>,
}

impl TickTimer {
    fn regs() -> &'static hal::pac::tim2::RegisterBlock {
        // Note(unsafe): The timer is owned by this driver, register access is limited to the
        // reload, prescaler and event generation registers.
        unsafe { &*hal::pac::TIM2::ptr() }
    }

    /// Initialize the tick timer.
    ///
    /// # Args
    /// * `timer` - The hardware timer, configured by the HAL.
    /// * `kernel_hz` - The timer kernel clock frequency.
    ///
    /// # Returns
    /// The running timer and the discipline for its nominal reload value.
    pub fn new(mut timer: Timer<hal::pac::TIM2>, kernel_hz: u32) -> (Self, PpsDiscipline) {
        let nominal = kernel_hz / TICK_HZ;
        timer.pause();
        let regs = Self::regs();
        regs.psc.write(|w| unsafe { w.bits(0) });
        regs.arr.write(|w| unsafe { w.bits(nominal - 1) });
        // Load the prescaler and reload now instead of at the next update.
        regs.egr.write(|w| w.ug().set_bit());
        timer.clear_irq();
        timer.listen(Event::TimeOut);
        timer.resume();
        (Self { timer }, PpsDiscipline::new(nominal))
    }

    /// Acknowledge the tick interrupt.
    pub fn clear_irq(&mut self) {
        self.timer.clear_irq();
    }

    /// Program a new tick length in kernel clock cycles. Takes effect at the next update.
    pub fn set_reload(&mut self, reload: u32) {
        Self::regs().arr.write(|w| unsafe { w.bits(reload.saturating_sub(1)) });
    }
}
