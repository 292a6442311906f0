//! # Chronometer board
//!
//! The [Board] the dispatcher runs on: outputs, trigger level reads, the USB console, the
//! dispatcher halves of the UARTs, the settings flash and the watchdog.

use hal::independent_watchdog::IndependentWatchdog;
use hal::pac::Interrupt;

use super::flash::{FlashError, SettingsFlash};
use super::gpio::{Outputs, PpsLed, TriggerPins};
use super::hal;
use super::uart::SerialChannel;
use super::usb::UsbConsole;
use crate::dispatcher::{Board, Led, Port};
use crate::display::Frame;
use crate::settings::Settings;
use crate::storage;
use crate::trigger::TriggerLevels;

pub struct ChronometerBoard {
    pub watchdog: IndependentWatchdog,
    pub pps_led: PpsLed,
    pub outputs: Outputs,
    pub triggers: TriggerPins,
    pub usb: UsbConsole,
    pub aux: SerialChannel,
    pub gps: SerialChannel,
    pub lidar: SerialChannel,
    pub flash: SettingsFlash,
}

impl ChronometerBoard {
    fn interrupt(port: Port) -> Interrupt {
        match port {
            Port::Aux => Interrupt::USART1,
            Port::Gps => Interrupt::USART2,
            Port::Lidar => Interrupt::USART3,
        }
    }
}

impl TriggerLevels for ChronometerBoard {
    fn level(&self, channel: usize) -> bool {
        self.triggers.level(channel)
    }
}

impl Board for ChronometerBoard {
    type Console = UsbConsole;
    type Serial = SerialChannel;
    type StoreError = storage::Error<FlashError>;

    fn feed_watchdog(&mut self) {
        self.watchdog.feed();
    }

    fn set_pps_led(&mut self, on: bool) {
        self.pps_led.set(on);
    }

    fn set_gps_led(&mut self, state: Led) {
        self.outputs.set_gps_led(state);
    }

    fn set_buzzer(&mut self, on: bool) {
        self.outputs.set_buzzer(on);
    }

    fn display(&mut self, frame: &Frame) {
        // No display is fitted, the frames go to the log.
        log::trace!("Display: {frame}");
    }

    fn usb(&mut self) -> &mut Self::Console {
        &mut self.usb
    }

    fn usb_connected(&mut self) -> bool {
        self.usb.take_connected()
    }

    fn serial(&mut self, port: Port) -> &mut Self::Serial {
        match port {
            Port::Aux => &mut self.aux,
            Port::Gps => &mut self.gps,
            Port::Lidar => &mut self.lidar,
        }
    }

    fn transmit(&mut self, port: Port) {
        if self.serial(port).tx_pending() {
            rtic::pend(Self::interrupt(port));
        }
    }

    fn pend_polled_trigger(&mut self) {
        rtic::pend(Interrupt::EXTI9_5);
    }

    fn service(&mut self) {
        self.usb.poll();
    }

    fn save_settings(&mut self, settings: &Settings) -> Result<(), Self::StoreError> {
        self.watchdog.feed();
        let result = self.flash.save(settings);
        self.watchdog.feed();
        result
    }

    fn reset(&mut self) {
        log::warn!("Software reset");
        cortex_m::peripheral::SCB::sys_reset();
    }
}
