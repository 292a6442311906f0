//! UART interrupt servicing.

use embedded_hal::serial::{Read, Write};

use super::hal::{self, serial::Serial};
use crate::serial;

pub const SERIAL_RX: usize = 256;
pub const SERIAL_TX: usize = 512;

pub type SerialQueues = serial::Queues<SERIAL_RX, SERIAL_TX>;

/// Dispatcher half of a UART.
pub type SerialChannel = serial::Channel<'static, SERIAL_RX, SERIAL_TX>;

/// A UART together with the interrupt half of its queues.
pub struct Uart<USART> {
    pub serial: Serial<USART>,
    pub port: serial::Port<'static, SERIAL_RX, SERIAL_TX>,
}

/// Move received bytes into the queue and queued bytes onto the wire.
///
/// # Returns
/// True if bytes remain queued for transmission, i.e. the transmit interrupt must stay enabled.
pub fn service<S>(serial: &mut S, port: &mut serial::Port<'static, SERIAL_RX, SERIAL_TX>) -> bool
where
    S: Read<u8> + Write<u8>,
{
    let overruns = port.overruns();
    for _ in 0..SERIAL_RX {
        // Errors (overrun, framing) are cleared by the read itself.
        match serial.read() {
            Ok(byte) => port.received(byte),
            Err(_) => break,
        }
    }
    if port.overruns() != overruns {
        log::warn!("UART receive queue overrun");
    }
    port.transmit(|byte| serial.write(byte).is_ok())
}

macro_rules! uart_irq {
    ($name:ident, $USART:ty) => {
        /// Service the interrupt of this UART.
        pub fn $name(uart: &mut Uart<$USART>) {
            if service(&mut uart.serial, &mut uart.port) {
                uart.serial.listen(hal::serial::Event::Txe);
            } else {
                uart.serial.unlisten(hal::serial::Event::Txe);
            }
        }
    };
}

uart_irq!(on_usart1, hal::pac::USART1);
uart_irq!(on_usart2, hal::pac::USART2);
uart_irq!(on_usart3, hal::pac::USART3);
