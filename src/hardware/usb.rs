//! # USB console
//!
//! CDC-ACM serial port exposed to the dispatcher as a non-blocking byte stream. Nothing is ever
//! waited for: reads return what the USB stack already holds and writes that do not fit the
//! endpoint buffer, or happen while no host listens, are dropped.

use core::convert::Infallible;

use heapless::Deque;

use super::hal;

pub type UsbBus = hal::usb_hs::UsbBus<hal::usb_hs::USB2>;

// Type alias for the USB device.
pub type UsbDevice = usb_device::device::UsbDevice<'static, UsbBus>;

pub type SerialPort = usbd_serial::SerialPort<'static, UsbBus, &'static mut [u8], &'static mut [u8]>;

const RX_STAGING: usize = 64;

pub struct UsbConsole {
    device: UsbDevice,
    serial: SerialPort,
    rx: Deque<u8, RX_STAGING>,
    dtr: bool,
    connected: bool,
}

impl UsbConsole {
    pub fn new(device: UsbDevice, serial: SerialPort) -> Self {
        Self {
            device,
            serial,
            rx: Deque::new(),
            dtr: false,
            connected: false,
        }
    }

    /// Run the USB stack and track the host terminal (DTR).
    pub fn poll(&mut self) {
        self.device.poll(&mut [&mut self.serial]);
        let dtr = self.serial.dtr();
        if dtr && !self.dtr {
            log::info!("USB terminal connected");
            self.connected = true;
        }
        self.dtr = dtr;
    }

    /// Whether a host terminal connected since the last call.
    pub fn take_connected(&mut self) -> bool {
        core::mem::take(&mut self.connected)
    }
}

impl embedded_io::ErrorType for UsbConsole {
    type Error = Infallible;
}

impl embedded_io::ReadReady for UsbConsole {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if self.rx.is_empty() {
            let mut buf = [0u8; RX_STAGING];
            if let Ok(n) = self.serial.read(&mut buf) {
                for &byte in &buf[..n] {
                    // Note(unwrap): at most RX_STAGING bytes go into an empty deque.
                    self.rx.push_back(byte).unwrap();
                }
            }
        }
        Ok(!self.rx.is_empty())
    }
}

impl embedded_io::Read for UsbConsole {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;
        for slot in buf.iter_mut() {
            match self.rx.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl embedded_io::Write for UsbConsole {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if !self.dtr {
            return Ok(buf.len());
        }
        match self.serial.write(buf) {
            Ok(n) if n > 0 => Ok(n),
            // endpoint buffer full
            _ => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
