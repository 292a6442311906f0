//! # Interrupt-driven serial queues
//!
//! Each UART gets one receive and one transmit `heapless::spsc` queue. The dispatcher owns the
//! [Channel] half (receive consumer, transmit producer), the UART interrupt owns the [Port] half
//! (receive producer, transmit consumer). No queue has more than one producer or consumer, so no
//! locking is required.

use heapless::spsc::{Consumer, Producer, Queue};

/// Storage for one UART.
pub struct Queues<const RX: usize, const TX: usize> {
    rx: Queue<u8, RX>,
    tx: Queue<u8, TX>,
}

impl<const RX: usize, const TX: usize> Queues<RX, TX> {
    pub const fn new() -> Self {
        Self {
            rx: Queue::new(),
            tx: Queue::new(),
        }
    }

    /// Split into the dispatcher and interrupt halves.
    pub fn split(&mut self) -> (Channel<'_, RX, TX>, Port<'_, RX, TX>) {
        let (rx_producer, rx_consumer) = self.rx.split();
        let (tx_producer, tx_consumer) = self.tx.split();
        (
            Channel {
                rx: rx_consumer,
                tx: tx_producer,
                dropped: 0,
            },
            Port {
                rx: rx_producer,
                tx: tx_consumer,
                overruns: 0,
            },
        )
    }
}

impl<const RX: usize, const TX: usize> Default for Queues<RX, TX> {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatcher half of a UART.
pub struct Channel<'a, const RX: usize, const TX: usize> {
    rx: Consumer<'a, u8, RX>,
    tx: Producer<'a, u8, TX>,
    dropped: u32,
}

impl<const RX: usize, const TX: usize> Channel<'_, RX, TX> {
    /// Whether bytes are queued for transmission.
    pub fn tx_pending(&self) -> bool {
        self.tx.len() > 0
    }

    /// Number of transmit bytes dropped because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl<const RX: usize, const TX: usize> embedded_io::ErrorType for Channel<'_, RX, TX> {
    type Error = core::convert::Infallible;
}

impl<const RX: usize, const TX: usize> embedded_io::Read for Channel<'_, RX, TX> {
    /// Non-blocking: returns 0 when nothing is queued.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;
        for slot in buf.iter_mut() {
            match self.rx.dequeue() {
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

impl<const RX: usize, const TX: usize> embedded_io::ReadReady for Channel<'_, RX, TX> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.rx.ready())
    }
}

impl<const RX: usize, const TX: usize> embedded_io::Write for Channel<'_, RX, TX> {
    /// Queue bytes for transmission. Never blocks: bytes that do not fit are dropped and counted.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &byte in buf {
            if self.tx.enqueue(byte).is_err() {
                self.dropped = self.dropped.wrapping_add(1);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Interrupt half of a UART.
pub struct Port<'a, const RX: usize, const TX: usize> {
    rx: Producer<'a, u8, RX>,
    tx: Consumer<'a, u8, TX>,
    overruns: u32,
}

impl<const RX: usize, const TX: usize> Port<'_, RX, TX> {
    /// Store a received byte. A full queue drops it.
    pub fn received(&mut self, byte: u8) {
        if self.rx.enqueue(byte).is_err() {
            self.overruns = self.overruns.wrapping_add(1);
        }
    }

    /// Hand queued bytes to `write` until it refuses one or the queue runs empty.
    ///
    /// # Args
    /// * `write` - Puts one byte on the wire, returns false if the transmitter is busy.
    ///
    /// # Returns
    /// True if bytes remain queued.
    pub fn transmit(&mut self, mut write: impl FnMut(u8) -> bool) -> bool {
        while let Some(&byte) = self.tx.peek() {
            if !write(byte) {
                break;
            }
            self.tx.dequeue();
        }
        self.tx.ready()
    }

    pub fn overruns(&self) -> u32 {
        self.overruns
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec::Vec;

    use embedded_io::{Read, ReadReady, Write};

    use super::*;

    #[test]
    fn bytes_flow_both_ways() {
        let mut queues = Queues::<8, 8>::new();
        let (mut channel, mut port) = queues.split();

        assert!(!channel.read_ready().unwrap());
        port.received(b'o');
        port.received(b'k');
        assert!(channel.read_ready().unwrap());
        let mut buf = [0u8; 4];
        assert_eq!(channel.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ok");

        channel.write_all(b"hi!").unwrap();
        assert!(channel.tx_pending());
        let mut wire = Vec::new();
        // transmitter takes two bytes, then reports busy
        assert!(port.transmit(|b| {
            if wire.len() == 2 {
                return false;
            }
            wire.push(b);
            true
        }));
        assert_eq!(wire, b"hi");
        assert!(!port.transmit(|b| {
            wire.push(b);
            true
        }));
        assert_eq!(wire, b"hi!");
        assert!(!channel.tx_pending());
    }

    #[test]
    fn full_queues_drop() {
        // capacity is one less than the storage size
        let mut queues = Queues::<4, 4>::new();
        let (mut channel, mut port) = queues.split();
        assert_eq!(channel.write(b"abcdef").unwrap(), 6);
        assert_eq!(channel.dropped(), 3);
        for b in b"wxyz" {
            port.received(*b);
        }
        assert_eq!(port.overruns(), 1);
    }
}
