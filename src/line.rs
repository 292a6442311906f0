//! # Non-blocking line accumulation
//!
//! Collects newline-terminated lines from a byte source without ever waiting for data: each
//! poll consumes only what the source reports as ready and returns as soon as one line is
//! complete.

use embedded_io::{Read, ReadReady, Write};
use heapless::Vec;

const BACKSPACE: u8 = 0x7f;

/// Result of polling a [LineReader].
#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent<'a> {
    /// No complete line yet.
    Pending,
    /// A complete line including its terminating `'\n'`.
    Line(&'a [u8]),
    /// The buffer filled up without a terminator. The partial line was dropped and input is
    /// discarded up to the next newline.
    Overflow,
}

#[derive(Debug)]
pub struct LineReader<const N: usize> {
    buf: Vec<u8, N>,
    complete: bool,
    discarding: bool,
    echo: bool,
}

impl<const N: usize> LineReader<N> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            complete: false,
            discarding: false,
            echo: false,
        }
    }

    /// A reader for interactive consoles: received bytes are echoed and DEL erases.
    pub const fn with_echo() -> Self {
        Self {
            buf: Vec::new(),
            complete: false,
            discarding: false,
            echo: true,
        }
    }

    /// Consume ready bytes until a line completes or the source runs dry.
    ///
    /// At most `N` bytes are read per call.
    pub fn poll<S: Read + ReadReady + Write>(&mut self, source: &mut S) -> LineEvent<'_> {
        if self.complete {
            self.buf.clear();
            self.complete = false;
        }
        for _ in 0..N {
            if !matches!(source.read_ready(), Ok(true)) {
                break;
            }
            let mut byte = [0u8];
            match source.read(&mut byte) {
                Ok(1) => {}
                _ => break,
            }
            let byte = byte[0];

            if self.discarding {
                if byte == b'\n' {
                    self.discarding = false;
                }
                continue;
            }

            if self.echo {
                if byte == BACKSPACE {
                    if self.buf.pop().is_some() {
                        source.write_all(b"\x08 \x08").ok();
                    }
                    continue;
                }
                source.write_all(&[byte]).ok();
            }

            if self.buf.push(byte).is_err() {
                log::warn!("Line buffer overflow ({N} bytes)");
                self.buf.clear();
                self.discarding = byte != b'\n';
                return LineEvent::Overflow;
            }
            if byte == b'\n' {
                self.complete = true;
                return LineEvent::Line(&self.buf);
            }
        }
        LineEvent::Pending
    }
}

impl<const N: usize> Default for LineReader<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip the line terminator.
pub fn trim_line(line: &[u8]) -> &[u8] {
    let mut line = line;
    while let [rest @ .., b'\n' | b'\r'] = line {
        line = rest;
    }
    line
}

#[cfg(test)]
pub(crate) mod tests {
    extern crate std;
    use std::collections::VecDeque;
    use std::vec::Vec;

    use super::*;

    /// In-memory serial port for tests.
    #[derive(Default)]
    pub struct Loopback {
        pub rx: VecDeque<u8>,
        pub tx: Vec<u8>,
    }

    impl Loopback {
        pub fn feed(&mut self, bytes: &[u8]) {
            self.rx.extend(bytes.iter().copied());
        }
    }

    impl embedded_io::ErrorType for Loopback {
        type Error = core::convert::Infallible;
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let mut n = 0;
            while n < buf.len() {
                match self.rx.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl ReadReady for Loopback {
        fn read_ready(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.rx.is_empty())
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn partial_then_complete() {
        let mut port = Loopback::default();
        let mut reader = LineReader::<16>::new();
        port.feed(b"tim");
        assert_eq!(reader.poll(&mut port), LineEvent::Pending);
        port.feed(b"e\nshots\n");
        assert_eq!(reader.poll(&mut port), LineEvent::Line(b"time\n"));
        assert_eq!(reader.poll(&mut port), LineEvent::Line(b"shots\n"));
        assert_eq!(reader.poll(&mut port), LineEvent::Pending);
        assert!(port.tx.is_empty());
    }

    #[test]
    fn overflow_resets_once() {
        let mut port = Loopback::default();
        let mut reader = LineReader::<8>::new();
        port.feed(&[b'x'; 12]);
        let mut overflows = 0;
        for _ in 0..4 {
            if reader.poll(&mut port) == LineEvent::Overflow {
                overflows += 1;
            }
        }
        assert_eq!(overflows, 1);
        port.feed(b"y\ntime\n");
        assert_eq!(reader.poll(&mut port), LineEvent::Line(b"time\n"));
    }

    #[test]
    fn echo_and_backspace() {
        let mut port = Loopback::default();
        let mut reader = LineReader::<16>::with_echo();
        port.feed(b"tx\x7fime\n");
        assert_eq!(reader.poll(&mut port), LineEvent::Line(b"time\n"));
        assert_eq!(port.tx, b"tx\x08 \x08ime\n");
    }

    #[test]
    fn trims_terminators() {
        assert_eq!(trim_line(b"time\r\n"), b"time");
        assert_eq!(trim_line(b"\r\n"), b"");
        assert_eq!(trim_line(b"a b"), b"a b");
    }
}
