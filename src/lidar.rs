//! Range finder collaborator.

pub trait Lidar {
    /// Consume one line received from the range finder UART.
    fn parse(&mut self, line: &[u8]);
}

/// Range finder adapter that only records what it receives.
#[derive(Debug, Default)]
pub struct LogLidar {
    lines: u32,
}

impl LogLidar {
    /// Number of lines received so far.
    pub fn lines(&self) -> u32 {
        self.lines
    }
}

impl Lidar for LogLidar {
    fn parse(&mut self, line: &[u8]) {
        self.lines = self.lines.wrapping_add(1);
        if let Ok(text) = core::str::from_utf8(crate::line::trim_line(line)) {
            log::debug!("LIDAR: {text}");
        }
    }
}
