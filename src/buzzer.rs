//! Timed output that switches itself off.

use crate::clock::elapsed;

#[derive(Copy, Clone, Debug, Default)]
pub struct Buzzer {
    since: Option<u32>,
}

impl Buzzer {
    /// Start (or restart) a buzz at `now`.
    pub fn start(&mut self, now: u32) {
        self.since = Some(now);
    }

    pub fn is_on(&self) -> bool {
        self.since.is_some()
    }

    /// Check the auto-off deadline.
    ///
    /// # Returns
    /// True exactly once, when the output must be switched off.
    pub fn expired(&mut self, now: u32, duration_ms: u32) -> bool {
        match self.since {
            Some(since) if elapsed(now, since) >= duration_ms => {
                self.since = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switches_off_once() {
        let mut b = Buzzer::default();
        assert!(!b.expired(0, 0));
        b.start(u32::MAX - 10);
        assert!(b.is_on());
        assert!(!b.expired(50, 100));
        assert!(b.expired(89, 100));
        assert!(!b.is_on());
        assert!(!b.expired(200, 100));
    }
}
