//! # GPS collaborator
//!
//! The dispatcher only depends on [Gps]. [RmcGps] is the minimal receiver adapter shipped with the
//! firmware: it classifies `$--RMC` sentences by their status field and forwards their time to the
//! PPS discipline. Full NMEA decoding is not attempted.

use crate::calendar::CalendarTime;

/// Fix quality as far as timekeeping is concerned.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, strum::AsRefStr)]
pub enum GpsStatus {
    /// Receiver reports a valid fix, time is authoritative.
    Valid,
    /// Receiver is talking but has no valid fix.
    NotValid,
    /// Nothing heard from the receiver.
    #[default]
    Unknown,
}

pub trait Gps {
    fn status(&self) -> GpsStatus;

    /// Consume one line received from the GPS UART.
    fn parse_answer(&mut self, line: &[u8]);

    /// Receiver configuration to send, once, when a start sequence is due.
    fn start_sequence(&mut self) -> Option<&'static [u8]>;

    /// Time of day of the next PPS edge, if known since the last call.
    fn take_time(&mut self) -> Option<CalendarTime>;
}

/// Enable only RMC sentences, once per second.
///
/// Receivers forget this across a power cycle of their own, so any other standard sentence heard
/// later asks for it again.
const RMC_ONLY: &[u8] = b"$PMTK314,0,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0*29\r\n";

#[derive(Debug)]
pub struct RmcGps {
    status: GpsStatus,
    need_start_seq: bool,
    next_edge: Option<CalendarTime>,
}

impl RmcGps {
    pub const fn new() -> Self {
        Self {
            status: GpsStatus::Unknown,
            need_start_seq: true,
            next_edge: None,
        }
    }

}

impl Default for RmcGps {
    fn default() -> Self {
        Self::new()
    }
}

fn digits2(field: &[u8]) -> Option<u8> {
    match field {
        [a @ b'0'..=b'9', b @ b'0'..=b'9', ..] => Some((a - b'0') * 10 + (b - b'0')),
        _ => None,
    }
}

/// Time and date of an RMC sentence: fields 1 (`hhmmss.ss`) and 9 (`ddmmyy`).
fn rmc_time(fields: &[&[u8]; 10]) -> Option<CalendarTime> {
    let (t, d) = (fields[1], fields[9]);
    let time = CalendarTime {
        hour: digits2(t)?,
        minute: digits2(t.get(2..)?)?,
        second: digits2(t.get(4..)?)?,
        day: digits2(d)?,
        month: digits2(d.get(2..)?)?,
        year: 2000 + digits2(d.get(4..)?)? as u16,
    };
    time.is_valid().then_some(time)
}

/// Sentence formatter of a standard `--xxx,` sentence body. Proprietary sentences (`P...`) are
/// not standard and yield `None`.
fn sentence_kind(body: &[u8]) -> Option<&[u8]> {
    if body.first() == Some(&b'P') || body.get(5) != Some(&b',') {
        return None;
    }
    let address = body.get(..5)?;
    address
        .iter()
        .all(u8::is_ascii_uppercase)
        .then(|| &address[2..])
}

impl Gps for RmcGps {
    fn status(&self) -> GpsStatus {
        self.status
    }

    fn parse_answer(&mut self, line: &[u8]) {
        let line = crate::line::trim_line(line);
        let Some(body) = line.strip_prefix(b"$") else {
            return;
        };
        let body = body.split(|&b| b == b'*').next().unwrap_or(body);
        let Some(kind) = sentence_kind(body) else {
            return;
        };
        if kind != b"RMC" {
            self.need_start_seq = true;
            return;
        }
        let mut fields: [&[u8]; 10] = [&[]; 10];
        for (slot, field) in fields.iter_mut().zip(body.split(|&b| b == b',')) {
            *slot = field;
        }
        self.status = match fields[2] {
            b"A" => GpsStatus::Valid,
            _ => GpsStatus::NotValid,
        };
        if self.status == GpsStatus::Valid {
            // The sentence describes the edge that just passed; the next edge is one second later.
            self.next_edge = rmc_time(&fields).map(|mut time| {
                time.increment();
                time
            });
        }
    }

    fn start_sequence(&mut self) -> Option<&'static [u8]> {
        if !self.need_start_seq {
            return None;
        }
        self.need_start_seq = false;
        Some(RMC_ONLY)
    }

    fn take_time(&mut self) -> Option<CalendarTime> {
        self.next_edge.take()
    }
}
