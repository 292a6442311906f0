//! # Dispatcher
//!
//! The cooperative main loop. It owns the [LoopDomain] handle of the timing state, the board and
//! every collaborator, and runs a fixed ordered list of steps ([Dispatcher::SCHEDULE]) once per
//! iteration. No step waits for anything: a condition that is not met yet is simply checked again
//! on the next iteration. The watchdog is fed before the first step and after every step, so the
//! watchdog window only has to cover the longest single step.

use core::fmt;

use embedded_io::{Read, ReadReady, Write};
use heapless::{String, Vec};

use crate::buzzer::Buzzer;
use crate::calendar::CalendarTime;
use crate::clock::elapsed;
use crate::commands::{report_shot, Action, CommandParser, Session};
use crate::countdown::{Countdown, CountdownFrame};
use crate::display::Frame;
use crate::gps::{Gps, GpsStatus};
use crate::lidar::Lidar;
use crate::line::{trim_line, LineEvent, LineReader};
use crate::settings::Settings;
use crate::timing::LoopDomain;
use crate::trigger::{PolledTrigger, ShotRecord, TriggerLevels, TriggerVector, TRIGGERS};

/// Period of the status step (GPS start sequence, GPS LED, transmit kicks).
pub const STATUS_PERIOD_MS: u32 = 500;

/// Delay between the USB connection and the greeting.
pub const GREETING_DELAY_MS: u32 = 100;

/// The PPS LED is switched on once the second is this far along. The PPS interrupt switches it
/// off.
pub const PPS_LED_SUBSEC: u16 = 499;

/// Longest line accepted from a serial port.
pub const LINE_SIZE: usize = 128;

/// Longest line accepted from the USB console.
pub const USB_LINE_SIZE: usize = 64;

const REPLY_SIZE: usize = 1024;

/// UARTs besides the USB console.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Port {
    /// Auxiliary console (or GPS bridge in proxy mode).
    Aux,
    Gps,
    Lidar,
}

impl Port {
    pub const ALL: [Self; 3] = [Self::Aux, Self::Gps, Self::Lidar];
}

/// GPS fix indicator state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Led {
    On,
    Off,
    Toggle,
}

/// Everything the dispatcher needs from the hardware.
pub trait Board: TriggerLevels {
    type Console: Read + ReadReady + Write;
    type Serial: Read + ReadReady + Write;
    type StoreError: fmt::Debug;

    fn feed_watchdog(&mut self);

    fn set_pps_led(&mut self, on: bool);

    fn set_gps_led(&mut self, state: Led);

    fn set_buzzer(&mut self, on: bool);

    fn display(&mut self, frame: &Frame);

    fn usb(&mut self) -> &mut Self::Console;

    /// Whether the USB host connected since the last call.
    fn usb_connected(&mut self) -> bool;

    fn serial(&mut self, port: Port) -> &mut Self::Serial;

    /// Start transmission of whatever is queued for `port`. Never waits.
    fn transmit(&mut self, port: Port);

    /// Pend the interrupt vector of the polled trigger channel.
    fn pend_polled_trigger(&mut self);

    /// Bounded housekeeping of the board (USB stack polling).
    fn service(&mut self);

    fn save_settings(&mut self, settings: &Settings) -> Result<(), Self::StoreError>;

    /// Software reset. Does not return on hardware.
    fn reset(&mut self);
}

/// One dispatcher step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    PpsLed,
    Greeting,
    Unshot,
    Status,
    Display,
    Service,
    UsbConsole,
    AuxConsole,
    GpsPort,
    LidarPort,
    Buzzer,
    PolledTrigger,
}

type Line = Vec<u8, LINE_SIZE>;

enum Input {
    Line(Line),
    Overflow,
}

fn input(event: LineEvent<'_>) -> Option<Input> {
    match event {
        LineEvent::Pending => None,
        // Note(unwrap): no reader holds more than `LINE_SIZE` bytes.
        LineEvent::Line(line) => Some(Input::Line(Vec::from_slice(line).unwrap())),
        LineEvent::Overflow => Some(Input::Overflow),
    }
}

/// Response text of one command, truncated when it does not fit.
struct Reply(String<REPLY_SIZE>);

impl fmt::Write for Reply {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                return Err(fmt::Error);
            }
        }
        Ok(())
    }
}

pub struct Dispatcher<B, G, L, P> {
    clock: LoopDomain<TRIGGERS>,
    board: B,
    gps: G,
    lidar: L,
    shell: P,
    settings: Settings,
    countdown: Countdown,
    buzzer: Buzzer,
    polled: PolledTrigger,
    usb_line: LineReader<USB_LINE_SIZE>,
    aux_line: LineReader<LINE_SIZE>,
    gps_line: LineReader<LINE_SIZE>,
    lidar_line: LineReader<LINE_SIZE>,
    connected_at: Option<u32>,
    last_status: u32,
    reported: [u32; TRIGGERS],
    last_event: Option<(u32, ShotRecord)>,
    event_shown: bool,
    last_second: Option<CalendarTime>,
}

impl<B, G, L, P> Dispatcher<B, G, L, P>
where
    B: Board,
    G: Gps,
    L: Lidar,
    P: CommandParser,
{
    /// Steps of one iteration, in order.
    pub const SCHEDULE: [Step; 12] = [
        Step::PpsLed,
        Step::Greeting,
        Step::Unshot,
        Step::Status,
        Step::Display,
        Step::Service,
        Step::UsbConsole,
        Step::AuxConsole,
        Step::GpsPort,
        Step::LidarPort,
        Step::Buzzer,
        Step::PolledTrigger,
    ];

    /// Construct the dispatcher and show the boot banner.
    ///
    /// # Args
    /// * `clock` - Dispatcher handle of the timing state.
    /// * `board` - The hardware, fully set up.
    /// * `settings` - Settings as loaded at boot.
    pub fn new(clock: LoopDomain<TRIGGERS>, mut board: B, gps: G, lidar: L, shell: P, settings: Settings) -> Self {
        board.display(&Frame::Splash);
        Self {
            last_status: clock.millis(),
            clock,
            board,
            gps,
            lidar,
            shell,
            countdown: Countdown::new(settings.start_second, settings.countdown_seconds),
            settings,
            buzzer: Buzzer::default(),
            polled: PolledTrigger::default(),
            usb_line: LineReader::with_echo(),
            aux_line: LineReader::new(),
            gps_line: LineReader::new(),
            lidar_line: LineReader::new(),
            connected_at: None,
            reported: [0; TRIGGERS],
            last_event: None,
            event_shown: false,
            last_second: None,
        }
    }

    pub fn clock(&self) -> &LoopDomain<TRIGGERS> {
        &self.clock
    }

    pub fn board(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    /// Run forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.run_once();
        }
    }

    /// One iteration of the loop.
    pub fn run_once(&mut self) {
        self.board.feed_watchdog();
        for step in Self::SCHEDULE {
            self.step(step);
            self.board.feed_watchdog();
        }
    }

    pub fn step(&mut self, step: Step) {
        match step {
            Step::PpsLed => {
                if self.clock.subsec() > PPS_LED_SUBSEC {
                    self.board.set_pps_led(true);
                }
            }
            Step::Greeting => self.greeting(),
            Step::Unshot => self.unshot(),
            Step::Status => self.status(),
            Step::Display => self.update_display(),
            Step::Service => self.board.service(),
            Step::UsbConsole => self.usb_console(),
            Step::AuxConsole => self.aux_console(),
            Step::GpsPort => self.gps_port(),
            Step::LidarPort => self.lidar_port(),
            Step::Buzzer => {
                if self.buzzer.expired(self.clock.millis(), self.settings.buzzer_ms) {
                    self.board.set_buzzer(false);
                }
            }
            Step::PolledTrigger => {
                let channel = TriggerVector::Polled.channels()[0];
                if self.polled.update(self.clock.gettrig(channel, &self.board)) {
                    self.board.pend_polled_trigger();
                }
            }
        }
    }

    /// Text output of the device: the USB console and, unless it is bridged to the GPS, the
    /// auxiliary console.
    fn send(&mut self, text: &str) {
        self.board.usb().write_all(text.as_bytes()).ok();
        if !self.settings.gps_proxy {
            self.board.serial(Port::Aux).write_all(text.as_bytes()).ok();
            self.board.transmit(Port::Aux);
        }
    }

    fn forward(&mut self, port: Port, bytes: &[u8]) {
        self.board.serial(port).write_all(bytes).ok();
        self.board.transmit(port);
    }

    fn greeting(&mut self) {
        let now = self.clock.millis();
        if self.board.usb_connected() {
            self.connected_at = Some(now);
        }
        if let Some(at) = self.connected_at {
            if elapsed(now, at) > GREETING_DELAY_MS {
                self.connected_at = None;
                let mut reply = Reply(String::new());
                fmt::Write::write_fmt(&mut reply, format_args!("Chronometer version {}.\n", crate::VERSION)).ok();
                self.board.usb().write_all(reply.0.as_bytes()).ok();
            }
        }
    }

    /// Consume shots whose input went back to idle and report new ones.
    fn unshot(&mut self) {
        let pending = self.clock.pending();
        for channel in 0..TRIGGERS {
            if pending & (1 << channel) == 0 {
                continue;
            }
            if !self.clock.gettrig(channel, &self.board) {
                self.clock.release(channel);
            }
            // Read the record after the release so a shot committed in between is not missed.
            let Some(shot) = self.clock.shot(channel) else {
                continue;
            };
            if shot.millis != self.reported[channel] {
                self.reported[channel] = shot.millis;
                self.report(channel, shot);
            }
        }
    }

    fn report(&mut self, channel: usize, shot: ShotRecord) {
        log::debug!("Shot on channel {channel}: {}", shot.stamp);
        let mut reply = Reply(String::new());
        report_shot(&mut reply, channel, &shot).ok();
        self.send(&reply.0);
        self.last_event = Some((shot.millis, shot));
        self.event_shown = false;
        if self.settings.buzzer_ms > 0 {
            self.buzzer.start(self.clock.millis());
            self.board.set_buzzer(true);
        }
    }

    fn status(&mut self) {
        let now = self.clock.millis();
        if elapsed(now, self.last_status) < STATUS_PERIOD_MS {
            return;
        }
        self.last_status = now;
        if let Some(sequence) = self.gps.start_sequence() {
            self.forward(Port::Gps, sequence);
        }
        self.board.feed_watchdog();
        self.board.set_gps_led(match self.gps.status() {
            GpsStatus::Valid => Led::Toggle,
            GpsStatus::NotValid => Led::On,
            GpsStatus::Unknown => Led::Off,
        });
        for port in Port::ALL {
            self.board.transmit(port);
        }
    }

    fn update_display(&mut self) {
        let now = self.clock.now();
        let second_changed = self.last_second != Some(now.time);
        let countdown = if second_changed {
            self.last_second = Some(now.time);
            let frame = self.countdown.on_second(now.time.second);
            if frame == CountdownFrame::Start {
                log::info!("Start at {now}");
                self.send("START!!!\n");
            }
            Some(frame)
        } else {
            None
        };

        if !self.settings.show_time {
            return;
        }
        if let Some((at, shot)) = self.last_event {
            if self.settings.show_shot && elapsed(self.clock.millis(), at) < self.settings.show_duration_ms {
                if !self.event_shown {
                    self.event_shown = true;
                    self.board.display(&Frame::Shot(shot.stamp));
                }
                return;
            }
        }
        if let Some(frame) = countdown {
            self.board.display(&Frame::live(now, frame));
        }
    }

    fn execute(&mut self, line: &[u8]) {
        let mut shots = [ShotRecord::default(); TRIGGERS];
        for (channel, shot) in shots.iter_mut().enumerate() {
            *shot = self.clock.shot(channel).unwrap_or_default();
        }
        let mut session = Session {
            settings: &mut self.settings,
            countdown: &mut self.countdown,
            now: self.clock.now(),
            shots,
            gps: self.gps.status(),
            action: None,
        };
        let mut reply = Reply(String::new());
        self.shell.parse(line, &mut session, &mut reply);
        let action = session.action;
        self.board.feed_watchdog();

        match action {
            Some(Action::Save) => match self.board.save_settings(&self.settings) {
                Ok(()) => fmt::Write::write_str(&mut reply, "Saved\n").ok(),
                Err(e) => {
                    log::warn!("Saving settings failed: {e:?}");
                    fmt::Write::write_str(&mut reply, "ERR save\n").ok()
                }
            },
            _ => None,
        };
        self.send(&reply.0);
        if action == Some(Action::Reset) {
            self.board.reset();
        }
    }

    /// Hand a console line to the command parser. Empty lines are dropped.
    fn command(&mut self, line: &[u8]) {
        if !trim_line(line).is_empty() {
            self.execute(line);
        }
    }

    fn usb_console(&mut self) {
        match input(self.usb_line.poll(self.board.usb())) {
            Some(Input::Line(line)) => self.command(&line),
            Some(Input::Overflow) => self.send("\nUSB buffer overflow!\n"),
            None => {}
        }
    }

    fn aux_console(&mut self) {
        match input(self.aux_line.poll(self.board.serial(Port::Aux))) {
            Some(Input::Line(line)) => {
                if self.settings.gps_proxy {
                    self.forward(Port::Gps, &line);
                } else {
                    self.forward(Port::Aux, &line);
                    self.command(&line);
                }
            }
            Some(Input::Overflow) => self.send("\nAUX buffer overflow!\n"),
            None => {}
        }
    }

    fn gps_port(&mut self) {
        let Some(Input::Line(line)) = input(self.gps_line.poll(self.board.serial(Port::Gps))) else {
            return;
        };
        if self.settings.gps_proxy {
            self.forward(Port::Aux, &line);
        }
        self.gps.parse_answer(&line);
        if let Some(time) = self.gps.take_time() {
            self.clock.post_time(time);
        }
    }

    fn lidar_port(&mut self) {
        match input(self.lidar_line.poll(self.board.serial(Port::Lidar))) {
            Some(Input::Line(line)) => {
                if self.settings.no_lidar {
                    self.forward(Port::Lidar, &line);
                    self.command(&line);
                } else {
                    self.lidar.parse(&line);
                }
            }
            Some(Input::Overflow) if self.settings.no_lidar => self.send("\nLIDAR buffer overflow!\n"),
            _ => {}
        }
    }
}
