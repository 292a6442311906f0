//! # Chronometer
//!
//! Firmware for a GPS disciplined sports chronometer with four trigger inputs.
//!
//! All timing state writers (tick, PPS and trigger interrupts) run at one priority and share the
//! interrupt half of the timing state without locks. The UARTs run below them, and the dispatcher
//! owns everything else from `idle`.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
use panic_probe as _; // global panic handler

#[cfg(target_os = "none")]
use chronometer::hardware::hal;

#[cfg(not(target_os = "none"))]
fn main() {
    let settings = chronometer::settings::Settings::default();
    let mut buf = [0u8; 1024];
    match settings.dump(&mut buf) {
        Some(json) => println!("{json}"),
        None => eprintln!("Settings do not fit the dump buffer"),
    }
}

#[cfg(target_os = "none")]
#[cfg_attr(target_os = "none", rtic::app(device = hal::stm32, peripherals = true))]
mod app {
    use super::*;
    use chronometer::{
        clock::PpsDiscipline,
        commands::Shell,
        dispatcher::Dispatcher,
        gps::RmcGps,
        hardware::{
            board::ChronometerBoard,
            gpio::{ExtiLines, PpsLed, PPS_LINE},
            setup::setup,
            system_timer::TickTimer,
            uart::{self, SerialQueues, Uart},
        },
        lidar::LogLidar,
        timing::{IsrDomain, TimingCore},
        trigger::{TriggerVector, TRIGGERS},
    };

    static TIMING: TimingCore<TRIGGERS> = TimingCore::new();

    type Chronometer = Dispatcher<ChronometerBoard, RmcGps, LogLidar, Shell>;

    #[shared]
    struct Shared {
        #[lock_free]
        isr: IsrDomain<TRIGGERS>,
        #[lock_free]
        tick: TickTimer,
    }

    #[local]
    struct Local {
        dispatcher: Chronometer,
        discipline: PpsDiscipline,
        pps_led: PpsLed,
        aux: Uart<hal::pac::USART1>,
        gps: Uart<hal::pac::USART2>,
        lidar: Uart<hal::pac::USART3>,
    }

    #[init(local = [
        queues: [SerialQueues; 3] = [SerialQueues::new(), SerialQueues::new(), SerialQueues::new()],
    ])]
    fn init(c: init::Context) -> (Shared, Local) {
        let chronometer = setup(c.device, c.local.queues);

        // Note(unwrap): init runs once.
        let (isr, clock) = TIMING.split(chronometer.settings.channels()).unwrap();

        let dispatcher = Dispatcher::new(
            clock,
            chronometer.board,
            RmcGps::new(),
            LogLidar::default(),
            Shell,
            chronometer.settings,
        );

        (
            Shared {
                isr,
                tick: chronometer.tick,
            },
            Local {
                dispatcher,
                discipline: chronometer.discipline,
                pps_led: chronometer.pps_led,
                aux: chronometer.aux,
                gps: chronometer.gps,
                lidar: chronometer.lidar,
            },
        )
    }

    #[idle(local = [dispatcher])]
    fn idle(c: idle::Context) -> ! {
        c.local.dispatcher.run()
    }

    #[task(binds = TIM2, priority = 3, shared = [isr, tick])]
    fn tick(c: tick::Context) {
        c.shared.tick.clear_irq();
        c.shared.isr.tick();
    }

    #[task(binds = EXTI1, priority = 3, local = [discipline, pps_led], shared = [isr, tick])]
    fn pps(c: pps::Context) {
        ExtiLines::clear(PPS_LINE);
        let millis = c.shared.isr.millis();
        let drift = c.shared.isr.pps();
        c.local.pps_led.set(false);
        let reload = c.local.discipline.update(drift, millis);
        c.shared.tick.set_reload(reload);
        log::debug!(
            "PPS drift {drift} ms, reload {reload} (trim {})",
            c.local.discipline.trim()
        );
    }

    // Channels 0 and 1 share this vector.
    #[task(binds = EXTI15_10, priority = 3, shared = [isr])]
    fn trigger_exti15_10(c: trigger_exti15_10::Context) {
        let serviced = c
            .shared
            .isr
            .handle(TriggerVector::Exti15_10, ExtiLines::channel_pending);
        ExtiLines::clear_channels(serviced);
    }

    #[task(binds = EXTI4, priority = 3, shared = [isr])]
    fn trigger_exti4(c: trigger_exti4::Context) {
        let serviced = c
            .shared
            .isr
            .handle(TriggerVector::Exti4, ExtiLines::channel_pending);
        ExtiLines::clear_channels(serviced);
    }

    // Pended by the dispatcher for the polled channel, no EXTI line is routed here.
    #[task(binds = EXTI9_5, priority = 3, shared = [isr])]
    fn trigger_polled(c: trigger_polled::Context) {
        c.shared.isr.handle(TriggerVector::Polled, |_| true);
    }

    #[task(binds = USART1, priority = 2, local = [aux])]
    fn aux_uart(c: aux_uart::Context) {
        uart::on_usart1(c.local.aux);
    }

    #[task(binds = USART2, priority = 2, local = [gps])]
    fn gps_uart(c: gps_uart::Context) {
        uart::on_usart2(c.local.gps);
    }

    #[task(binds = USART3, priority = 2, local = [lidar])]
    fn lidar_uart(c: lidar_uart::Context) {
        uart::on_usart3(c.local.lidar);
    }
}
