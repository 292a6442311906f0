//! Chronometer hardware configuration
//!
//! This file contains all of the hardware-specific configuration of the chronometer.
//!
//! The boot order is fixed: logger, clocks, settings, pins and EXTI (wired from the settings),
//! tick timer, UARTs, USB and the watchdog last.
use fugit::ExtU32;
use log::{info, warn};
use rtt_logger::RTTLogger;

use super::{
    board::ChronometerBoard,
    flash::settings_flash,
    gpio::{Outputs, PpsLed, TriggerPins},
    hal::{
        self,
        gpio::{Edge, ExtiPin},
        independent_watchdog::IndependentWatchdog,
        prelude::*,
        serial::Event,
    },
    metadata::{ApplicationMetadata, ResetCause},
    system_timer::TickTimer,
    uart::{SerialQueues, Uart},
    usb::{UsbBus, UsbConsole},
    HSE_READY_POLLS, WATCHDOG_TIMEOUT_MS,
};
use crate::clock::{bounded_wait, PpsDiscipline};
use crate::settings::Settings;

const AUX_BAUD: u32 = 115_200;
const GPS_BAUD: u32 = 9_600;
const LIDAR_BAUD: u32 = 115_200;

/// Everything [setup] hands to the application.
pub struct ChronometerDevices {
    pub board: ChronometerBoard,
    pub settings: Settings,
    pub tick: TickTimer,
    pub discipline: PpsDiscipline,
    pub pps_led: PpsLed,
    pub aux: Uart<hal::pac::USART1>,
    pub gps: Uart<hal::pac::USART2>,
    pub lidar: Uart<hal::pac::USART3>,
}

/// Configure the chronometer hardware.
///
/// # Args
/// * `device` - The microcontroller peripherals to be configured.
/// * `queues` - Backing storage of the auxiliary, GPS and LIDAR UART queues.
///
/// # Returns
/// The devices, with the watchdog running.
pub fn setup(
    device: hal::pac::Peripherals,
    queues: &'static mut [SerialQueues; 3],
) -> ChronometerDevices {
    static LOGGER: RTTLogger = RTTLogger::new(log::LevelFilter::Trace);
    rtt_target::rtt_init_print!();
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(log::LevelFilter::Trace))
        .unwrap();
    info!("---Starting Hardware Setup");

    let rsr = device.RCC.rsr.read();
    let reset_cause = if rsr.iwdg1rstf().bit_is_set() {
        warn!("Reset by watchdog");
        ResetCause::Watchdog
    } else if rsr.sftrstf().bit_is_set() {
        ResetCause::Software
    } else if rsr.porrstf().bit_is_set() {
        ResetCause::PowerOn
    } else if rsr.pinrstf().bit_is_set() {
        ResetCause::Pin
    } else {
        ResetCause::Other
    };
    device.RCC.rsr.modify(|_, w| w.rmvf().set_bit());

    // Bounded wait for the crystal, HSI otherwise.
    device.RCC.cr.modify(|_, w| w.hseon().set_bit());
    let hse = match bounded_wait(HSE_READY_POLLS, || device.RCC.cr.read().hserdy().bit_is_set()) {
        Ok(polls) => {
            info!("HSE ready after {polls} polls");
            true
        }
        Err(_) => {
            warn!("HSE not ready, running from HSI");
            device.RCC.cr.modify(|_, w| w.hseon().clear_bit());
            false
        }
    };

    // Setup power and clocks
    let pwr = device.PWR.constrain();
    let pwrcfg = pwr.freeze();
    let rcc = device.RCC.constrain();
    let rcc = if hse { rcc.use_hse(8.MHz()) } else { rcc };
    let mut ccdr = rcc
        .sysclk(400.MHz())
        .hclk(200.MHz())
        .per_ck(100.MHz())
        .freeze(pwrcfg, &device.SYSCFG);

    if ccdr.clocks.hsi48_ck().is_none() {
        warn!("HSI48 not running, USB will not enumerate");
    }
    ccdr.peripheral
        .kernel_usb_clk_mux(hal::rcc::rec::UsbClkSel::Hsi48);

    // Settings come before the pins, they decide pull-ups and edges.
    let (bank1, bank2) = device.FLASH.split();
    let mut flash = settings_flash(bank2.unwrap_or(bank1));
    let settings = flash.load();
    info!("Settings: {settings:?}");

    let gpioa = device.GPIOA.split(ccdr.peripheral.GPIOA);
    let gpiob = device.GPIOB.split(ccdr.peripheral.GPIOB);
    let gpiod = device.GPIOD.split(ccdr.peripheral.GPIOD);
    let gpioe = device.GPIOE.split(ccdr.peripheral.GPIOE);

    let mut syscfg = device.SYSCFG;
    let mut exti = device.EXTI;

    let triggers = TriggerPins::new(
        TriggerPins {
            ch0: gpioe.pe10.into_input(),
            ch1: gpioe.pe11.into_input(),
            ch2: gpioe.pe4.into_input(),
            ch3: gpioe.pe5.into_input(),
        },
        &settings.channels(),
        &mut syscfg,
        &mut exti,
    );

    let mut pps = gpioa.pa1.into_input();
    pps.make_interrupt_source(&mut syscfg);
    pps.trigger_on_edge(&mut exti, Edge::Rising);
    pps.enable_interrupt(&mut exti);

    let pps_led = PpsLed::new(gpiob.pb0.into_push_pull_output());
    pps_led.set(false);
    let outputs = Outputs::new(Outputs {
        gps_led: gpioe.pe1.into_push_pull_output(),
        buzzer: gpiob.pb14.into_push_pull_output(),
    });

    let (tick, discipline) = TickTimer::new(
        device
            .TIM2
            .timer(1.kHz(), ccdr.peripheral.TIM2, &ccdr.clocks),
        ccdr.clocks.timx_ker_ck().raw(),
    );
    info!("Tick reload: {}", discipline.reload());

    let [aux_queues, gps_queues, lidar_queues] = queues;
    let (aux_channel, aux_port) = aux_queues.split();
    let (gps_channel, gps_port) = gps_queues.split();
    let (lidar_channel, lidar_port) = lidar_queues.split();

    let mut aux = device
        .USART1
        .serial(
            (gpioa.pa9.into_alternate(), gpioa.pa10.into_alternate()),
            AUX_BAUD.bps(),
            ccdr.peripheral.USART1,
            &ccdr.clocks,
        )
        .unwrap();
    aux.listen(Event::Rxne);

    let mut gps = device
        .USART2
        .serial(
            (gpiod.pd5.into_alternate(), gpiod.pd6.into_alternate()),
            GPS_BAUD.bps(),
            ccdr.peripheral.USART2,
            &ccdr.clocks,
        )
        .unwrap();
    gps.listen(Event::Rxne);

    let mut lidar = device
        .USART3
        .serial(
            (gpiod.pd8.into_alternate(), gpiod.pd9.into_alternate()),
            LIDAR_BAUD.bps(),
            ccdr.peripheral.USART3,
            &ccdr.clocks,
        )
        .unwrap();
    lidar.listen(Event::Rxne);

    let usb = {
        let usb = hal::usb_hs::USB2::new(
            device.OTG2_HS_GLOBAL,
            device.OTG2_HS_DEVICE,
            device.OTG2_HS_PWRCLK,
            gpioa.pa11.into_alternate(),
            gpioa.pa12.into_alternate(),
            ccdr.peripheral.USB2OTG,
            &ccdr.clocks,
        );

        let ep_memory = cortex_m::singleton!(: [u32; 1024] = [0; 1024]).unwrap();
        let usb_bus = cortex_m::singleton!(: usb_device::class_prelude::UsbBusAllocator<UsbBus> =
            UsbBus::new(usb, ep_memory))
        .unwrap();

        let read_store = cortex_m::singleton!(: [u8; 128] = [0; 128]).unwrap();
        let write_store = cortex_m::singleton!(: [u8; 1024] = [0; 1024]).unwrap();
        let serial =
            usbd_serial::SerialPort::new_with_store(usb_bus, &mut read_store[..], &mut write_store[..]);

        let device = usb_device::device::UsbDeviceBuilder::new(
            usb_bus,
            usb_device::device::UsbVidPid(0x1209, 0x392F),
        )
        .strings(&[usb_device::device::StringDescriptors::default()
            .manufacturer("chronometer")
            .product("Chronometer")
            .serial_number("0001")])
        .unwrap()
        .device_class(usbd_serial::USB_CLASS_CDC)
        .build();

        UsbConsole::new(device, serial)
    };

    let metadata = ApplicationMetadata::new(reset_cause, hse);
    info!("{metadata:?}");

    // The watchdog runs from here on, nothing below may take long.
    let mut watchdog = IndependentWatchdog::new(device.IWDG);
    watchdog.start(WATCHDOG_TIMEOUT_MS.millis());

    info!("--- Hardware setup done");

    ChronometerDevices {
        board: ChronometerBoard {
            watchdog,
            pps_led,
            outputs,
            triggers,
            usb,
            aux: aux_channel,
            gps: gps_channel,
            lidar: lidar_channel,
            flash,
        },
        settings,
        tick,
        discipline,
        pps_led,
        aux: Uart {
            serial: aux,
            port: aux_port,
        },
        gps: Uart {
            serial: gps,
            port: gps_port,
        },
        lidar: Uart {
            serial: lidar,
            port: lidar_port,
        },
    }
}
