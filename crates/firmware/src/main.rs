//! Pico Piano is [Embassy](https://embassy.dev)-based firmware for the boards of a sensing keyboard. Every
//! [Raspberry Pi Pico](https://www.raspberrypi.com/products/raspberry-pi-pico/) measures three keys on its ADC and
//! passes its notes along a ring of I2C links; the Controller closes the ring and speaks MIDI over USB.
//!
//! The role is chosen at build time with the `controller` or `worker` feature. Both roles split the work over the two
//! cores of the RP2040:
//! - core 1 owns the inbound link: it runs the bootstrap, then relays traffic around the ring;
//! - core 0 senses keys, serves the requests the relay hands over, blinks the LED, and on the Controller runs USB.
//!
//! For details about the protocol, see the `pico_piano_lib` crate.

#![no_std]
#![no_main]

#[cfg(all(feature = "controller", feature = "worker"))]
compile_error!("A build is either a `controller` or a `worker`, not both");
#[cfg(not(any(feature = "controller", feature = "worker")))]
compile_error!("A build must enable either the `controller` or the `worker` feature");

mod link;
mod sensor;
mod status;
#[cfg(feature = "controller")]
mod usb;

use crate::{
    link::{I2cLinkRx, I2cLinkTx},
    sensor::AdcSensor,
    status::{BUSY, IDLE, blink_task},
};
use defmt::*;
use embassy_executor::Executor;
use embassy_futures::yield_now;
use embassy_rp::{
    adc::{self, Adc, Channel},
    bind_interrupts,
    gpio::{Level, Output, Pull},
    i2c::{self, I2c},
    i2c_slave::I2cSlave,
    multicore::{Stack, spawn_core1},
    peripherals::{I2C0, I2C1},
};
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    mutex::Mutex,
    watch::{Receiver, Watch},
};
use embassy_time::Instant;
use pico_piano_lib::{
    application::Application,
    bootstrap::bootstrap,
    command_queue::CommandQueue,
    configuration::Timing,
    identity::NodeIdentity,
    relay::Relay,
};
use static_cell::StaticCell;

use {defmt_rtt as _, panic_probe as _};

#[cfg(feature = "worker")]
bind_interrupts!(
    #[doc(hidden)]
    struct Irqs {
        I2C0_IRQ => i2c::InterruptHandler<I2C0>;
        I2C1_IRQ => i2c::InterruptHandler<I2C1>;
        ADC_IRQ_FIFO => adc::InterruptHandler;
    }
);

#[cfg(feature = "controller")]
bind_interrupts!(
    #[doc(hidden)]
    struct Irqs {
        I2C0_IRQ => i2c::InterruptHandler<I2C0>;
        I2C1_IRQ => i2c::InterruptHandler<I2C1>;
        ADC_IRQ_FIFO => adc::InterruptHandler;
        USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<embassy_rp::peripherals::USB>;
    }
);

type LinkMutex = Mutex<CriticalSectionRawMutex, I2cLinkTx>;

#[cfg(feature = "controller")]
type Role = pico_piano_lib::role::Controller<'static, CriticalSectionRawMutex, I2cLinkTx, usb::UsbHost>;
#[cfg(feature = "worker")]
type Role = pico_piano_lib::role::Worker<'static, CriticalSectionRawMutex, I2cLinkTx>;

// the application and, on the Controller, the USB host bridge
const IDENTITY_RECEIVER_CNT: usize = 2;
type IdentitySync = Watch<CriticalSectionRawMutex, NodeIdentity, IDENTITY_RECEIVER_CNT>;
type IdentityReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, NodeIdentity, IDENTITY_RECEIVER_CNT>;

/// Published once by the relay when the bootstrap completes.
static IDENTITY: IdentitySync = Watch::new();

/// Administrative frames on their way from the relay (core 1) to the application (core 0).
static COMMANDS: CommandQueue<CriticalSectionRawMutex> = CommandQueue::new();

static LINK_TX: StaticCell<LinkMutex> = StaticCell::new();
static CORE1_STACK: StaticCell<Stack<8192>> = StaticCell::new();
static EXECUTOR0: StaticCell<Executor> = StaticCell::new();
static EXECUTOR1: StaticCell<Executor> = StaticCell::new();

#[cortex_m_rt::entry]
fn main() -> ! {
    info!("Initializing Pico Piano");
    let p = embassy_rp::init(Default::default());
    let timing = Timing::default();

    // for ease of wiring, the Controller writes to the next board on different pins than the Workers
    #[cfg(feature = "controller")]
    let (out_scl, out_sda) = (p.PIN_17, p.PIN_16);
    #[cfg(feature = "worker")]
    let (out_scl, out_sda) = (p.PIN_1, p.PIN_0);

    let outbound = I2c::new_async(p.I2C0, out_scl, out_sda, Irqs, link::controller_config());
    let link_tx: &'static LinkMutex = LINK_TX.init(Mutex::new(I2cLinkTx::new(outbound)));

    let inbound = I2cSlave::new(p.I2C1, p.PIN_15, p.PIN_14, Irqs, link::target_config());
    let link_rx = I2cLinkRx::new(inbound);

    let adc = Adc::new(p.ADC, Irqs, adc::Config::default());
    let channels = [
        Channel::new_pin(p.PIN_26, Pull::None),
        Channel::new_pin(p.PIN_27, Pull::None),
        Channel::new_pin(p.PIN_28, Pull::None),
    ];
    let sensor = AdcSensor::new(adc, channels);

    let led = Output::new(p.PIN_25, Level::Low);

    #[cfg(feature = "controller")]
    let (usb, midi_sender, midi_receiver, host) = {
        use embassy_usb::{Builder, class::midi::MidiClass};

        let driver = embassy_rp::usb::Driver::new(p.USB, Irqs);

        // per https://pid.codes, 0x1209/0x0001 is reserved for testing by FOSS projects
        let mut config = embassy_usb::Config::new(0x1209, 0x0001);
        config.manufacturer = Some("Pico Piano");
        config.product = Some("Pico Piano");
        config.max_power = 100;

        static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
        static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
        static CONTROL_BUFFER: StaticCell<[u8; 64]> = StaticCell::new();
        static USB_STATUS: StaticCell<usb::UsbStatus> = StaticCell::new();
        static HOST: StaticCell<usb::HostMutex> = StaticCell::new();

        let mut builder = Builder::new(
            driver,
            config,
            CONFIG_DESCRIPTOR.init([0; 256]),
            BOS_DESCRIPTOR.init([0; 256]),
            &mut [], // no msos descriptors
            CONTROL_BUFFER.init([0; 64]),
        );
        builder.handler(USB_STATUS.init(usb::UsbStatus::new(IDLE.sender())));

        let class = MidiClass::new(&mut builder, 1, 1, 64);
        let (sender, receiver) = class.split();
        let host: &'static usb::HostMutex = HOST.init(Mutex::new(&usb::HOST_OUT));

        (builder.build(), sender, receiver, host)
    };

    #[cfg(feature = "controller")]
    let role = || Role::new(link_tx, host);
    #[cfg(feature = "worker")]
    let role = || Role::new(link_tx);

    let relay_role = role();
    spawn_core1(p.CORE1, CORE1_STACK.init_with(Stack::new), move || {
        let executor1 = EXECUTOR1.init(Executor::new());
        executor1.run(|spawner| spawner.spawn(unwrap!(relay_task(relay_role, link_rx, timing))))
    });

    let executor0 = EXECUTOR0.init(Executor::new());
    executor0.run(|spawner| {
        spawner.spawn(unwrap!(blink_task(led, unwrap!(BUSY.receiver()), unwrap!(IDLE.receiver()))));

        let identity = unwrap!(IDENTITY.receiver());
        spawner.spawn(unwrap!(application_task(role(), sensor, timing, identity)));

        #[cfg(feature = "controller")]
        {
            spawner.spawn(unwrap!(usb::usb_task(usb)));
            spawner.spawn(unwrap!(usb::host_writer_task(midi_sender)));
            let identity = unwrap!(IDENTITY.receiver());
            spawner.spawn(unwrap!(usb::host_task(midi_receiver, role(), identity)));
        }
    })
}

/// Task responsible for the inbound link: discovers the ring, then keeps its traffic moving.
#[embassy_executor::task]
async fn relay_task(mut role: Role, mut link: I2cLinkRx, timing: Timing) {
    // gives the Workers a chance to start listening
    #[cfg(feature = "controller")]
    embassy_time::Timer::after(timing.startup_delay).await;

    let identity = match bootstrap(&mut role, &mut link).await {
        Ok(identity) => identity,
        Err(e) => {
            error!("Bootstrap failed: {}", e);
            return;
        }
    };
    IDENTITY.sender().send(identity);

    let mut relay = Relay::new(identity, &COMMANDS, &timing, Instant::now());
    let e = relay.run(&mut role, &mut link).await;
    error!("Relay stopped: {}", e);
}

/// Task responsible for sensing keys and serving requests, once the bootstrap has assigned an identity.
#[embassy_executor::task]
async fn application_task(
    mut role: Role,
    mut sensor: AdcSensor,
    timing: Timing,
    mut identity: IdentityReceiver<'static>,
) -> ! {
    let identity = identity.get().await;
    info!("Starting application as {}", identity);
    let mut app: Application = Application::new(identity, timing, Instant::now());

    let busy = BUSY.sender();
    let mut shown = None;
    loop {
        if let Err(e) = app.tick(Instant::now(), &COMMANDS, &mut sensor, &mut role).await {
            warn!("Application iteration failed: {}", e);
        }
        // the USB state is left to the USB stack
        if shown != Some(app.busy()) {
            shown = Some(app.busy());
            busy.send(app.busy());
        }
        // lets the LED and USB tasks run; the sensing loop is otherwise never idle
        yield_now().await;
    }
}
