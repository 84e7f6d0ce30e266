//! The Controller's USB MIDI device: the host-facing end of the ring.

use crate::{IdentityReceiver, Role, status::IdleSender};
use defmt::{panic, *};
use embassy_rp::{peripherals::USB, usb::Driver};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use embassy_time::Timer;
use embassy_usb::{
    Handler, UsbDevice,
    class::midi::{Receiver, Sender},
    driver::EndpointError,
};
use pico_piano_lib::{
    frame::AdminFrame,
    host::{HostOutbox, forward_host_frame},
    identity::NodeIdentity,
    status::BlinkRate,
    usb_midi::{EventPacket, UsbMidiParser, packetize},
};

pub type UsbDriver = Driver<'static, USB>;
pub type UsbHost = &'static HostOutbox<CriticalSectionRawMutex>;
pub type HostMutex = Mutex<CriticalSectionRawMutex, UsbHost>;

/// Frames from the relay and the application, waiting for [`host_writer_task`].
pub static HOST_OUT: HostOutbox<CriticalSectionRawMutex> = HostOutbox::new();

/// Hosts drop the first messages after enumeration; this many throwaway frames go out first.
const WARM_UP_FRAMES: usize = 100;
const WARM_UP_PERIOD_MS: u64 = 10;

#[doc(hidden)]
struct Disconnected {}

impl From<EndpointError> for Disconnected {
    fn from(val: EndpointError) -> Self {
        match val {
            EndpointError::BufferOverflow => panic!("Buffer overflow"),
            EndpointError::Disabled => Disconnected {},
        }
    }
}

#[embassy_executor::task]
pub async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) -> ! {
    usb.run().await
}

/// Task responsible for writing the queued frames to the host.
///
/// Writing waits for the host to read, possibly forever. Only this task waits; the outbox drops what does not fit.
#[embassy_executor::task]
pub async fn host_writer_task(mut sender: Sender<'static, UsbDriver>) -> ! {
    loop {
        sender.wait_connection().await;
        let _ = drain(&mut sender).await;
    }
}

async fn drain(sender: &mut Sender<'static, UsbDriver>) -> Result<(), Disconnected> {
    loop {
        let packet = HOST_OUT.next().await;
        for event in packetize(&packet) {
            sender.write_packet(&event).await?;
        }
    }
}

/// Task responsible for the traffic from the host into the ring.
#[embassy_executor::task]
pub async fn host_task(
    mut receiver: Receiver<'static, UsbDriver>,
    mut role: Role,
    mut identity: IdentityReceiver<'static>,
) -> ! {
    loop {
        receiver.wait_connection().await;
        info!("USB connected");
        warm_up().await;

        let node = identity.get().await;
        let _ = bridge(&mut receiver, &node, &mut role).await;
        info!("USB disconnected");
    }
}

async fn warm_up() {
    let junk = AdminFrame::iterations(0x7F, u32::MAX).to_packet();
    for _ in 0..WARM_UP_FRAMES {
        HOST_OUT.post(&junk);
        Timer::after_millis(WARM_UP_PERIOD_MS).await;
    }
}

/// Helper function which parses the event packets sent by the host and forwards the frames they carry.
async fn bridge(
    receiver: &mut Receiver<'static, UsbDriver>,
    identity: &NodeIdentity,
    role: &mut Role,
) -> Result<(), Disconnected> {
    let mut buf = [0; 64];
    let mut parser = UsbMidiParser::new();
    loop {
        let n = receiver.read_packet(&mut buf).await?;
        for chunk in buf[..n].chunks(4) {
            let Ok(event) = <&EventPacket>::try_from(chunk) else {
                error!("USB-MIDI Event Packets must always be 32 bits long");
                continue;
            };
            let Some(packet) = parser.push(event) else {
                continue;
            };
            if let Err(e) = forward_host_frame(&packet, identity, role).await {
                warn!("Could not forward host frame {:#x}: {}", packet, e);
            }
        }
    }
}

/// Reflects the USB device state on the status LED.
pub struct UsbStatus {
    idle: IdleSender<'static>,
    configured: bool,
}

impl UsbStatus {
    pub fn new(idle: IdleSender<'static>) -> Self {
        Self {
            idle,
            configured: false,
        }
    }
}

impl Handler for UsbStatus {
    fn configured(&mut self, configured: bool) {
        self.configured = configured;
        self.idle.send(if configured {
            BlinkRate::Mounted
        } else {
            BlinkRate::NotMounted
        });
    }

    fn suspended(&mut self, suspended: bool) {
        let rate = match (suspended, self.configured) {
            (true, _) => BlinkRate::Suspended,
            (false, true) => BlinkRate::Mounted,
            (false, false) => BlinkRate::NotMounted,
        };
        self.idle.send(rate);
    }
}
