//! Drives the on-board LED (GPIO 25) at the rate of the current [`Indicator`].

use embassy_futures::select::{Either3, select3};
use embassy_rp::gpio::Output;
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    watch::{Receiver, Watch},
};
use embassy_time::Timer;
use pico_piano_lib::status::{BlinkRate, Indicator};

const RECEIVER_CNT: usize = 1;
type BusySync = Watch<CriticalSectionRawMutex, bool, RECEIVER_CNT>;
type IdleSync = Watch<CriticalSectionRawMutex, BlinkRate, RECEIVER_CNT>;
pub type BusyReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, bool, RECEIVER_CNT>;
#[cfg(feature = "controller")]
pub type IdleSender<'a> = embassy_sync::watch::Sender<'a, CriticalSectionRawMutex, BlinkRate, RECEIVER_CNT>;
pub type IdleReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, BlinkRate, RECEIVER_CNT>;

/// Set by the application. Busy until the bootstrap completes and the application takes over.
pub static BUSY: BusySync = Watch::new_with(true);

/// Set by the USB stack.
#[cfg(feature = "controller")]
pub static IDLE: IdleSync = Watch::new_with(BlinkRate::NotMounted);
/// Workers have no USB, so they never leave this rate.
#[cfg(feature = "worker")]
pub static IDLE: IdleSync = Watch::new_with(BlinkRate::Mounted);

#[embassy_executor::task]
pub async fn blink_task(mut led: Output<'static>, mut busy: BusyReceiver<'static>, mut idle: IdleReceiver<'static>) -> ! {
    let mut indicator = Indicator {
        busy: busy.get().await,
        idle: idle.get().await,
    };
    loop {
        led.toggle();
        // a new rate takes effect immediately rather than after the current period
        match select3(busy.changed(), idle.changed(), Timer::after(indicator.rate().interval())).await {
            Either3::First(now_busy) => indicator.busy = now_busy,
            Either3::Second(rate) => indicator.idle = rate,
            Either3::Third(()) => {}
        }
    }
}
