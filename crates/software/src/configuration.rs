//! Build-time constants shared by every node in the chain, plus the runtime-tunable [`Timing`].
//!
//! All nodes must agree on the constants below, otherwise logical note numbers computed on one node
//! will not decompose correctly on another.

use embassy_time::Duration;

/// MIDI note number of the first channel of the Controller (`pico_id` 0).
pub const FIRST_NOTE: u8 = 65;

/// Number of analog sensing channels (i.e., keys) wired to each node.
pub const CHANNELS_PER_NODE: usize = 3;

/// How many nodes, Controller included, fit into the 7-bit note space starting at [`FIRST_NOTE`].
pub const MAX_NODES: usize = (128 - FIRST_NOTE as usize) / CHANNELS_PER_NODE;

/// The largest `pico_id` a Worker may be assigned while still owning addressable notes.
pub const MAX_WORKERS: u8 = (MAX_NODES - 1) as u8;

/// Capacity of the queue handing administrative frames from the relay to the application.
pub const COMMAND_QUEUE_LEN: usize = 10;

/// Capacity of the Controller's queue of frames waiting for the USB host.
pub const HOST_QUEUE_LEN: usize = 16;

/// I2C address every node listens on. Because the chain is point-to-point, one address suffices.
pub const LINK_ADDRESS: u8 = 75;

/// Periods governing the diagnostics and start-up behavior of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    /// Minimum time between two roundtrip probes sent by the Controller.
    pub probe_interval: Duration,
    /// Period of the iterations-per-millisecond report.
    pub stats_interval: Duration,
    /// Period between two ADC samples while a channel is being dumped.
    pub adc_dump_interval: Duration,
    /// How long the Controller waits after power-up before starting the bootstrap, giving
    /// the Workers a chance to start listening.
    pub startup_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_millis(5000),
            stats_interval: Duration::from_millis(5000),
            adc_dump_interval: Duration::from_millis(500),
            startup_delay: Duration::from_millis(500),
        }
    }
}
