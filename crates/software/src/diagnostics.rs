//! Health reports the nodes send toward the host: ring roundtrip time and main-loop throughput.

use crate::frame::{AdminFrame, Command};
use embassy_time::{Duration, Instant};

/// Measures how long a frame takes to travel the whole ring. Only the Controller runs one.
///
/// At most one probe is in flight: a new one goes out only once the previous one came back and the interval elapsed.
/// A probe lost on the way therefore stops the measurements, which is preferable to flooding a broken ring.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RoundtripProbe {
    interval: Duration,
    sent_at: Instant,
    answered: bool,
}

impl RoundtripProbe {
    /// Constructs a probe whose first measurement is due one `interval` after `now`.
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            sent_at: now,
            answered: true,
        }
    }

    /// Returns the probe frame to send when one is due, and records `now` as its departure.
    pub fn poll(&mut self, now: Instant) -> Option<AdminFrame> {
        if !self.answered || now.saturating_duration_since(self.sent_at) < self.interval {
            return None;
        }
        self.sent_at = now;
        self.answered = false;
        Some(AdminFrame::new(Command::Roundtrip, 0, 0))
    }

    /// Returns `true` while a probe is travelling the ring.
    pub fn in_flight(&self) -> bool {
        !self.answered
    }

    /// Closes the measurement of the probe that came back at `now` and builds the report for the host.
    ///
    /// Returns `None` when no probe was in flight, i.e., the roundtrip frame did not originate here.
    pub fn answer(&mut self, now: Instant) -> Option<AdminFrame> {
        if self.answered {
            return None;
        }
        self.answered = true;
        let elapsed = now.saturating_duration_since(self.sent_at);
        Some(AdminFrame::roundtrip(elapsed.as_micros()))
    }
}

/// Counts main-loop iterations and periodically reports the rate.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IterationCounter {
    interval: Duration,
    window_start: Instant,
    iterations: u32,
}

impl IterationCounter {
    /// Constructs a counter whose first report is due one `interval` after `now`.
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            iterations: 0,
        }
    }

    /// Counts one iteration. Once per `interval`, returns the iterations-per-millisecond report of `pico_id`.
    pub fn tick(&mut self, now: Instant, pico_id: u8) -> Option<AdminFrame> {
        self.iterations = self.iterations.saturating_add(1);

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }
        let per_ms = u64::from(self.iterations) / elapsed.as_millis().max(1);
        self.window_start = now;
        self.iterations = 0;

        Some(AdminFrame::iterations(pico_id, per_ms.min(u64::from(u32::MAX)) as u32))
    }
}
