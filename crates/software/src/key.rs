//! Turns the distance readings of one key into timed strike and release events.
//!
//! Readings decrease as the key goes down. A key travels through three thresholds:
//!
//! ```text
//!   drop ─────────── released again once the reading rises past this
//!   let_off ──────── the key starts moving; the press timer starts
//!   strike ───────── the hammer would hit the string; velocity is taken from the time since let_off
//! ```
//!
//! `drop` sits above `let_off` so a sounding key does not chatter on and off around a single threshold.

use embassy_time::{Duration, Instant};
use num_traits::Float;
use wmidi::U7;

/// Where a key is in its travel.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyStatus {
    /// At rest.
    #[default]
    Idle,
    /// Past let-off, on its way to the strike point.
    Fly,
    /// Struck; a note is sounding.
    Sound,
}

/// Per-key thresholds and velocity curve, rewritable through regulation.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    /// Reading below which the key counts as moving.
    pub let_off: u16,
    /// Reading below which the key counts as struck.
    pub strike: u16,
    /// Reading above which a struck key counts as released.
    pub drop: u16,
    /// Velocity for a 1 ms let-off to strike travel.
    pub vel_const: f32,
    /// Velocity lost per decade of travel time.
    pub vel_slope: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        let vel_slope = 71.3;
        Self {
            let_off: 2500,
            strike: 2100,
            drop: 3000,
            vel_const: 57.96 + vel_slope * core::f32::consts::LOG10_2,
            vel_slope,
        }
    }
}

impl Calibration {
    /// Maps the let-off to strike travel time onto a note-on velocity.
    ///
    /// Follows `vel_const - vel_slope * log10(ms)`. The result is kept within `1..=127` since a note-on with velocity 0
    /// reads as a note-off.
    pub fn velocity(&self, travel: Duration) -> U7 {
        // sub-microsecond travel would send log10 toward negative infinity
        let micros = travel.as_micros().max(1);
        let millis = micros as f32 / 1000.0;
        let velocity = self.vel_const - self.vel_slope * millis.log10();

        if velocity.is_nan() {
            return U7::from_u8_lossy(1);
        }
        U7::from_u8_lossy(velocity.round().clamp(1.0, 127.0) as u8)
    }
}

/// What a key reports when its status changes in a way the host cares about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyEvent {
    /// The key was struck at the given velocity.
    Pressed(U7),
    /// A struck key was let go.
    Released,
}

/// The hysteresis state machine of one sensing channel.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Key {
    status: KeyStatus,
    press_start: Instant,
    /// Thresholds and velocity curve in use.
    pub calibration: Calibration,
}

impl Default for Key {
    fn default() -> Self {
        Self::new(Calibration::default())
    }
}

impl Key {
    /// Constructs an idle key.
    pub fn new(calibration: Calibration) -> Self {
        Self {
            status: KeyStatus::Idle,
            press_start: Instant::from_ticks(0),
            calibration,
        }
    }

    /// Current status.
    pub fn status(&self) -> KeyStatus {
        self.status
    }

    /// Feeds one reading taken at `now`. Returns an event when the key was struck or released.
    pub fn sense(&mut self, distance: u16, now: Instant) -> Option<KeyEvent> {
        let calibration = &self.calibration;
        match self.status {
            KeyStatus::Idle if distance < calibration.let_off => {
                self.status = KeyStatus::Fly;
                self.press_start = now;
                None
            }
            KeyStatus::Fly if distance < calibration.strike => {
                self.status = KeyStatus::Sound;
                let travel = now.saturating_duration_since(self.press_start);
                Some(KeyEvent::Pressed(calibration.velocity(travel)))
            }
            KeyStatus::Fly if distance > calibration.let_off => {
                // the key came back up without being struck
                self.status = KeyStatus::Idle;
                None
            }
            KeyStatus::Sound if distance > calibration.drop => {
                self.status = KeyStatus::Idle;
                Some(KeyEvent::Released)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_and_release() {
        let mut key = Key::default();
        let samples = [3000, 2400, 2000, 1900, 3100];
        let expected_status = [
            KeyStatus::Idle,
            KeyStatus::Fly,
            KeyStatus::Sound,
            KeyStatus::Sound,
            KeyStatus::Idle,
        ];

        let mut pressed = 0;
        let mut released = 0;
        for (i, (sample, expected)) in samples.into_iter().zip(expected_status).enumerate() {
            let now = Instant::from_millis(i as u64 * 2);
            match key.sense(sample, now) {
                Some(KeyEvent::Pressed(_)) => {
                    assert_eq!(0, released, "Note-on must come before note-off");
                    pressed += 1
                }
                Some(KeyEvent::Released) => released += 1,
                None => {}
            }
            assert_eq!(expected, key.status(), "Expected left but got right after sample {}", i);
        }

        assert_eq!((1, 1), (pressed, released), "Expected exactly one note-on and one note-off");
    }

    #[test]
    fn fly_returns_to_idle_silently() {
        let mut key = Key::default();
        assert_eq!(None, key.sense(2400, Instant::from_millis(0)));
        assert_eq!(None, key.sense(2600, Instant::from_millis(1)));
        assert_eq!(KeyStatus::Idle, key.status());
    }

    #[test]
    fn sounding_key_holds_between_let_off_and_drop() {
        let mut key = Key::default();
        key.sense(2400, Instant::from_millis(0));
        key.sense(2000, Instant::from_millis(3));

        assert_eq!(None, key.sense(2800, Instant::from_millis(4)));
        assert_eq!(KeyStatus::Sound, key.status());
    }

    #[test]
    fn velocity_uses_travel_time() {
        let mut key = Key::default();
        key.sense(2400, Instant::from_millis(10));
        let event = key.sense(2000, Instant::from_millis(12));

        // 2 ms is the reference point of the default curve
        assert_eq!(Some(KeyEvent::Pressed(U7::from_u8_lossy(58))), event);
    }

    #[test]
    fn faster_is_louder() {
        let calibration = Calibration::default();
        let fast = calibration.velocity(Duration::from_micros(500));
        let slow = calibration.velocity(Duration::from_millis(20));
        assert!(u8::from(fast) > u8::from(slow), "Expected {} > {}", u8::from(fast), u8::from(slow));
    }

    #[test]
    fn velocity_stays_audible() {
        let calibration = Calibration::default();
        assert_eq!(U7::from_u8_lossy(127), calibration.velocity(Duration::from_ticks(0)));
        assert_eq!(U7::from_u8_lossy(1), calibration.velocity(Duration::from_secs(60)));

        let broken = Calibration {
            vel_const: f32::NAN,
            ..Calibration::default()
        };
        assert_eq!(U7::from_u8_lossy(1), broken.velocity(Duration::from_millis(2)));
    }
}
