//! The status LED, reduced to how fast it should blink.

use embassy_time::Duration;

/// What the status LED communicates.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlinkRate {
    /// Busy: bootstrapping, or serving a dump or regulation request.
    Fast,
    /// Powered but not enumerated by a USB host.
    #[default]
    NotMounted,
    /// Ready and playing.
    Mounted,
    /// The USB host suspended the bus.
    Suspended,
}

impl BlinkRate {
    /// Time between two LED toggles.
    pub const fn interval(&self) -> Duration {
        match self {
            BlinkRate::Fast => Duration::from_millis(100),
            BlinkRate::NotMounted => Duration::from_millis(250),
            BlinkRate::Mounted => Duration::from_millis(1000),
            BlinkRate::Suspended => Duration::from_millis(2500),
        }
    }
}

/// What the LED reflects: whether the node is busy, and otherwise the state of its USB link.
///
/// The two halves have different owners. The application knows when it is busy, while on the Controller only the USB
/// stack knows whether a host mounted the device. Workers have no USB and rest at [`BlinkRate::Mounted`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Indicator {
    /// Bootstrapping, or serving a dump or regulation request.
    pub busy: bool,
    /// The rate shown while not busy.
    pub idle: BlinkRate,
}

impl Indicator {
    /// The rate the LED should blink at.
    pub const fn rate(&self) -> BlinkRate {
        if self.busy { BlinkRate::Fast } else { self.idle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busier_blinks_faster() {
        let rates = [
            BlinkRate::Fast,
            BlinkRate::NotMounted,
            BlinkRate::Mounted,
            BlinkRate::Suspended,
        ];
        for pair in rates.windows(2) {
            assert!(pair[0].interval() < pair[1].interval(), "Expected {:?} to blink faster than {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn busy_overrides_usb_state() {
        let mut indicator = Indicator {
            busy: true,
            idle: BlinkRate::Suspended,
        };
        assert_eq!(BlinkRate::Fast, indicator.rate(), "Expected left but got right");

        indicator.busy = false;
        assert_eq!(BlinkRate::Suspended, indicator.rate(), "Expected left but got right");

        indicator.idle = BlinkRate::NotMounted;
        assert_eq!(BlinkRate::NotMounted, indicator.rate());
    }
}
