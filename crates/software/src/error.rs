//! Failures of the boundaries the library talks through.
//!
//! None of these are recoverable at the protocol level: there is no acknowledgment or retransmission layer, so callers
//! either drop the frame in question or, for the relay, stop altogether.

/// Errors reported by the hardware boundaries (see [`crate::link`] and [`crate::application::Sensor`]).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The outbound link did not accept a frame.
    LinkWrite,
    /// The inbound link failed while receiving a frame.
    LinkRead,
    /// The USB host could not be written to.
    HostWrite,
    /// An analog channel could not be sampled.
    Sampling,
}
