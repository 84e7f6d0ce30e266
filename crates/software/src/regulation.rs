//! Reading and rewriting a key's [`Calibration`] over the link.
//!
//! A regulation session is opened by a regulate frame addressed to a local key. The five parameters then arrive one per
//! continue-regulation frame, in [`Parameter`] order, and a sixth continue-regulation frame closes the session without
//! carrying anything. Thresholds travel as 14-bit integers, the velocity curve as an integer part and hundredths.

use crate::{
    frame::{AdminFrame, Command, MAX_U14},
    key::Calibration,
};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{Float, FromPrimitive};

/// The calibration parameters, numbered in the order a session transfers them.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Parameter {
    /// [`Calibration::let_off`]
    LetOff = 1,
    /// [`Calibration::strike`]
    Strike = 2,
    /// [`Calibration::drop`]
    Drop = 3,
    /// [`Calibration::vel_const`]
    VelConst = 4,
    /// [`Calibration::vel_slope`]
    VelSlope = 5,
}

impl Parameter {
    /// All parameters in transfer order.
    pub const ALL: [Parameter; 5] = [
        Parameter::LetOff,
        Parameter::Strike,
        Parameter::Drop,
        Parameter::VelConst,
        Parameter::VelSlope,
    ];

    /// Overwrites this parameter of `calibration` with the value carried by `frame`.
    pub fn apply(&self, frame: &AdminFrame, calibration: &mut Calibration) {
        match self {
            Parameter::LetOff => calibration.let_off = frame.u14(),
            Parameter::Strike => calibration.strike = frame.u14(),
            Parameter::Drop => calibration.drop = frame.u14(),
            Parameter::VelConst => calibration.vel_const = decode_hundredths(frame),
            Parameter::VelSlope => calibration.vel_slope = decode_hundredths(frame),
        }
    }

    /// Encodes this parameter of `calibration` into a dump-regulation frame.
    pub fn dump(&self, calibration: &Calibration) -> AdminFrame {
        let threshold = |value: u16| AdminFrame::with_u14(Command::DumpRegulation, value.min(MAX_U14));
        match self {
            Parameter::LetOff => threshold(calibration.let_off),
            Parameter::Strike => threshold(calibration.strike),
            Parameter::Drop => threshold(calibration.drop),
            Parameter::VelConst => encode_hundredths(calibration.vel_const),
            Parameter::VelSlope => encode_hundredths(calibration.vel_slope),
        }
    }
}

fn decode_hundredths(frame: &AdminFrame) -> f32 {
    f32::from(frame.payload0()) + f32::from(frame.payload1()) / 100.0
}

/// Splits `value` into its integer part (at most `0x7F`) and hundredths (at most 99).
fn encode_hundredths(value: f32) -> AdminFrame {
    let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 127.99) };
    let integer = value.trunc();
    let hundredths = ((value - integer) * 100.0).round().min(99.0);
    AdminFrame::new(Command::DumpRegulation, integer as u8, hundredths as u8)
}

/// Outcome of feeding one frame to a [`Regulation`] session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegulationStep {
    /// The frame was not a continue-regulation frame.
    Ignored,
    /// A parameter was overwritten.
    Applied(Parameter),
    /// The terminating frame arrived; the session is over.
    Finished,
}

/// An open regulation session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Regulation {
    /// Local channel being regulated.
    pub channel: usize,
    step: u8,
}

impl Regulation {
    /// Number of continue-regulation frames in a session, the terminating one included.
    pub const STEPS: u8 = Parameter::ALL.len() as u8 + 1;

    /// Opens a session for `channel`.
    pub fn new(channel: usize) -> Self {
        Self { channel, step: 0 }
    }

    /// How many continue-regulation frames were consumed so far.
    pub fn step(&self) -> u8 {
        self.step
    }

    /// Feeds one frame taken from the command queue.
    pub fn advance(&mut self, frame: &AdminFrame, calibration: &mut Calibration) -> RegulationStep {
        if frame.command != Command::ContinueRegulation {
            return RegulationStep::Ignored;
        }

        self.step += 1;
        match Parameter::from_u8(self.step) {
            Some(parameter) if self.step < Self::STEPS => {
                parameter.apply(frame, calibration);
                RegulationStep::Applied(parameter)
            }
            _ => RegulationStep::Finished,
        }
    }
}

/// The five dump-regulation frames describing `calibration`, in [`Parameter`] order.
pub fn dump(calibration: &Calibration) -> [AdminFrame; 5] {
    Parameter::ALL.map(|parameter| parameter.dump(calibration))
}
