//! This crate contains the architecture-agnostic logic of Pico Piano, a keyboard whose keys are sensed by a chain of
//! [Raspberry Pi Pico](https://www.raspberrypi.com/products/raspberry-pi-pico/) boards. Every board measures the
//! distance of a few keys, turns key motion into velocity-sensitive MIDI notes, and passes its traffic along a
//! unidirectional ring of I2C links. One board, the Controller, closes the ring and exposes the whole keyboard to a
//! computer as a [USB MIDI](https://www.usb.org/sites/default/files/midi10.pdf) device; the others are Workers.
//!
//! Hardware is reached only through the traits in [`link`] and [`application::Sensor`], so everything here runs (and is
//! tested) on the host.

#![deny(missing_docs)]
#![no_std]
// the async traits are only ever used with static dispatch, where the missing `Send` bound is irrelevant
#![allow(async_fn_in_trait)]

pub mod application;
pub mod bootstrap;
pub mod command_queue;
pub mod configuration;
pub mod diagnostics;
pub mod error;
pub mod frame;
pub mod host;
pub mod identity;
pub mod key;
pub mod link;
pub mod regulation;
pub mod relay;
pub mod role;
pub mod status;
pub mod usb_midi;

#[cfg(test)]
mod testing;
