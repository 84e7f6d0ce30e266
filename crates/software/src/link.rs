//! The boundaries a node exchanges frames through.
//!
//! The chain is unidirectional: each node receives from its predecessor and sends to its successor, over two separate
//! peripherals. Both halves move whole [`Packet`]s; there is no partial-frame handling anywhere above this layer.
//!
//! Only the relay may call [`LinkRx::receive`]. [`LinkTx`] is shared between the relay and the application, so callers
//! keep it behind a mutex (see [`crate::role`]) to guarantee a single writer at a time.

use crate::{error::Error, frame::Packet};
use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::{Receiver, Sender},
};

/// Outbound half of the link, toward the next node in the chain.
pub trait LinkTx {
    /// Writes one frame, waiting until the hardware has accepted it.
    async fn send(&mut self, packet: &Packet) -> Result<(), Error>;
}

/// Inbound half of the link, from the previous node in the chain.
pub trait LinkRx {
    /// Waits until one complete frame has arrived.
    async fn receive(&mut self) -> Result<Packet, Error>;
}

/// The USB-facing output of the Controller.
///
/// `bytes` holds exactly one frame (1, 3, or 6 bytes, see [`crate::frame::frame_len`]).
pub trait HostTx {
    /// Hands one frame to the host.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

/// An in-memory link, as used to wire nodes together in simulations.
impl<M: RawMutex, const N: usize> LinkTx for Sender<'_, M, Packet, N> {
    async fn send(&mut self, packet: &Packet) -> Result<(), Error> {
        Sender::send(self, *packet).await;
        Ok(())
    }
}

impl<M: RawMutex, const N: usize> LinkRx for Receiver<'_, M, Packet, N> {
    async fn receive(&mut self) -> Result<Packet, Error> {
        Ok(Receiver::receive(self).await)
    }
}
