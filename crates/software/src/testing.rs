//! Recording doubles for the hardware boundaries, shared by the unit tests.

use crate::{
    application::Sensor,
    error::Error,
    frame::{Frame, Packet},
    identity::RoleKind,
    link::{HostTx, LinkTx},
    role::NodeRole,
};
use tinyvec::ArrayVec;

/// Remembers every packet sent to it.
#[derive(Default)]
pub struct RecordingLink {
    pub sent: ArrayVec<[Packet; 32]>,
}

impl LinkTx for RecordingLink {
    async fn send(&mut self, packet: &Packet) -> Result<(), Error> {
        self.sent.push(*packet);
        Ok(())
    }
}

/// Remembers every frame written to it, padded to a full packet, alongside its length.
#[derive(Default)]
pub struct RecordingHost {
    pub written: ArrayVec<[(Packet, usize); 32]>,
}

impl HostTx for RecordingHost {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut packet = Packet::default();
        packet[..bytes.len()].copy_from_slice(bytes);
        self.written.push((packet, bytes.len()));
        Ok(())
    }
}

/// A [`NodeRole`] that keeps what each capability was asked to do, without any links behind it.
pub struct RecordingRole {
    pub kind: RoleKind,
    pub downstream: ArrayVec<[Packet; 32]>,
    pub relayed: ArrayVec<[Packet; 32]>,
    pub surfaced: ArrayVec<[Packet; 32]>,
}

impl RecordingRole {
    pub fn new(kind: RoleKind) -> Self {
        Self {
            kind,
            downstream: ArrayVec::default(),
            relayed: ArrayVec::default(),
            surfaced: ArrayVec::default(),
        }
    }

    /// Decoded view of the surfaced frames.
    pub fn surfaced_frames(&self) -> impl Iterator<Item = Frame> + '_ {
        self.surfaced
            .iter()
            .map(|packet| Frame::decode(packet).expect("surfaced frames should decode"))
    }
}

impl NodeRole for RecordingRole {
    fn kind(&self) -> RoleKind {
        self.kind
    }

    async fn send_downstream(&mut self, packet: &Packet) -> Result<(), Error> {
        self.downstream.push(*packet);
        Ok(())
    }

    async fn relay_or_terminate(&mut self, packet: &Packet) -> Result<(), Error> {
        if self.kind == RoleKind::Worker {
            self.relayed.push(*packet);
        }
        Ok(())
    }

    async fn surface_output(&mut self, packet: &Packet) -> Result<(), Error> {
        self.surfaced.push(*packet);
        Ok(())
    }
}

/// Hands out a fixed reading for every channel, changeable between ticks.
pub struct FixedSensor<const N: usize> {
    pub readings: [u16; N],
    pub samples_taken: usize,
}

impl<const N: usize> FixedSensor<N> {
    pub fn new(reading: u16) -> Self {
        Self {
            readings: [reading; N],
            samples_taken: 0,
        }
    }
}

impl<const N: usize> Sensor<N> for FixedSensor<N> {
    async fn sample(&mut self) -> Result<[u16; N], Error> {
        self.samples_taken += 1;
        Ok(self.readings)
    }
}
