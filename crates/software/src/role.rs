//! What differs between a Controller and a Worker, behind one interface.
//!
//! Both the relay and the application are written against [`NodeRole`]; they never ask which variant they hold except
//! through [`NodeRole::kind`] for the few protocol steps that genuinely diverge (bootstrap and probe handling).

use crate::{
    error::Error,
    frame::{Packet, frame_len},
    identity::RoleKind,
    link::{HostTx, LinkTx},
};
use embassy_sync::{blocking_mutex::raw::RawMutex, mutex::Mutex};

/// Capabilities a node needs to emit frames.
pub trait NodeRole {
    /// Which variant this is.
    fn kind(&self) -> RoleKind;

    /// Sends a frame into the chain, toward the next node.
    async fn send_downstream(&mut self, packet: &Packet) -> Result<(), Error>;

    /// Passes along a frame received from upstream. Workers forward it; the Controller is the end of the chain and
    /// drops it.
    async fn relay_or_terminate(&mut self, packet: &Packet) -> Result<(), Error>;

    /// Emits a frame produced or observed by this node toward its consumer: the next node for a Worker, the USB host
    /// for the Controller.
    async fn surface_output(&mut self, packet: &Packet) -> Result<(), Error>;
}

/// A link-only node.
pub struct Worker<'a, M: RawMutex, T: LinkTx> {
    link: &'a Mutex<M, T>,
}

impl<'a, M: RawMutex, T: LinkTx> Worker<'a, M, T> {
    /// Constructs a [`Worker`] writing to the shared outbound link.
    pub fn new(link: &'a Mutex<M, T>) -> Self {
        Self { link }
    }
}

impl<M: RawMutex, T: LinkTx> NodeRole for Worker<'_, M, T> {
    fn kind(&self) -> RoleKind {
        RoleKind::Worker
    }

    async fn send_downstream(&mut self, packet: &Packet) -> Result<(), Error> {
        self.link.lock().await.send(packet).await
    }

    async fn relay_or_terminate(&mut self, packet: &Packet) -> Result<(), Error> {
        self.send_downstream(packet).await
    }

    async fn surface_output(&mut self, packet: &Packet) -> Result<(), Error> {
        self.send_downstream(packet).await
    }
}

/// The USB-facing node.
pub struct Controller<'a, M: RawMutex, T: LinkTx, H: HostTx> {
    link: &'a Mutex<M, T>,
    host: &'a Mutex<M, H>,
}

impl<'a, M: RawMutex, T: LinkTx, H: HostTx> Controller<'a, M, T, H> {
    /// Constructs a [`Controller`] writing to the shared outbound link and the shared host output.
    pub fn new(link: &'a Mutex<M, T>, host: &'a Mutex<M, H>) -> Self {
        Self { link, host }
    }
}

impl<M: RawMutex, T: LinkTx, H: HostTx> NodeRole for Controller<'_, M, T, H> {
    fn kind(&self) -> RoleKind {
        RoleKind::Controller
    }

    async fn send_downstream(&mut self, packet: &Packet) -> Result<(), Error> {
        self.link.lock().await.send(packet).await
    }

    async fn relay_or_terminate(&mut self, _packet: &Packet) -> Result<(), Error> {
        Ok(())
    }

    async fn surface_output(&mut self, packet: &Packet) -> Result<(), Error> {
        let len = frame_len(packet);
        self.host.lock().await.write(&packet[..len]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::{AdminFrame, NoteEvent},
        testing::{RecordingHost, RecordingLink},
    };
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use wmidi::{Note, U7};

    #[test]
    fn worker_sends_everything_downstream() {
        let link: Mutex<NoopRawMutex, _> = Mutex::new(RecordingLink::default());
        let mut worker = Worker::new(&link);
        let frame = AdminFrame::init(1).to_packet();

        block_on(async {
            worker.relay_or_terminate(&frame).await.unwrap();
            worker.surface_output(&frame).await.unwrap();
        });

        assert_eq!(2, block_on(link.lock()).sent.len());
    }

    #[test]
    fn controller_terminates_and_surfaces_to_host() {
        let link: Mutex<NoopRawMutex, _> = Mutex::new(RecordingLink::default());
        let host: Mutex<NoopRawMutex, _> = Mutex::new(RecordingHost::default());
        let mut controller = Controller::new(&link, &host);
        let note = NoteEvent::on(Note::F4, U7::from_u8_lossy(64)).to_packet();

        block_on(async {
            controller.relay_or_terminate(&note).await.unwrap();
            controller.surface_output(&note).await.unwrap();
        });

        assert!(block_on(link.lock()).sent.is_empty(), "Expected nothing relayed");
        let host = block_on(host.lock());
        assert_eq!(1, host.written.len());
        assert_eq!(3, host.written[0].1, "Note frames are surfaced as three bytes");
    }
}
