//! Both directions between the ring and the USB host, on the Controller.
//!
//! Frames for the host are queued in a [`HostOutbox`] rather than written directly. A host that enumerated the device
//! but never reads from it would otherwise hold up whoever writes, and the relay writes on behalf of the whole ring.

use crate::{
    configuration::HOST_QUEUE_LEN,
    error::Error,
    frame::{AdminFrame, FRAME_LEN, Frame, Packet},
    identity::NodeIdentity,
    link::HostTx,
    role::NodeRole,
};
use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Channel};

/// Frames waiting to be written to the USB host, dropped when the host falls behind.
pub struct HostOutbox<M: RawMutex, const N: usize = HOST_QUEUE_LEN> {
    frames: Channel<M, Packet, N>,
}

impl<M: RawMutex, const N: usize> Default for HostOutbox<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const N: usize> HostOutbox<M, N> {
    /// Constructs an empty outbox; usable in a `static`.
    pub const fn new() -> Self {
        Self {
            frames: Channel::new(),
        }
    }

    /// Queues one frame without waiting. Returns `false` if it was dropped because the outbox is full.
    pub fn post(&self, packet: &Packet) -> bool {
        self.frames.try_send(*packet).is_ok()
    }

    /// Waits for the oldest frame.
    pub async fn next(&self) -> Packet {
        self.frames.receive().await
    }

    /// Number of frames waiting.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` when no frame is waiting.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl<M: RawMutex, const N: usize> HostTx for &HostOutbox<M, N> {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let len = bytes.len().min(FRAME_LEN);
        let mut packet = Packet::default();
        packet[..len].copy_from_slice(&bytes[..len]);
        if !self.post(&packet) {
            // same as a MIDI cable nobody listens to
            #[cfg(feature = "defmt")]
            defmt::warn!("Host is not reading, dropping {:#x}", packet);
        }
        Ok(())
    }
}

/// Sends a frame received from the host into the ring.
///
/// Requests addressing a note no node owns never enter the ring; the host gets a no-such-note answer carrying the note
/// and the number of Workers instead. Everything else is forwarded unchanged, including frames that do not decode.
pub async fn forward_host_frame(
    packet: &Packet,
    identity: &NodeIdentity,
    role: &mut impl NodeRole,
) -> Result<(), Error> {
    if let Ok(Frame::Admin(frame)) = Frame::decode(packet) {
        let note = frame.payload0();
        if frame.command.addresses_note() && !identity.owns_note(note) {
            #[cfg(feature = "defmt")]
            defmt::warn!("Host asked for note {}, which no node owns", note);
            let answer = AdminFrame::no_such_note(note, identity.node_count);
            return role.surface_output(&answer.to_packet()).await;
        }
    }
    role.send_downstream(packet).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::{Command, NoteEvent, frame_len},
        identity::RoleKind,
        role::Controller,
        testing::{RecordingLink, RecordingRole},
    };
    use embassy_futures::block_on;
    use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex};
    use wmidi::{Note, U7};

    fn forward(packet: Packet) -> RecordingRole {
        let mut role = RecordingRole::new(RoleKind::Controller);
        block_on(forward_host_frame(&packet, &NodeIdentity::controller(2), &mut role)).unwrap();
        role
    }

    #[test]
    fn in_range_requests_enter_the_ring() {
        for note in [65, 73] {
            let request = AdminFrame::new(Command::DumpRegulation, note, 0).to_packet();
            let role = forward(request);
            assert_eq!([request], role.downstream[..], "Expected left but got right");
            assert!(role.surfaced.is_empty());
        }
    }

    #[test]
    fn out_of_range_requests_are_answered() {
        for note in [64, 74, 0x7F] {
            let role = forward(AdminFrame::new(Command::DumpAdc, note, 0).to_packet());
            assert!(role.downstream.is_empty(), "Note {} should not enter the ring", note);
            assert!(
                role.surfaced_frames()
                    .eq([Frame::Admin(AdminFrame::no_such_note(note, 2))])
            );
        }
    }

    #[test]
    fn other_frames_are_forwarded_unchanged() {
        let stop = AdminFrame::new(Command::StopDumpAdc, 0, 0).to_packet();
        let regulation = AdminFrame::new(Command::ContinueRegulation, 0x7F, 0x10).to_packet();
        let foreign = [0xF0, 0x41, 0x10, 0x00, 0x00, 0xF7];

        for packet in [stop, regulation, foreign] {
            assert_eq!([packet], forward(packet).downstream[..]);
        }
    }

    #[test]
    fn outbox_never_waits_for_the_host() {
        let outbox: HostOutbox<NoopRawMutex, 2> = HostOutbox::new();
        let link: Mutex<NoopRawMutex, _> = Mutex::new(RecordingLink::default());
        let host: Mutex<NoopRawMutex, _> = Mutex::new(&outbox);
        let mut controller = Controller::new(&link, &host);

        // nobody drains the outbox, yet every write completes
        let reports = [1, 2, 3, 4, 5].map(|pico_id| AdminFrame::iterations(pico_id, 40).to_packet());
        for report in reports {
            assert_eq!(Ok(()), block_on(controller.surface_output(&report)), "Expected left but got right");
        }

        assert_eq!(2, outbox.len(), "Expected left but got right");
        assert_eq!(reports[0], block_on(outbox.next()), "The oldest frames are kept");
        assert_eq!(reports[1], block_on(outbox.next()));
        assert!(outbox.is_empty());
    }

    #[test]
    fn outbox_keeps_frame_lengths() {
        let outbox: HostOutbox<NoopRawMutex> = HostOutbox::new();
        let note = NoteEvent::on(Note::C4, U7::from_u8_lossy(64)).to_packet();
        block_on((&outbox).write(&note[..3])).unwrap();

        let queued = block_on(outbox.next());
        assert_eq!(3, frame_len(&queued), "Expected left but got right");
        assert_eq!(note[..3], queued[..3]);
    }
}
