//! The receiving side of a node: owns the inbound link, keeps traffic moving around the ring, and hands the
//! administrative frames over to the application.
//!
//! A Worker forwards everything it receives before looking at it, so a slow application never delays the ring. The
//! Controller is where the ring ends: whatever reaches it is surfaced to the USB host instead, except for its own
//! roundtrip probes, which are turned into a measurement.

use crate::{
    command_queue::{CommandQueue, QueueFull},
    configuration::Timing,
    diagnostics::RoundtripProbe,
    error::Error,
    frame::{AdminFrame, Command, ErrorCode, Frame, Packet},
    identity::{NodeIdentity, RoleKind},
    link::LinkRx,
    role::NodeRole,
};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;

/// State of the relay context of one bootstrapped node.
pub struct Relay<'q, M: RawMutex, const Q: usize> {
    identity: NodeIdentity,
    commands: &'q CommandQueue<M, Q>,
    probe: Option<RoundtripProbe>,
}

impl<'q, M: RawMutex, const Q: usize> Relay<'q, M, Q> {
    /// Constructs the relay of a node whose bootstrap completed at `now`.
    ///
    /// The Controller schedules its first roundtrip probe one `timing.probe_interval` later.
    pub fn new(identity: NodeIdentity, commands: &'q CommandQueue<M, Q>, timing: &Timing, now: Instant) -> Self {
        let probe = match identity.role {
            RoleKind::Controller => Some(RoundtripProbe::new(timing.probe_interval, now)),
            RoleKind::Worker => None,
        };
        Self {
            identity,
            commands,
            probe,
        }
    }

    /// Sends a roundtrip probe into the ring when one is due.
    pub async fn poll_probe(&mut self, now: Instant, role: &mut impl NodeRole) -> Result<(), Error> {
        if let Some(frame) = self.probe.as_mut().and_then(|probe| probe.poll(now)) {
            role.send_downstream(&frame.to_packet()).await?;
        }
        Ok(())
    }

    /// Routes one packet received at `now`.
    pub async fn handle(&mut self, packet: &Packet, now: Instant, role: &mut impl NodeRole) -> Result<(), Error> {
        let frame = Frame::decode(packet);
        if let Err(_error) = frame {
            #[cfg(feature = "defmt")]
            defmt::warn!("Undecodable frame {:#x}: {}", packet, _error);
        }

        match role.kind() {
            RoleKind::Worker => {
                role.relay_or_terminate(packet).await?;
                if let Ok(Frame::Admin(admin)) = frame {
                    self.enqueue(admin, role).await?;
                }
            }
            RoleKind::Controller => match frame {
                Ok(Frame::Admin(admin)) if admin.command == Command::Roundtrip => {
                    let answer = self.probe.as_mut().and_then(|probe| probe.answer(now));
                    match answer {
                        Some(report) => role.surface_output(&report.to_packet()).await?,
                        // a probe sent by the host rather than by this node
                        None => role.surface_output(packet).await?,
                    }
                }
                Ok(Frame::Admin(admin)) => {
                    self.enqueue(admin, role).await?;
                    role.surface_output(packet).await?;
                }
                _ => role.surface_output(packet).await?,
            },
        }
        Ok(())
    }

    /// Hands `frame` to the application unless it only concerns the ring itself. Overflow is reported as an error
    /// frame, and the frame is lost.
    async fn enqueue(&self, frame: AdminFrame, role: &mut impl NodeRole) -> Result<(), Error> {
        if matches!(frame.command, Command::Roundtrip | Command::Init) {
            return Ok(());
        }
        match self.commands.enqueue(frame) {
            Ok(()) => Ok(()),
            Err(QueueFull(_dropped)) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Command queue full, dropping {}", _dropped);
                let report = AdminFrame::error(ErrorCode::TooManyPackets, self.identity.pico_id);
                role.surface_output(&report.to_packet()).await
            }
        }
    }

    /// Relays forever. Only returns when a link or the host fails.
    pub async fn run(&mut self, role: &mut impl NodeRole, link: &mut impl LinkRx) -> Error {
        loop {
            if let Err(error) = self.step(role, link).await {
                return error;
            }
        }
    }

    async fn step(&mut self, role: &mut impl NodeRole, link: &mut impl LinkRx) -> Result<(), Error> {
        // receiving blocks until the next frame, so a due probe waits for traffic (the ring's own reports included)
        self.poll_probe(Instant::now(), role).await?;
        let packet = link.receive().await?;
        self.handle(&packet, Instant::now(), role).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::{NoteEvent, SYSEX, VENDOR},
        testing::RecordingRole,
    };
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_time::Duration;
    use wmidi::{Note, U7};

    const CAPACITY: usize = 2;
    type Queue = CommandQueue<NoopRawMutex, CAPACITY>;

    fn at(millis: u64) -> Instant {
        Instant::from_millis(millis)
    }

    #[test]
    fn worker_relays_then_enqueues() {
        let commands = Queue::new();
        let mut relay = Relay::new(NodeIdentity::worker(1), &commands, &Timing::default(), at(0));
        let mut role = RecordingRole::new(RoleKind::Worker);
        let request = AdminFrame::new(Command::DumpAdc, 68, 0);

        block_on(relay.handle(&request.to_packet(), at(1), &mut role)).unwrap();

        assert_eq!([request.to_packet()], role.relayed[..], "Expected left but got right");
        assert_eq!(Some(request), commands.dequeue());
    }

    #[test]
    fn worker_only_relays_ring_traffic() {
        let commands = Queue::new();
        let mut relay = Relay::new(NodeIdentity::worker(1), &commands, &Timing::default(), at(0));
        let mut role = RecordingRole::new(RoleKind::Worker);
        let packets = [
            AdminFrame::new(Command::Roundtrip, 0, 0).to_packet(),
            AdminFrame::init(3).to_packet(),
            Frame::AdcSample {
                note: U7::from_u8_lossy(70),
                reading: 1000,
            }
            .to_packet(),
            NoteEvent::on(Note::F4, U7::from_u8_lossy(40)).to_packet(),
            [SYSEX, 0x41, 0x7F, 0, 0, 0], // not ours
        ];

        block_on(async {
            for packet in &packets {
                relay.handle(packet, at(1), &mut role).await.unwrap();
            }
        });

        assert_eq!(packets[..], role.relayed[..], "Every packet must be relayed byte-exact");
        assert!(commands.is_empty(), "Nothing should reach the application");
        assert!(role.surfaced.is_empty());
    }

    #[test]
    fn overflow_is_reported() {
        let commands = Queue::new();
        let mut relay = Relay::new(NodeIdentity::worker(5), &commands, &Timing::default(), at(0));
        let mut role = RecordingRole::new(RoleKind::Worker);
        let request = AdminFrame::new(Command::StopDumpAdc, 0, 0).to_packet();

        block_on(async {
            for _ in 0..=CAPACITY {
                relay.handle(&request, at(1), &mut role).await.unwrap();
            }
        });

        assert_eq!(CAPACITY + 1, role.relayed.len(), "Relaying must not stop");
        assert_eq!(CAPACITY, commands.len());
        assert!(
            role.surfaced_frames()
                .eq([Frame::Admin(AdminFrame::error(ErrorCode::TooManyPackets, 5))]),
            "Expected a single too-many-packets report from node 5"
        );
    }

    #[test]
    fn controller_enqueues_and_surfaces() {
        let commands = Queue::new();
        let mut relay = Relay::new(NodeIdentity::controller(2), &commands, &Timing::default(), at(0));
        let mut role = RecordingRole::new(RoleKind::Controller);
        let request = AdminFrame::new(Command::Regulate, 66, 0);
        let note = NoteEvent::off(Note::A4).to_packet();

        block_on(async {
            relay.handle(&request.to_packet(), at(1), &mut role).await.unwrap();
            relay.handle(&note, at(2), &mut role).await.unwrap();
        });

        assert_eq!(Some(request), commands.dequeue());
        assert_eq!([request.to_packet(), note], role.surfaced[..]);
        assert!(role.relayed.is_empty(), "The ring ends at the Controller");
    }

    #[test]
    fn controller_measures_roundtrip() {
        let commands = Queue::new();
        let timing = Timing {
            probe_interval: Duration::from_millis(100),
            ..Timing::default()
        };
        let mut relay = Relay::new(NodeIdentity::controller(1), &commands, &timing, at(0));
        let mut role = RecordingRole::new(RoleKind::Controller);

        block_on(async {
            relay.poll_probe(at(50), &mut role).await.unwrap();
            assert!(role.downstream.is_empty(), "Too early for a probe");

            relay.poll_probe(at(100), &mut role).await.unwrap();
            let probe = role.downstream[0];
            relay.handle(&probe, Instant::from_micros(100_750), &mut role).await.unwrap();
        });

        let report = match role.surfaced_frames().next() {
            Some(Frame::Admin(report)) => report,
            other => panic!("Unexpected surfaced frame: {:?}", other),
        };
        assert_eq!(Command::Roundtrip, report.command);
        assert_eq!(750, report.u14(), "Expected left but got right");
        assert!(commands.is_empty());
    }

    #[test]
    fn workers_never_probe() {
        let commands = Queue::new();
        let mut relay = Relay::new(NodeIdentity::worker(1), &commands, &Timing::default(), at(0));
        let mut role = RecordingRole::new(RoleKind::Worker);

        block_on(relay.poll_probe(at(60_000), &mut role)).unwrap();
        assert!(role.downstream.is_empty());
    }

    #[test]
    fn host_probe_passes_through_controller() {
        let commands = Queue::new();
        let mut relay = Relay::new(NodeIdentity::controller(1), &commands, &Timing::default(), at(0));
        let mut role = RecordingRole::new(RoleKind::Controller);
        let probe = AdminFrame::new(Command::Roundtrip, 0x12, 0x34).to_packet();

        block_on(relay.handle(&probe, at(1), &mut role)).unwrap();

        assert_eq!([probe], role.surfaced[..]);
    }

    #[test]
    fn controller_surfaces_vendor_mismatch_untouched() {
        let commands = Queue::new();
        let mut relay = Relay::new(NodeIdentity::controller(1), &commands, &Timing::default(), at(0));
        let mut role = RecordingRole::new(RoleKind::Controller);
        let foreign = [SYSEX, VENDOR + 1, 0x01, 0x02, 0x03, 0xF7];

        block_on(relay.handle(&foreign, at(1), &mut role)).unwrap();

        assert_eq!([foreign], role.surfaced[..]);
        assert!(commands.is_empty());
    }
}
