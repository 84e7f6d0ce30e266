//! The sensing side of a node: samples the keys, emits note events, and serves the administrative requests the relay
//! hands over through the [`CommandQueue`].
//!
//! Requests that need several iterations (dumping ADC readings, regulating or dumping a calibration) switch the
//! application into a sub-[`Mode`]. Normal sampling is suspended meanwhile, but the diagnostics keep running, so a node
//! busy serving a request still reports in.

use crate::{
    command_queue::CommandQueue,
    configuration::{CHANNELS_PER_NODE, Timing},
    diagnostics::IterationCounter,
    error::Error,
    frame::{AdminFrame, Command, Frame, NoteEvent},
    identity::NodeIdentity,
    key::{Key, KeyEvent},
    regulation::{self, Regulation, RegulationStep},
    role::NodeRole,
};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;
use wmidi::{Note, U7};

/// The analog front end of a node.
pub trait Sensor<const N: usize> {
    /// Reads every channel once. Readings are 12 bits wide and decrease as keys go down.
    async fn sample(&mut self) -> Result<[u16; N], Error>;
}

/// What the application is busy with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Sampling keys and waiting for requests.
    Normal,
    /// Streaming the readings of one channel until told to stop.
    DumpAdc {
        /// Local channel being dumped.
        channel: usize,
        /// When the last sample went out; `None` until the first one.
        last_sent: Option<Instant>,
    },
    /// Receiving new calibration values for one channel.
    Regulate(Regulation),
    /// Sending the calibration of one channel, one parameter per iteration.
    DumpRegulation {
        /// Local channel being dumped.
        channel: usize,
        /// Index of the next parameter to send.
        next: usize,
    },
}

/// State of the application context of one node.
pub struct Application<const N: usize = CHANNELS_PER_NODE> {
    identity: NodeIdentity,
    keys: [Key; N],
    mode: Mode,
    timing: Timing,
    iterations: IterationCounter,
}

impl<const N: usize> Application<N> {
    /// Constructs the application of a bootstrapped node, with every key idle and default-calibrated.
    pub fn new(identity: NodeIdentity, timing: Timing, now: Instant) -> Self {
        Self {
            identity,
            keys: [Key::default(); N],
            mode: Mode::Normal,
            timing,
            iterations: IterationCounter::new(timing.stats_interval, now),
        }
    }

    /// What the application is currently busy with.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The key sensed on local `channel`.
    pub fn key(&self, channel: usize) -> Option<&Key> {
        self.keys.get(channel)
    }

    /// Whether a request is being served, which the status LED shows.
    pub fn busy(&self) -> bool {
        self.mode != Mode::Normal
    }

    /// Runs one iteration of the main loop at `now`.
    ///
    /// Every frame produced goes out through [`NodeRole::surface_output`], i.e., downstream on a Worker and to the USB
    /// host on the Controller.
    pub async fn tick<M: RawMutex, const Q: usize>(
        &mut self,
        now: Instant,
        commands: &CommandQueue<M, Q>,
        sensor: &mut impl Sensor<N>,
        role: &mut impl NodeRole,
    ) -> Result<(), Error> {
        if let Some(report) = self.iterations.tick(now, self.identity.pico_id) {
            role.surface_output(&report.to_packet()).await?;
        }

        match self.mode {
            Mode::Normal => {
                self.sense_keys(now, sensor, role).await?;
                if let Some(frame) = commands.dequeue() {
                    self.dispatch(&frame);
                }
            }
            Mode::DumpAdc { channel, last_sent } => {
                if commands
                    .dequeue()
                    .is_some_and(|frame| frame.command == Command::StopDumpAdc)
                {
                    self.mode = Mode::Normal;
                } else if last_sent.is_none_or(|sent| {
                    now.saturating_duration_since(sent) >= self.timing.adc_dump_interval
                }) {
                    // every channel is read even though only one is reported
                    let readings = sensor.sample().await?;
                    let sample = Frame::AdcSample {
                        note: self.identity.note(channel).unwrap_or(U7::from_u8_lossy(0)),
                        reading: readings[channel],
                    };
                    role.surface_output(&sample.to_packet()).await?;
                    self.mode = Mode::DumpAdc {
                        channel,
                        last_sent: Some(now),
                    };
                }
            }
            Mode::Regulate(mut session) => {
                if let Some(frame) = commands.dequeue() {
                    let calibration = &mut self.keys[session.channel].calibration;
                    match session.advance(&frame, calibration) {
                        RegulationStep::Finished => {
                            #[cfg(feature = "defmt")]
                            defmt::info!("Channel {} regulated: {}", session.channel, calibration);
                            self.mode = Mode::Normal;
                        }
                        _ => self.mode = Mode::Regulate(session),
                    }
                }
            }
            Mode::DumpRegulation { channel, next } => {
                let frames = regulation::dump(&self.keys[channel].calibration);
                if let Some(frame) = frames.get(next) {
                    role.surface_output(&frame.to_packet()).await?;
                }
                self.mode = if next + 1 < frames.len() {
                    Mode::DumpRegulation {
                        channel,
                        next: next + 1,
                    }
                } else {
                    Mode::Normal
                };
            }
        }
        Ok(())
    }

    async fn sense_keys(
        &mut self,
        now: Instant,
        sensor: &mut impl Sensor<N>,
        role: &mut impl NodeRole,
    ) -> Result<(), Error> {
        let readings = sensor.sample().await?;
        for (channel, (key, distance)) in self.keys.iter_mut().zip(readings).enumerate() {
            let Some(event) = key.sense(distance, now) else {
                continue;
            };
            let Some(note) = self.identity.note(channel) else {
                continue;
            };
            let event = match event {
                KeyEvent::Pressed(velocity) => NoteEvent::on(Note::from(note), velocity),
                KeyEvent::Released => NoteEvent::off(Note::from(note)),
            };
            #[cfg(feature = "defmt")]
            defmt::debug!("{}", event);
            role.surface_output(&event.to_packet()).await?;
        }
        Ok(())
    }

    /// Enters the sub-mode a request asks for, provided it addresses a local channel.
    fn dispatch(&mut self, frame: &AdminFrame) {
        if !frame.command.addresses_note() {
            return;
        }
        // not my business
        let Some(channel) = self
            .identity
            .local_channel(frame.payload0())
            .filter(|&channel| channel < N)
        else {
            return;
        };

        self.mode = match frame.command {
            Command::DumpAdc => Mode::DumpAdc {
                channel,
                last_sent: None,
            },
            Command::Regulate => Mode::Regulate(Regulation::new(channel)),
            // answers travel with the same command code but never with an empty second byte
            Command::DumpRegulation if frame.payload1() == 0 => Mode::DumpRegulation { channel, next: 0 },
            _ => return,
        };
        #[cfg(feature = "defmt")]
        defmt::info!("Entering {}", self.mode);
    }
}
