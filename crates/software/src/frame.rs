//! Encoding and classification of the frames exchanged over the link and with the USB host.
//!
//! Every transfer on the link carries exactly [`FRAME_LEN`] bytes (a [`Packet`]). Administrative frames use all six:
//!
//! ```text
//! [0xF0, 0x7D, COMMAND, PAYLOAD0, PAYLOAD1, 0xF7]
//! ```
//!
//! which is a well-formed MIDI System Exclusive message under the prototyping vendor tag, so the Controller can hand it
//! to the USB host untouched. Note frames occupy the first three bytes and single passthrough bytes the first one; the
//! rest of the packet is zero padding.
//!
//! ADC samples reuse the administrative layout but put the upper 7 bits of the reading where the command normally goes.
//! As the ADC is 12 bits wide, that byte never exceeds [`MAX_ADC_HIGH`], which is below every [`Command`] code.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use wmidi::{MidiMessage, Note, U7};

/// System Exclusive start byte; marks an administrative frame.
pub const SYSEX: u8 = 0xF0;
/// Manufacturer ID reserved for prototypes and private use.
pub const VENDOR: u8 = 0x7D;
/// End of System Exclusive.
pub const END_SYSEX: u8 = 0xF7;
/// Number of bytes moved by every link transfer.
pub const FRAME_LEN: usize = 6;
/// Largest value the high half of an ADC reading can take.
pub const MAX_ADC_HIGH: u8 = 0x1F;
/// Largest value expressible in two 7-bit payload bytes.
pub const MAX_U14: u16 = 0x3FFF;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const NOTE_LEN: usize = 3;

/// The unit of transfer on the link.
pub type Packet = [u8; FRAME_LEN];

/// Administrative commands understood by the nodes.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Start streaming the ADC readings of one note.
    DumpAdc = 0x7F,
    /// Stop a running ADC dump.
    StopDumpAdc = 0x7E,
    /// Start rewriting the calibration of one note.
    Regulate = 0x7C,
    /// Carries one calibration parameter; the sixth one in a session closes it.
    ContinueRegulation = 0x7B,
    /// Request (and response) for the calibration of one note.
    DumpRegulation = 0x7A,
    /// Roundtrip-time probe, echoed back to the Controller by the ring; the answer is in microseconds.
    Roundtrip = 0x79,
    /// The host addressed a note that no node owns.
    NoSuchNote = 0x78,
    /// A node reports a problem; the first payload byte holds an [`ErrorCode`].
    Error = 0x77,
    /// Periodic main-loop throughput report.
    IterationsPerMs = 0x76,
    /// Bootstrap frame counting the Workers in the chain.
    Init = 0x75,
}

impl Command {
    /// Returns `true` for the commands whose first payload byte addresses a note.
    pub fn addresses_note(&self) -> bool {
        matches!(
            self,
            Command::DumpAdc | Command::Regulate | Command::DumpRegulation
        )
    }
}

/// Problem categories reported with [`Command::Error`].
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ErrorCode {
    /// More Workers answered the bootstrap than the note space can address.
    TooManyNodes = 0x07,
    /// A Worker received something other than an init frame before being initialized.
    ExpectingInit = 0x17,
    /// The command queue was full and an administrative frame was dropped.
    TooManyPackets = 0x27,
}

/// Reasons a byte sequence could not be decoded into a [`Frame`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Nothing to decode.
    Empty,
    /// The frame starts with [`SYSEX`] but is shorter than [`FRAME_LEN`].
    Truncated(usize),
    /// The vendor byte isn't [`VENDOR`].
    UnknownVendor(u8),
    /// The sixth byte isn't [`END_SYSEX`].
    MissingEnd(u8),
    /// The command byte is above [`MAX_ADC_HIGH`] but matches no [`Command`].
    UnknownCommand(u8),
    /// A payload byte has its most significant bit set.
    DataByte(u8),
}

/// A decoded administrative frame.
///
/// Payloads are stored as [`U7`] so that the 7-bit invariant holds by construction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AdminFrame {
    /// What the frame asks for or reports.
    pub command: Command,
    /// The two command-specific data bytes.
    pub payload: [U7; 2],
}

#[cfg(feature = "defmt")]
impl defmt::Format for AdminFrame {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "AdminFrame {{ command: {}, payload: [{=u8:#x}, {=u8:#x}] }}",
            self.command,
            u8::from(self.payload[0]),
            u8::from(self.payload[1])
        );
    }
}

impl AdminFrame {
    /// Builds a frame, masking both payload bytes to 7 bits.
    pub const fn new(command: Command, payload0: u8, payload1: u8) -> Self {
        Self {
            command,
            payload: [U7::from_u8_lossy(payload0), U7::from_u8_lossy(payload1)],
        }
    }

    /// Builds a frame carrying a 14-bit value split high/low over the payload. Higher bits are discarded.
    pub const fn with_u14(command: Command, value: u16) -> Self {
        Self::new(command, (value >> 7) as u8, value as u8)
    }

    /// The bootstrap frame, carrying the number of Workers counted so far.
    pub const fn init(count: u8) -> Self {
        Self::new(Command::Init, count, 0)
    }

    /// The Controller's answer to a returning probe; `elapsed_us` is clamped to [`MAX_U14`].
    pub fn roundtrip(elapsed_us: u64) -> Self {
        let clamped = elapsed_us.min(u64::from(MAX_U14)) as u16;
        Self::with_u14(Command::Roundtrip, clamped)
    }

    /// An error report from the node with `pico_id`.
    pub const fn error(code: ErrorCode, pico_id: u8) -> Self {
        Self::new(Command::Error, code as u8, pico_id)
    }

    /// Tells the host that `note` is out of range for a chain of `node_count` Workers.
    pub const fn no_such_note(note: u8, node_count: u8) -> Self {
        Self::new(Command::NoSuchNote, note, node_count)
    }

    /// Throughput report; `per_ms` saturates at `0x7F`.
    pub fn iterations(pico_id: u8, per_ms: u32) -> Self {
        Self::new(Command::IterationsPerMs, pico_id, per_ms.min(0x7F) as u8)
    }

    /// First payload byte.
    pub fn payload0(&self) -> u8 {
        u8::from(self.payload[0])
    }

    /// Second payload byte.
    pub fn payload1(&self) -> u8 {
        u8::from(self.payload[1])
    }

    /// Reassembles the 14-bit value split over the payload.
    pub fn u14(&self) -> u16 {
        (u16::from(self.payload0()) << 7) | u16::from(self.payload1())
    }

    /// Serializes the frame into a link packet.
    pub fn to_packet(&self) -> Packet {
        [
            SYSEX,
            VENDOR,
            self.command as u8,
            self.payload0(),
            self.payload1(),
            END_SYSEX,
        ]
    }
}

/// A note-on or note-off event on MIDI channel 1.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NoteEvent {
    /// `true` for note-on.
    pub on: bool,
    /// Logical note number of the key.
    pub note: Note,
    /// Strike velocity; always zero for note-off.
    pub velocity: U7,
}

#[cfg(feature = "defmt")]
impl defmt::Format for NoteEvent {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "NoteEvent {{ on: {}, note: {} ({}), velocity: {} }}",
            self.on,
            self.note.to_str(),
            self.note as u8,
            u8::from(self.velocity)
        );
    }
}

impl NoteEvent {
    /// Key struck at `velocity`.
    pub fn on(note: Note, velocity: U7) -> Self {
        Self {
            on: true,
            note,
            velocity,
        }
    }

    /// Key released.
    pub fn off(note: Note) -> Self {
        Self {
            on: false,
            note,
            velocity: U7::from_u8_lossy(0),
        }
    }

    /// Serializes the event into the first three bytes of a packet.
    pub fn to_packet(&self) -> Packet {
        let status = if self.on { NOTE_ON } else { NOTE_OFF };
        [
            status,
            self.note as u8,
            u8::from(self.velocity),
            0,
            0,
            0,
        ]
    }
}

/// Everything that may travel over the link.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Frame {
    /// A command or report for the nodes or the host.
    Admin(AdminFrame),
    /// One ADC reading streamed while a note is being dumped.
    AdcSample {
        /// Logical note number of the sampled key.
        note: U7,
        /// Raw reading; at most 12 bits.
        reading: u16,
    },
    /// A key event.
    Note(NoteEvent),
    /// A byte that means nothing to the nodes but must be forwarded anyway.
    Passthrough(u8),
}

#[cfg(feature = "defmt")]
impl defmt::Format for Frame {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Frame::Admin(admin) => defmt::write!(fmt, "{}", admin),
            Frame::AdcSample { note, reading } => defmt::write!(
                fmt,
                "AdcSample {{ note: {}, reading: {} }}",
                u8::from(*note),
                reading
            ),
            Frame::Note(event) => defmt::write!(fmt, "{}", event),
            Frame::Passthrough(byte) => defmt::write!(fmt, "Passthrough({=u8:#x})", byte),
        }
    }
}

impl Frame {
    /// Classifies a byte sequence by its first byte.
    ///
    /// Anything not starting with [`SYSEX`] is a note when it parses as one, otherwise a passthrough byte; only
    /// administrative frames can fail to decode.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let first = *bytes.first().ok_or(FrameError::Empty)?;
        if first != SYSEX {
            return Ok(Self::decode_note(bytes).unwrap_or(Frame::Passthrough(first)));
        }

        if bytes.len() < FRAME_LEN {
            return Err(FrameError::Truncated(bytes.len()));
        }
        if bytes[1] != VENDOR {
            return Err(FrameError::UnknownVendor(bytes[1]));
        }
        if bytes[5] != END_SYSEX {
            return Err(FrameError::MissingEnd(bytes[5]));
        }
        let data = |byte: u8| U7::try_from(byte).map_err(|_| FrameError::DataByte(byte));
        let payload = [data(bytes[3])?, data(bytes[4])?];

        if bytes[2] <= MAX_ADC_HIGH {
            return Ok(Frame::AdcSample {
                note: payload[1],
                reading: (u16::from(bytes[2]) << 7) | u16::from(u8::from(payload[0])),
            });
        }
        let command = Command::from_u8(bytes[2]).ok_or(FrameError::UnknownCommand(bytes[2]))?;

        Ok(Frame::Admin(AdminFrame { command, payload }))
    }

    fn decode_note(bytes: &[u8]) -> Option<Self> {
        let candidate = bytes.get(..NOTE_LEN)?;
        match MidiMessage::from_bytes(candidate).ok()? {
            MidiMessage::NoteOn(_, note, velocity) => Some(Frame::Note(NoteEvent {
                on: true,
                note,
                velocity,
            })),
            MidiMessage::NoteOff(_, note, _) => Some(Frame::Note(NoteEvent::off(note))),
            _ => None,
        }
    }

    /// Serializes the frame into a link packet.
    pub fn to_packet(&self) -> Packet {
        match self {
            Frame::Admin(admin) => admin.to_packet(),
            Frame::AdcSample { note, reading } => [
                SYSEX,
                VENDOR,
                ((reading >> 7) as u8) & MAX_ADC_HIGH,
                (*reading as u8) & 0x7F,
                u8::from(*note),
                END_SYSEX,
            ],
            Frame::Note(event) => event.to_packet(),
            Frame::Passthrough(byte) => [*byte, 0, 0, 0, 0, 0],
        }
    }
}

/// Number of meaningful bytes at the start of `packet`: 6 for administrative frames, 3 for note messages, 1 otherwise.
///
/// Works on raw packets so that undecodable traffic can still be forwarded to the host with a sensible length.
pub fn frame_len(packet: &Packet) -> usize {
    match packet[0] {
        SYSEX => FRAME_LEN,
        status if matches!(status & 0xF0, NOTE_OFF | NOTE_ON) => NOTE_LEN,
        _ => 1,
    }
}
