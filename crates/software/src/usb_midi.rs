//! Conversion between link frames and USB-MIDI Event Packets (cable 0).
//!
//! Every USB-MIDI Event Packet is 32 bits long. The first byte holds the cable number and the Code Index Number (CIN),
//! which tells how many of the remaining three bytes are meaningful.

use crate::frame::{END_SYSEX, FRAME_LEN, Packet, SYSEX, frame_len};
use tinyvec::ArrayVec;

/// A single USB-MIDI Event Packet.
pub type EventPacket = [u8; 4];

/// SysEx starts or continues with three bytes.
const CIN_SYSEX_CONTINUE: u8 = 0x4;
/// SysEx ends with one byte, or a single-byte system common message.
const CIN_SYSEX_END_1: u8 = 0x5;
/// SysEx ends with two bytes.
const CIN_SYSEX_END_2: u8 = 0x6;
/// SysEx ends with three bytes.
const CIN_SYSEX_END_3: u8 = 0x7;
const CIN_NOTE_OFF: u8 = 0x8;
const CIN_NOTE_ON: u8 = 0x9;
/// A single byte, passed through as is.
const CIN_SINGLE_BYTE: u8 = 0xF;

/// Splits the frame held by `packet` into the event packets carrying it to the host.
pub fn packetize(packet: &Packet) -> ArrayVec<[EventPacket; 2]> {
    let mut events = ArrayVec::new();
    match frame_len(packet) {
        FRAME_LEN => {
            events.push([CIN_SYSEX_CONTINUE, packet[0], packet[1], packet[2]]);
            events.push([CIN_SYSEX_END_3, packet[3], packet[4], packet[5]]);
        }
        // note-on and note-off share their CIN with the upper nibble of their status byte
        3 => events.push([packet[0] >> 4, packet[0], packet[1], packet[2]]),
        _ => events.push([CIN_SINGLE_BYTE, packet[0], 0, 0]),
    }
    events
}

/// Reassembles link frames from the event packets sent by the host.
///
/// Administrative frames are exactly six bytes long, but hosts are free to send longer System Exclusive messages (some
/// tools pad the payload). Those are cut down to their first five bytes and closed with [`END_SYSEX`]; shorter ones
/// are zero-padded the same way.
#[derive(Default)]
pub struct UsbMidiParser {
    sysex: ArrayVec<[u8; FRAME_LEN - 1]>,
    in_sysex: bool,
}

impl UsbMidiParser {
    /// Constructs a parser expecting the start of a message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one event packet. Returns a frame once one is complete.
    pub fn push(&mut self, event: &EventPacket) -> Option<Packet> {
        let data = &event[1..];
        match event[0] & 0x0F {
            CIN_SYSEX_CONTINUE => {
                data.iter().for_each(|&byte| self.sysex_byte(byte));
                None
            }
            CIN_SYSEX_END_1 if !self.in_sysex => Some(single(data[0])),
            CIN_SYSEX_END_1 => self.sysex_end(&data[..1]),
            CIN_SYSEX_END_2 => self.sysex_end(&data[..2]),
            CIN_SYSEX_END_3 => self.sysex_end(data),
            CIN_NOTE_OFF | CIN_NOTE_ON => Some([data[0], data[1], data[2], 0, 0, 0]),
            CIN_SINGLE_BYTE => Some(single(data[0])),
            _cin => {
                #[cfg(feature = "defmt")]
                defmt::debug!("Ignoring USB-MIDI event with CIN {=u8:#x}", _cin);
                None
            }
        }
    }

    fn sysex_byte(&mut self, byte: u8) {
        if byte == SYSEX {
            self.sysex.clear();
            self.in_sysex = true;
        }
        if self.in_sysex {
            // bytes past the fifth are dropped
            let _ = self.sysex.try_push(byte);
        }
    }

    fn sysex_end(&mut self, data: &[u8]) -> Option<Packet> {
        for &byte in data.iter().take_while(|&&byte| byte != END_SYSEX) {
            self.sysex_byte(byte);
        }
        if !self.in_sysex {
            return None;
        }
        self.in_sysex = false;

        let mut packet = Packet::default();
        packet[..self.sysex.len()].copy_from_slice(&self.sysex);
        packet[FRAME_LEN - 1] = END_SYSEX;
        self.sysex.clear();
        Some(packet)
    }
}

fn single(byte: u8) -> Packet {
    [byte, 0, 0, 0, 0, 0]
}
