//! Who a node is within the chain, and how logical note numbers map onto nodes and channels.

use crate::configuration::{CHANNELS_PER_NODE, FIRST_NOTE};
use wmidi::U7;

/// The two behaviors a node can take on, chosen at build time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RoleKind {
    /// Bridges the chain to the USB host; always `pico_id` 0.
    Controller,
    /// Senses keys and relays traffic toward the Controller.
    Worker,
}

/// Identity of a node, assigned once by the bootstrap and immutable afterwards.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeIdentity {
    /// Which side of the USB boundary the node is on.
    pub role: RoleKind,
    /// Position in the chain; 0 for the Controller, 1..=N for the Workers in chain order.
    pub pico_id: u8,
    /// Number of Workers that completed the bootstrap. Only meaningful on the Controller.
    pub node_count: u8,
}

impl NodeIdentity {
    /// `pico_id` reported by a Worker that has not been through the bootstrap yet.
    pub const UNASSIGNED_ID: u8 = 0x7F;

    /// Identity of the Controller of a chain with `node_count` Workers.
    pub const fn controller(node_count: u8) -> Self {
        Self {
            role: RoleKind::Controller,
            pico_id: 0,
            node_count,
        }
    }

    /// Identity of the Worker at chain position `pico_id`.
    pub const fn worker(pico_id: u8) -> Self {
        Self {
            role: RoleKind::Worker,
            pico_id,
            node_count: 0,
        }
    }

    /// Logical note number of a local channel, or `None` when it would not fit in 7 bits.
    pub fn note(&self, channel: usize) -> Option<U7> {
        KeyAddress {
            node: self.pico_id,
            channel: channel as u8,
        }
        .note()
    }

    /// Returns the local channel `note` refers to, or `None` when it belongs to another node.
    pub fn local_channel(&self, note: u8) -> Option<usize> {
        KeyAddress::from_note(note)
            .filter(|address| address.node == self.pico_id)
            .map(|address| usize::from(address.channel))
    }

    /// Returns `true` when some node of the chain owns `note`.
    ///
    /// The Controller owns the first channels, then come the `node_count` Workers.
    pub fn owns_note(&self, note: u8) -> bool {
        let nodes = usize::from(self.node_count) + 1;
        let end = usize::from(FIRST_NOTE) + nodes * CHANNELS_PER_NODE;
        note >= FIRST_NOTE && usize::from(note) < end
    }
}

/// A logical note decomposed into the node owning it and the channel on that node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyAddress {
    /// `pico_id` of the owning node.
    pub node: u8,
    /// Channel index on that node.
    pub channel: u8,
}

impl KeyAddress {
    /// Decomposes a logical note; notes below [`FIRST_NOTE`] belong to nobody.
    pub fn from_note(note: u8) -> Option<Self> {
        let offset = note.checked_sub(FIRST_NOTE)?;
        let channels = CHANNELS_PER_NODE as u8;
        Some(Self {
            node: offset / channels,
            channel: offset % channels,
        })
    }

    /// Composes the logical note `FIRST_NOTE + node * CHANNELS_PER_NODE + channel`.
    pub fn note(&self) -> Option<U7> {
        let note = usize::from(FIRST_NOTE)
            + usize::from(self.node) * CHANNELS_PER_NODE
            + usize::from(self.channel);
        u8::try_from(note).ok().and_then(|n| U7::try_from(n).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_of_controller_and_workers() {
        assert_eq!(Some(U7::from_u8_lossy(65)), NodeIdentity::controller(2).note(0));
        assert_eq!(Some(U7::from_u8_lossy(67)), NodeIdentity::controller(2).note(2));
        assert_eq!(Some(U7::from_u8_lossy(68)), NodeIdentity::worker(1).note(0));
        assert_eq!(Some(U7::from_u8_lossy(76)), NodeIdentity::worker(3).note(2));
        assert_eq!(None, NodeIdentity::worker(21).note(0));
    }

    #[test]
    fn address_round_trip() {
        for note in FIRST_NOTE..=0x7F {
            let address = KeyAddress::from_note(note).expect("note should be addressable");
            assert_eq!(Some(U7::from_u8_lossy(note)), address.note());
        }
    }

    #[test]
    fn notes_below_first_note_belong_to_nobody() {
        assert_eq!(None, KeyAddress::from_note(FIRST_NOTE - 1));
        assert_eq!(None, NodeIdentity::controller(0).local_channel(19));
    }

    #[test]
    fn only_own_notes_are_local() {
        let worker = NodeIdentity::worker(2);
        assert_eq!(Some(0), worker.local_channel(71));
        assert_eq!(Some(2), worker.local_channel(73));
        assert_eq!(None, worker.local_channel(70));
        assert_eq!(None, worker.local_channel(74));
    }

    #[test]
    fn controller_range_covers_every_worker() {
        let controller = NodeIdentity::controller(2);
        assert!(controller.owns_note(65));
        assert!(controller.owns_note(73));
        assert!(!controller.owns_note(74));
        assert!(!controller.owns_note(64));
    }
}
