//! Hand-off of administrative frames from the relay (producer) to the application (consumer).
//!
//! The relay sits in the middle of the chain and must never stall it, so enqueueing never waits: when the queue is full
//! the newest frame is dropped and handed back to the caller, which reports the overflow.

use crate::{configuration::COMMAND_QUEUE_LEN, frame::AdminFrame};
use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::{Channel, TrySendError},
};

/// Returned by [`CommandQueue::enqueue`] with the frame that did not fit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueFull(pub AdminFrame);

/// A bounded single-producer single-consumer queue with a drop-newest overflow policy.
///
/// Safe to share between cores as long as `M` is (e.g., `CriticalSectionRawMutex` on the RP2040).
pub struct CommandQueue<M: RawMutex, const N: usize = COMMAND_QUEUE_LEN> {
    channel: Channel<M, AdminFrame, N>,
}

impl<M: RawMutex, const N: usize> Default for CommandQueue<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const N: usize> CommandQueue<M, N> {
    /// Constructs an empty queue; usable in a `static`.
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Appends a frame without waiting.
    pub fn enqueue(&self, frame: AdminFrame) -> Result<(), QueueFull> {
        self.channel.try_send(frame).map_err(|err| match err {
            TrySendError::Full(frame) => QueueFull(frame),
        })
    }

    /// Takes the oldest frame, if any.
    pub fn dequeue(&self) -> Option<AdminFrame> {
        self.channel.try_receive().ok()
    }

    /// Number of frames waiting.
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    /// Returns `true` when no frame is waiting.
    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Command;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    const CAPACITY: usize = 4;

    fn frame(n: u8) -> AdminFrame {
        AdminFrame::new(Command::ContinueRegulation, n, 0)
    }

    #[test]
    fn fifo_order() {
        let queue: CommandQueue<NoopRawMutex, CAPACITY> = CommandQueue::new();
        queue.enqueue(frame(1)).unwrap();
        queue.enqueue(frame(2)).unwrap();

        assert_eq!(Some(frame(1)), queue.dequeue());
        assert_eq!(Some(frame(2)), queue.dequeue());
        assert_eq!(None, queue.dequeue());
    }

    #[test]
    fn overflow_drops_newest_without_blocking() {
        let queue: CommandQueue<NoopRawMutex, CAPACITY> = CommandQueue::new();
        for n in 0..CAPACITY as u8 {
            queue.enqueue(frame(n)).unwrap();
        }

        let overflow = queue.enqueue(frame(99));

        assert_eq!(Err(QueueFull(frame(99))), overflow, "Expected left but got right");
        assert_eq!(CAPACITY, queue.len());
        for n in 0..CAPACITY as u8 {
            assert_eq!(Some(frame(n)), queue.dequeue(), "Oldest frames should survive");
        }
        assert!(queue.is_empty());
    }
}
