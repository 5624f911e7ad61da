// crates/mediaplex-engine/src/packet_queue.rs
//
// Bounded per-stream FIFO. Deliberately not internally synchronized — the
// owning PacketProducer's mutex guards every queue of a pipeline as a group,
// so there's nothing here beyond a VecDeque and the handful of operations
// the producer and the decoder actually need.

use std::collections::VecDeque;

use crate::ffi::demux::RawPacket;

/// `None` is the end-of-stream sentinel: a null packet marks the end of a
/// stream the same way it does on the wire from `av_read_frame`.
pub struct PacketQueue {
    items: VecDeque<Option<RawPacket>>,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn enqueue(&mut self, packet: Option<RawPacket>) {
        self.items.push_back(packet);
    }

    pub fn dequeue(&mut self) -> Option<Option<RawPacket>> {
        self.items.pop_front()
    }

    /// Return a packet to the head — a codec's "try again later" response
    /// must not drop it.
    pub fn push_back(&mut self, packet: Option<RawPacket>) {
        self.items.push_front(packet);
    }

    pub fn drain(&mut self) {
        self.items.clear();
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_with_returned_head() {
        let mut q = PacketQueue::new();
        q.enqueue(None);
        assert_eq!(q.len(), 1);
        let got = q.dequeue().unwrap();
        assert!(got.is_none());
        assert!(q.is_empty());
        q.enqueue(None);
        let returned = q.dequeue().unwrap();
        q.push_back(returned);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn drain_empties_queue() {
        let mut q = PacketQueue::new();
        q.enqueue(None);
        q.enqueue(None);
        q.drain();
        assert!(q.is_empty());
    }
}
