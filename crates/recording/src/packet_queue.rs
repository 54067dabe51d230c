use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::packet::Packet;

/// Which timestamp a [`PacketQueue`] sorts by. Fixed for the life of a queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketOrder {
    #[default]
    Pts,
    Dts,
}

impl PacketOrder {
    pub fn key(&self, packet: &Packet) -> i64 {
        match self {
            Self::Pts => packet.pts(),
            Self::Dts => packet.dts(),
        }
    }
}

/// Reorder buffer sitting between the capture threads and the encoder.
///
/// Packets are kept sorted ascending by the queue's [`PacketOrder`] key, so
/// [`pop_front`](Self::pop_front) always yields the next packet to write.
/// A packet whose key equals keys already queued is placed after them, which
/// keeps equal-key packets in arrival order.
#[derive(Debug)]
pub struct PacketQueue {
    order: PacketOrder,
    packets: VecDeque<Packet>,
}

impl PacketQueue {
    pub fn new(order: PacketOrder) -> Self {
        Self {
            order,
            packets: VecDeque::new(),
        }
    }

    pub fn order(&self) -> PacketOrder {
        self.order
    }

    /// Inserts before the first queued packet with a strictly greater key and
    /// returns the new number of queued packets.
    pub fn insert(&mut self, packet: Packet) -> usize {
        let order = self.order;
        let key = order.key(&packet);
        let index = self
            .packets
            .partition_point(|queued| order.key(queued) <= key);

        self.packets.insert(index, packet);
        self.packets.len()
    }

    /// Removes the earliest packet, or returns `None` on an empty queue.
    pub fn pop_front(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    pub fn peek_key(&self) -> Option<i64> {
        self.packets.front().map(|packet| self.order.key(packet))
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Yields every queued packet earliest-first, leaving the queue empty.
    pub fn drain(&mut self) -> impl Iterator<Item = Packet> + '_ {
        self.packets.drain(..)
    }

    /// Releases every queued packet and returns how many were released.
    /// Calling it again on the now-empty queue releases nothing.
    pub fn destroy(&mut self) -> usize {
        let released = self.packets.len();
        self.packets.clear();
        released
    }
}
