//! One radio's view of the channel.

use crate::propagation::Position;
use avsim_common::{Cycles, NodeId};
use std::collections::VecDeque;

/// Cycles (reference rate) to transfer one byte over the air.
pub const BYTE_PERIOD: Cycles = 6106;

/// Cycles per bit.
pub const BIT_PERIOD: Cycles = BYTE_PERIOD / 8;

/// Half a bit period, the resolution used when slicing overlapping bytes.
pub const HALF_BIT_PERIOD: Cycles = BYTE_PERIOD / 16;

/// Window an RSSI sample integrates over.
pub const SAMPLE_WINDOW: Cycles = 13 * 64;

/// Inverted RSSI reading of an idle channel.
pub const RSSI_IDLE: u16 = 0x3ff;

/// Inverted RSSI reading of a busy channel.
pub const RSSI_BUSY: u16 = 0;

/// A byte on the air as heard by one receiver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transmission {
    pub sender: NodeId,
    pub data: u8,
    /// When the first bit left the sender (reference cycles).
    pub origin_time: Cycles,
    /// When the last bit arrives.
    pub delivery_time: Cycles,
    /// Received power in watts.
    pub power: f64,
}

impl Transmission {
    /// A byte sent by `sender` starting at `origin_time`.
    pub fn new(sender: NodeId, data: u8, origin_time: Cycles, power: f64) -> Self {
        Transmission {
            sender,
            data,
            origin_time,
            delivery_time: origin_time + BYTE_PERIOD,
            power,
        }
    }

    fn overlaps(&self, from: Cycles, to: Cycles) -> bool {
        self.delivery_time > from && self.origin_time < to
    }
}

/// A neighboring radio and its distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub node: NodeId,
    pub distance: f64,
}

/// Per-radio channel state: neighbors sorted by distance and the
/// transmissions this radio can hear.
///
/// Neighbors are held by id and looked up in the owning air; a `LocalAir`
/// never owns another radio's state.
#[derive(Debug, Clone)]
pub struct LocalAir {
    node: NodeId,
    position: Position,
    neighbors: Vec<Neighbor>,
    packets: VecDeque<Transmission>,
}

impl LocalAir {
    pub fn new(node: NodeId, position: Position) -> Self {
        LocalAir {
            node,
            position,
            neighbors: Vec::new(),
            packets: VecDeque::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Neighbors, nearest first.
    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors
    }

    /// Buffered transmissions, in the order they were written.
    pub fn packets(&self) -> impl Iterator<Item = &Transmission> {
        self.packets.iter()
    }

    /// Add a neighbor at `position`. Equal distances keep insertion order.
    pub fn add_neighbor(&mut self, node: NodeId, position: &Position) {
        let distance = self.position.distance(position);
        let at = self.neighbors.partition_point(|n| n.distance <= distance);
        self.neighbors.insert(at, Neighbor { node, distance });
    }

    /// Remove `node` from the neighbor list. No-op if absent.
    pub fn remove_neighbor(&mut self, node: NodeId) {
        self.neighbors.retain(|n| n.node != node);
    }

    /// Buffer a transmission heard by this radio.
    pub fn add_packet(&mut self, packet: Transmission) {
        self.packets.push_back(packet);
    }

    /// Drop transmissions that ended too long before `now` to be sampled
    /// or sliced into a byte read.
    pub fn prune(&mut self, now: Cycles) {
        let horizon = now.saturating_sub(BYTE_PERIOD + SAMPLE_WINDOW);
        self.packets.retain(|p| p.delivery_time > horizon);
    }

    /// Inverted RSSI at `time`: [`RSSI_BUSY`] if anything was on the air in
    /// the sample window ending at `time`, else [`RSSI_IDLE`].
    pub fn sample_rssi(&self, time: Cycles) -> u16 {
        let from = time.saturating_sub(SAMPLE_WINDOW);
        if self.packets.iter().any(|p| p.overlaps(from, time)) {
            RSSI_BUSY
        } else {
            RSSI_IDLE
        }
    }

    /// The sender heard loudest among transmissions on the air during the
    /// byte period ending at `time`. Equal powers keep the earliest written.
    pub fn strongest_sender(&self, time: Cycles) -> Option<NodeId> {
        let from = time.saturating_sub(BYTE_PERIOD);
        let mut strongest: Option<&Transmission> = None;
        for packet in self.packets.iter().filter(|p| p.overlaps(from, time)) {
            match strongest {
                Some(best) if packet.power <= best.power => {}
                _ => strongest = Some(packet),
            }
        }
        strongest.map(|p| p.sender)
    }

    /// The byte whose last bit arrives at `time`, assembled MSB first from
    /// the transmissions of the strongest sender overlapping it. Weaker
    /// colliding senders are not heard.
    ///
    /// Returns `None` when fewer than eight bits can be recovered.
    pub fn read_byte(&self, time: Cycles) -> Option<u8> {
        let sender = self.strongest_sender(time)?;
        let mut data: u32 = 0;
        let mut bits_front = 0;
        let mut bits_end = 0;

        for packet in self.packets.iter().filter(|p| p.sender == sender) {
            let data_in = packet.data as u32;
            if packet.delivery_time == time {
                data |= data_in;
                bits_front = 8;
                bits_end = 8;
            } else if time < packet.delivery_time {
                // tail of the packet is still in flight
                let shift = bit_offset(packet.delivery_time - time);
                if shift < 8 {
                    bits_end = bits_end.max(8 - shift);
                    data |= data_in >> shift;
                }
            } else {
                // head of the packet has already passed
                let shift = bit_offset(time - packet.delivery_time);
                if shift < 8 {
                    bits_front = bits_front.max(8 - shift);
                    data |= data_in << shift;
                }
            }
        }

        if bits_front + bits_end >= 8 {
            Some(data as u8)
        } else {
            None
        }
    }
}

/// Whole bits between two instants, rounding half bits up.
fn bit_offset(cycles: Cycles) -> u32 {
    let half_bits = cycles / HALF_BIT_PERIOD;
    ((half_bits + 1) / 2).min(8) as u32
}
