//! Ordered outgoing packet queue
//!
//! Packet assembly for a station may finish out of order. Each live update
//! reserves a slot when assembly starts, and packets only leave the queue as
//! a contiguous run from the oldest reservation.

use std::collections::{BTreeMap, HashMap};

use crate::core::StationCode;

/// Handle to a reserved slot in an [`OutgoingQueue`].
///
/// Returned by [`OutgoingQueue::reserve`] and consumed when the slot is
/// fulfilled or released.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reservation blocks later packets until fulfilled or released"]
pub struct Reservation {
    station: StationCode,
    order: u64,
    sequence: u16,
    epoch: u64,
}

impl Reservation {
    /// Station this reservation belongs to.
    pub fn station(&self) -> &StationCode {
        &self.station
    }

    /// Live sequence id the slot was reserved for.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }
}

#[derive(Debug)]
enum Slot<P> {
    Pending,
    Ready(P),
    Released,
}

#[derive(Debug)]
struct StationSlots<P> {
    // Keyed by reservation order rather than sequence id so a wrapped
    // sequence still sorts after the slots reserved before it.
    slots: BTreeMap<u64, (u16, Slot<P>)>,
}

impl<P> Default for StationSlots<P> {
    fn default() -> Self {
        Self { slots: BTreeMap::new() }
    }
}

impl<P> StationSlots<P> {
    fn drain_ready(&mut self) -> Vec<P> {
        let mut ready = Vec::new();
        while let Some(entry) = self.slots.first_entry() {
            if matches!(entry.get().1, Slot::Pending) {
                break;
            }
            if let (_, Slot::Ready(packet)) = entry.remove() {
                ready.push(packet);
            }
        }
        ready
    }
}

/// Per-station send-ordering queue.
#[derive(Debug)]
pub struct OutgoingQueue<P> {
    stations: HashMap<StationCode, StationSlots<P>>,
    next_order: u64,
    epoch: u64,
}

impl<P> Default for OutgoingQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> OutgoingQueue<P> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            stations: HashMap::new(),
            next_order: 0,
            epoch: 0,
        }
    }

    /// Reserve the next slot for `station` under live sequence `sequence`.
    ///
    /// # Panics
    ///
    /// If a slot for the same station and sequence is still outstanding.
    /// That means a sequence id was reused within one connection.
    pub fn reserve(&mut self, station: &StationCode, sequence: u16) -> Reservation {
        let slots = self.stations.entry(station.clone()).or_default();
        assert!(
            !slots.slots.values().any(|(seq, _)| *seq == sequence),
            "duplicate reservation for station {station} sequence {sequence}"
        );

        let order = self.next_order;
        self.next_order += 1;
        slots.slots.insert(order, (sequence, Slot::Pending));

        Reservation {
            station: station.clone(),
            order,
            sequence,
            epoch: self.epoch,
        }
    }

    /// Store the assembled packet for `reservation` and return every packet
    /// that may now be transmitted, oldest first.
    ///
    /// Reservations made before the last [`clear`](Self::clear) are ignored.
    ///
    /// # Panics
    ///
    /// If the slot was already fulfilled or released.
    pub fn fulfil(&mut self, reservation: Reservation, packet: P) -> Vec<P> {
        self.resolve(reservation, Slot::Ready(packet))
    }

    /// Give up a reservation that will never produce a packet, and return
    /// the packets it was holding back.
    pub fn release(&mut self, reservation: Reservation) -> Vec<P> {
        self.resolve(reservation, Slot::Released)
    }

    fn resolve(&mut self, reservation: Reservation, resolved: Slot<P>) -> Vec<P> {
        if reservation.epoch != self.epoch {
            return Vec::new();
        }
        let Some(slots) = self.stations.get_mut(&reservation.station) else {
            panic!(
                "slot for station {} sequence {} already sent",
                reservation.station, reservation.sequence
            );
        };
        match slots.slots.get_mut(&reservation.order) {
            Some((_, slot @ Slot::Pending)) => *slot = resolved,
            _ => panic!(
                "slot for station {} sequence {} already resolved",
                reservation.station, reservation.sequence
            ),
        }
        slots.drain_ready()
    }

    /// Number of outstanding slots for `station`.
    pub fn pending(&self, station: &StationCode) -> usize {
        self.stations.get(station).map_or(0, |s| s.slots.len())
    }

    /// Whether no slots are outstanding for any station.
    pub fn is_empty(&self) -> bool {
        self.stations.values().all(|s| s.slots.is_empty())
    }

    /// Drop every outstanding slot. Reservations issued before this call
    /// become stale.
    pub fn clear(&mut self) {
        self.stations.clear();
        self.epoch += 1;
    }
}
