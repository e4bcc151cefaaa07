//! Event identities and the handler table.
//!
//! The delta queue stores only small `Copy` keys; the handlers themselves
//! live in an [`EventTable`] slot addressed by [`EventId`]. Slots carry a
//! generation so that a stale id (one whose event was deregistered and whose
//! slot was reused) never aliases the new occupant.

use std::fmt;

/// Identity of a registered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId {
    index: u32,
    generation: u32,
}

impl EventId {
    /// Slot index of this event.
    pub fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event:{}#{}", self.index, self.generation)
    }
}

enum Slot<H> {
    Vacant { next_free: Option<u32> },
    Occupied(H),
    /// The handler is checked out while it runs.
    Firing,
}

struct Entry<H> {
    generation: u32,
    slot: Slot<H>,
}

/// Generational storage for event handlers.
pub struct EventTable<H> {
    entries: Vec<Entry<H>>,
    free: Option<u32>,
    live: usize,
}

impl<H> EventTable<H> {
    pub fn new() -> Self {
        EventTable {
            entries: Vec::new(),
            free: None,
            live: 0,
        }
    }

    /// Store a handler and return its id.
    pub fn insert(&mut self, handler: H) -> EventId {
        self.live += 1;
        match self.free {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                if let Slot::Vacant { next_free } = entry.slot {
                    self.free = next_free;
                }
                entry.slot = Slot::Occupied(handler);
                EventId {
                    index,
                    generation: entry.generation,
                }
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Entry {
                    generation: 0,
                    slot: Slot::Occupied(handler),
                });
                EventId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    /// Returns true if `id` names a registered event (including one that is firing).
    pub fn contains(&self, id: EventId) -> bool {
        self.entries
            .get(id.index as usize)
            .map(|e| e.generation == id.generation && !matches!(e.slot, Slot::Vacant { .. }))
            .unwrap_or(false)
    }

    /// Deregister `id`, returning its handler if it was not firing.
    ///
    /// Removing a firing event vacates its slot; the handler is dropped when
    /// it is handed back through [`restore`](EventTable::restore).
    pub fn remove(&mut self, id: EventId) -> Option<H> {
        if !self.contains(id) {
            return None;
        }
        let entry = &mut self.entries[id.index as usize];
        entry.generation = entry.generation.wrapping_add(1);
        let previous = std::mem::replace(
            &mut entry.slot,
            Slot::Vacant {
                next_free: self.free,
            },
        );
        self.free = Some(id.index);
        self.live -= 1;
        match previous {
            Slot::Occupied(handler) => Some(handler),
            _ => None,
        }
    }

    /// Check out the handler of `id` so it can run.
    pub fn take(&mut self, id: EventId) -> Option<H> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        match std::mem::replace(&mut entry.slot, Slot::Firing) {
            Slot::Occupied(handler) => Some(handler),
            other => {
                entry.slot = other;
                None
            }
        }
    }

    /// Return a handler checked out with [`take`](EventTable::take).
    ///
    /// Returns false (and drops the handler) if the event was deregistered
    /// while it was firing.
    pub fn restore(&mut self, id: EventId, handler: H) -> bool {
        match self.entries.get_mut(id.index as usize) {
            Some(entry)
                if entry.generation == id.generation && matches!(entry.slot, Slot::Firing) =>
            {
                entry.slot = Slot::Occupied(handler);
                true
            }
            _ => false,
        }
    }

    /// Number of registered events.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

impl<H> Default for EventTable<H> {
    fn default() -> Self {
        Self::new()
    }
}
