//! Delta-encoded event timeline.
//!
//! A [`DeltaQueue`] stores pending events as a chain of links, each holding
//! the number of ticks between it and the previous link (the head link's
//! delta is relative to "now"). Events that fire at the same tick share a
//! link, so the chain length is bounded by the number of *distinct* future
//! deadlines, and each `advance` only ever inspects the head.
//!
//! ```text
//!   now ──► [Δ=5 | a, b] ──► [Δ=5 | c] ──► [Δ=90 | d]
//!             fires at 5       at 10         at 100
//! ```
//!
//! Links and per-link event entries live in two arenas (`Vec`s) addressed by
//! `u32` indices. Recycled slots are threaded onto free lists, so once the
//! arenas have grown to the high-water mark of simultaneously pending events
//! no further allocation happens.

use std::fmt;
use std::iter::FusedIterator;

/// Sentinel index for "no link" / "no entry".
const NIL: u32 = u32::MAX;

/// A link in the chain: all events firing `delta` ticks after the previous link.
#[derive(Debug, Clone, Copy)]
struct Link {
    delta: u64,
    first: u32,
    last: u32,
    next: u32,
}

/// One occurrence of an event within a link.
#[derive(Debug, Clone, Copy)]
struct Entry<E> {
    event: E,
    next: u32,
}

/// Arena high-water marks of a [`DeltaQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Footprint {
    /// Number of link slots ever allocated.
    pub links: usize,
    /// Number of event-entry slots ever allocated.
    pub entries: usize,
}

/// An amortized constant-time delta queue of events.
///
/// `E` is the event value stored by copy in arena slots; identity for
/// [`remove`](DeltaQueue::remove) is `PartialEq`. Scheduling the same value
/// twice creates two independent occurrences.
pub struct DeltaQueue<E> {
    links: Vec<Link>,
    entries: Vec<Entry<E>>,
    head: u32,
    free_links: u32,
    free_entries: u32,
    pending: usize,
    count: u64,
}

impl<E: Copy + PartialEq> DeltaQueue<E> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::with_capacity(0, 0)
    }

    /// Create an empty queue with pre-sized arenas.
    pub fn with_capacity(links: usize, entries: usize) -> Self {
        DeltaQueue {
            links: Vec::with_capacity(links),
            entries: Vec::with_capacity(entries),
            head: NIL,
            free_links: NIL,
            free_entries: NIL,
            pending: 0,
            count: 0,
        }
    }

    /// Schedule `event` to fire `delay` ticks from now.
    ///
    /// A delay of zero fires on the next call to [`advance`](DeltaQueue::advance),
    /// never from within `add`. Events with the same deadline fire in the
    /// order they were added.
    pub fn add(&mut self, event: E, delay: u64) {
        let mut remaining = delay;
        let mut prev = NIL;
        let mut pos = self.head;

        while pos != NIL && remaining > self.links[pos as usize].delta {
            remaining -= self.links[pos as usize].delta;
            prev = pos;
            pos = self.links[pos as usize].next;
        }

        if pos != NIL && remaining == self.links[pos as usize].delta {
            self.append_entry(pos, event);
        } else {
            let link = self.alloc_link(remaining, event);
            self.links[link as usize].next = pos;
            if pos != NIL {
                self.links[pos as usize].delta -= remaining;
            }
            if prev == NIL {
                self.head = link;
            } else {
                self.links[prev as usize].next = link;
            }
        }
        self.pending += 1;
    }

    /// Cancel every pending occurrence of `event`.
    ///
    /// Returns the number of occurrences removed; removing an absent event
    /// is a no-op. Links emptied by the removal are unlinked and their delta
    /// folded into the following link, so the remaining deadlines are kept.
    pub fn remove(&mut self, event: E) -> usize {
        let mut removed = 0;
        let mut prev = NIL;
        let mut pos = self.head;

        while pos != NIL {
            let next = self.links[pos as usize].next;
            removed += self.remove_from_link(pos, event);

            if self.links[pos as usize].first == NIL {
                if prev == NIL {
                    self.head = next;
                } else {
                    self.links[prev as usize].next = next;
                }
                if next != NIL {
                    self.links[next as usize].delta += self.links[pos as usize].delta;
                }
                self.free_link(pos);
            } else {
                prev = pos;
            }
            pos = next;
        }

        self.pending -= removed;
        removed
    }

    /// Advance the timeline by `ticks`, firing every event that becomes due.
    ///
    /// Events fire in non-decreasing deadline order, ties in insertion order.
    /// `fire` receives the queue itself so handlers can schedule or cancel
    /// further events; events added with delay zero while firing are due in
    /// this same advance. The first error stops the advance: the count then
    /// reflects only the ticks consumed up to the failing event.
    pub fn advance<X, F>(&mut self, ticks: u64, mut fire: F) -> Result<(), X>
    where
        F: FnMut(&mut Self, E) -> Result<(), X>,
    {
        let mut remaining = ticks;
        while let Some(event) = self.pop_due(&mut remaining) {
            fire(self, event)?;
        }
        Ok(())
    }

    /// Consume up to `*remaining` ticks and pop the next event due within them.
    ///
    /// Returns `None` once every remaining tick has been applied without
    /// reaching another event. This is the single-step form of
    /// [`advance`](DeltaQueue::advance) for owners that fire events
    /// themselves.
    pub fn pop_due(&mut self, remaining: &mut u64) -> Option<E> {
        if self.head == NIL {
            self.count += *remaining;
            *remaining = 0;
            return None;
        }

        let head = &mut self.links[self.head as usize];
        if head.delta > *remaining {
            head.delta -= *remaining;
            self.count += *remaining;
            *remaining = 0;
            return None;
        }

        *remaining -= head.delta;
        self.count += head.delta;
        head.delta = 0;
        Some(self.pop_head_entry())
    }

    /// Ticks until the next pending event, or `None` if the queue is empty.
    pub fn head_delta(&self) -> Option<u64> {
        if self.head == NIL {
            None
        } else {
            Some(self.links[self.head as usize].delta)
        }
    }

    /// Total ticks advanced since creation.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Number of pending event occurrences.
    pub fn len(&self) -> usize {
        self.pending
    }

    /// Returns true if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.head == NIL
    }

    /// Arena high-water marks.
    pub fn footprint(&self) -> Footprint {
        Footprint {
            links: self.links.len(),
            entries: self.entries.len(),
        }
    }

    /// Iterate pending occurrences in firing order as `(ticks_from_now, event)`.
    pub fn pending(&self) -> Pending<'_, E> {
        Pending {
            queue: self,
            link: self.head,
            entry: NIL,
            offset: 0,
        }
    }

    /// Iterate the chain's links as `(delta, events_in_link)`.
    pub fn deltas(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        let mut pos = self.head;
        std::iter::from_fn(move || {
            if pos == NIL {
                return None;
            }
            let link = &self.links[pos as usize];
            let mut size = 0;
            let mut e = link.first;
            while e != NIL {
                size += 1;
                e = self.entries[e as usize].next;
            }
            pos = link.next;
            Some((link.delta, size))
        })
    }

    fn pop_head_entry(&mut self) -> E {
        let link = self.head;
        let entry = self.links[link as usize].first;
        let Entry { event, next } = self.entries[entry as usize];

        self.links[link as usize].first = next;
        if next == NIL {
            // the head's delta is zero here, so the next link's delta is
            // already relative to now
            self.head = self.links[link as usize].next;
            self.free_link_only(link);
        }
        self.free_entry(entry);
        self.pending -= 1;
        event
    }

    fn remove_from_link(&mut self, link: u32, event: E) -> usize {
        let mut removed = 0;
        let mut prev = NIL;
        let mut pos = self.links[link as usize].first;

        while pos != NIL {
            let Entry { event: current, next } = self.entries[pos as usize];
            if current == event {
                if prev == NIL {
                    self.links[link as usize].first = next;
                } else {
                    self.entries[prev as usize].next = next;
                }
                if self.links[link as usize].last == pos {
                    self.links[link as usize].last = prev;
                }
                self.free_entry(pos);
                removed += 1;
            } else {
                prev = pos;
            }
            pos = next;
        }
        removed
    }

    fn append_entry(&mut self, link: u32, event: E) {
        let entry = self.alloc_entry(event);
        let last = self.links[link as usize].last;
        if last == NIL {
            self.links[link as usize].first = entry;
        } else {
            self.entries[last as usize].next = entry;
        }
        self.links[link as usize].last = entry;
    }

    fn alloc_link(&mut self, delta: u64, event: E) -> u32 {
        let entry = self.alloc_entry(event);
        let link = Link {
            delta,
            first: entry,
            last: entry,
            next: NIL,
        };

        if self.free_links == NIL {
            let idx = self.links.len() as u32;
            assert!(idx != NIL, "delta queue link arena exhausted");
            self.links.push(link);
            idx
        } else {
            let idx = self.free_links;
            self.free_links = self.links[idx as usize].next;
            self.links[idx as usize] = link;
            idx
        }
    }

    fn alloc_entry(&mut self, event: E) -> u32 {
        if self.free_entries == NIL {
            let idx = self.entries.len() as u32;
            assert!(idx != NIL, "delta queue entry arena exhausted");
            self.entries.push(Entry { event, next: NIL });
            idx
        } else {
            let idx = self.free_entries;
            self.free_entries = self.entries[idx as usize].next;
            self.entries[idx as usize] = Entry { event, next: NIL };
            idx
        }
    }

    /// Recycle a link whose entries have all been freed.
    fn free_link(&mut self, link: u32) {
        debug_assert!(self.links[link as usize].first == NIL);
        self.free_link_only(link);
    }

    fn free_link_only(&mut self, link: u32) {
        let slot = &mut self.links[link as usize];
        slot.first = NIL;
        slot.last = NIL;
        slot.delta = 0;
        slot.next = self.free_links;
        self.free_links = link;
    }

    fn free_entry(&mut self, entry: u32) {
        self.entries[entry as usize].next = self.free_entries;
        self.free_entries = entry;
    }
}

impl<E: Copy + PartialEq> Default for DeltaQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Copy + PartialEq + fmt::Debug> fmt::Debug for DeltaQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeltaQueue")
            .field("count", &self.count)
            .field("pending", &self.pending().collect::<Vec<_>>())
            .finish()
    }
}

/// Iterator over pending occurrences, see [`DeltaQueue::pending`].
pub struct Pending<'a, E> {
    queue: &'a DeltaQueue<E>,
    link: u32,
    entry: u32,
    offset: u64,
}

impl<E: Copy + PartialEq> Iterator for Pending<'_, E> {
    type Item = (u64, E);

    fn next(&mut self) -> Option<Self::Item> {
        while self.entry == NIL {
            if self.link == NIL {
                return None;
            }
            let link = &self.queue.links[self.link as usize];
            self.offset += link.delta;
            self.entry = link.first;
            self.link = link.next;
        }

        let entry = &self.queue.entries[self.entry as usize];
        self.entry = entry.next;
        Some((self.offset, entry.event))
    }
}

impl<E: Copy + PartialEq> FusedIterator for Pending<'_, E> {}
