//! A node's main clock: a cycle counter driving a delta queue of handlers.

use crate::delta_queue::DeltaQueue;
use crate::event::{EventId, EventTable};
use avsim_common::{ClockRate, Cycles, Result};
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

/// Handler invoked when an event fires.
///
/// The handler receives the clock so it can reschedule itself (see
/// [`MainClock::current_event`]), schedule other events, or cancel them.
pub type EventHandler = Box<dyn FnMut(&mut MainClock) -> Result<()> + Send>;

/// The main clock of one simulated node.
///
/// Time only moves forward through [`advance`](MainClock::advance), which is
/// called by the node's execution loop after it executes instructions or
/// sleeps. Events are registered once and may be inserted into the timeline
/// any number of times.
pub struct MainClock {
    name: String,
    rate: ClockRate,
    queue: DeltaQueue<EventId>,
    events: EventTable<EventHandler>,
    periods: HashMap<EventId, Cycles>,
    current: Option<EventId>,
    fired: u64,
}

impl MainClock {
    /// Create a clock at cycle zero.
    pub fn new(name: impl Into<String>, rate: ClockRate) -> Self {
        MainClock {
            name: name.into(),
            rate,
            queue: DeltaQueue::new(),
            events: EventTable::new(),
            periods: HashMap::new(),
            current: None,
            fired: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rate(&self) -> ClockRate {
        self.rate
    }

    /// Cycles elapsed since the clock was created.
    pub fn count(&self) -> Cycles {
        self.queue.count()
    }

    /// Elapsed time in milliseconds.
    pub fn millis(&self) -> f64 {
        self.rate.cycles_to_millis(self.count())
    }

    /// Number of handler invocations so far.
    pub fn events_fired(&self) -> u64 {
        self.fired
    }

    /// Number of pending event occurrences.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Cycles until the next pending event.
    pub fn first_event_delta(&self) -> Option<Cycles> {
        self.queue.head_delta()
    }

    /// The event whose handler is currently running, if any.
    pub fn current_event(&self) -> Option<EventId> {
        self.current
    }

    /// Register a handler without scheduling it.
    pub fn register<F>(&mut self, handler: F) -> EventId
    where
        F: FnMut(&mut MainClock) -> Result<()> + Send + 'static,
    {
        self.events.insert(Box::new(handler))
    }

    /// Register a handler and schedule it `delay` cycles from now.
    pub fn schedule<F>(&mut self, delay: Cycles, handler: F) -> EventId
    where
        F: FnMut(&mut MainClock) -> Result<()> + Send + 'static,
    {
        let id = self.register(handler);
        self.queue.add(id, delay);
        id
    }

    /// Insert a registered event `delay` cycles from now.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered with this clock.
    pub fn insert_event(&mut self, id: EventId, delay: Cycles) {
        assert!(
            self.events.contains(id),
            "{} is not registered with clock {}",
            id,
            self.name
        );
        self.queue.add(id, delay);
    }

    /// Insert a registered event that re-arms itself every `period` cycles
    /// after each successful firing, until it is removed or cancelled.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero or `id` is not registered.
    pub fn insert_periodic(&mut self, id: EventId, period: Cycles) {
        assert!(period > 0, "periodic event needs a non-zero period");
        self.insert_event(id, period);
        self.periods.insert(id, period);
    }

    /// Remove every pending occurrence of `id`. The event stays registered.
    pub fn remove_event(&mut self, id: EventId) {
        self.queue.remove(id);
        self.periods.remove(&id);
    }

    /// Remove every pending occurrence of `id` and deregister its handler.
    ///
    /// A handler may cancel itself; it is dropped once it returns.
    pub fn cancel(&mut self, id: EventId) {
        self.remove_event(id);
        self.events.remove(id);
    }

    /// Advance the clock by `cycles`, running every handler that becomes due.
    ///
    /// A handler error stops the advance and is returned; the clock count
    /// then stands at the failing event's firing time.
    ///
    /// # Panics
    ///
    /// Panics if called from inside an event handler.
    pub fn advance(&mut self, cycles: Cycles) -> Result<()> {
        assert!(
            self.current.is_none(),
            "clock {} advanced from inside an event handler",
            self.name
        );

        let mut remaining = cycles;
        while let Some(id) = self.queue.pop_due(&mut remaining) {
            self.fire(id)?;
        }
        Ok(())
    }

    fn fire(&mut self, id: EventId) -> Result<()> {
        let Some(mut handler) = self.events.take(id) else {
            return Ok(());
        };

        trace!(clock = %self.name, event = %id, cycle = self.count(), "firing event");
        self.current = Some(id);
        let result = handler(self);
        self.current = None;
        self.fired += 1;

        if self.events.restore(id, handler) && result.is_ok() {
            if let Some(&period) = self.periods.get(&id) {
                self.queue.add(id, period);
            }
        }
        result
    }
}

impl fmt::Debug for MainClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainClock")
            .field("name", &self.name)
            .field("rate", &self.rate)
            .field("count", &self.count())
            .field("pending", &self.queue.len())
            .finish()
    }
}
