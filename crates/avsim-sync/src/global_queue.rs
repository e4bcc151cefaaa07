//! The clock coordinator: a global event queue ticked once per round.

use crate::barrier::{BarrierSnapshot, RoundAction};
use crate::interval::IntervalSynchronizer;
use crate::synchronizer::Synchronizer;
use avsim_clock::{DeltaQueue, EventId, EventTable, MainClock};
use avsim_common::{ClockRate, Cycles, NodeId, SimError, SyncError};
use avsim_metrics::metric_defs;
use tracing::{debug, trace};

/// A one-shot global event handler.
pub type GlobalHandler = Box<dyn FnOnce(&mut GlobalEvents) -> Result<(), SimError> + Send>;

/// The global timeline, advanced by one tick each time a round completes.
///
/// Handlers run on whichever node thread completed the round, while the
/// barrier lock is held, so every node observes their effects before it
/// resumes. They receive the timeline itself for follow-up scheduling.
pub struct GlobalEvents {
    queue: DeltaQueue<EventId>,
    handlers: EventTable<GlobalHandler>,
    fired: u64,
}

impl GlobalEvents {
    fn new() -> Self {
        GlobalEvents {
            queue: DeltaQueue::new(),
            handlers: EventTable::new(),
            fired: 0,
        }
    }

    /// Global ticks elapsed.
    pub fn now(&self) -> u64 {
        self.queue.count()
    }

    /// Global events fired so far.
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Number of pending global events.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Schedule `handler` to run when the global time reaches `now() + ticks`.
    ///
    /// A delay of zero runs the handler at the end of the next round.
    pub fn schedule<F>(&mut self, ticks: u64, handler: F) -> EventId
    where
        F: FnOnce(&mut GlobalEvents) -> Result<(), SimError> + Send + 'static,
    {
        let id = self.handlers.insert(Box::new(handler));
        self.queue.add(id, ticks);
        id
    }

    /// Cancel a pending global event. No-op if it already fired.
    pub fn cancel(&mut self, id: EventId) {
        self.queue.remove(id);
        self.handlers.remove(id);
    }
}

impl RoundAction for GlobalEvents {
    fn complete_round(&mut self, round: u64) -> Result<(), SimError> {
        let mut remaining = 1;
        while let Some(id) = self.queue.pop_due(&mut remaining) {
            let Some(handler) = self.handlers.take(id) else {
                continue;
            };
            self.handlers.remove(id);
            self.fired += 1;
            metrics::counter!(metric_defs::SYNC_GLOBAL_EVENTS.name).increment(1);
            trace!(event = %id, tick = self.now(), "firing global event");
            handler(self)?;
        }
        debug_assert_eq!(self.queue.count(), round);
        Ok(())
    }
}

/// Coordinates every node thread of a session around one global timeline.
///
/// Owned by the session that runs the nodes; there is no process-wide
/// instance.
pub struct GlobalQueue {
    sync: IntervalSynchronizer<GlobalEvents>,
}

impl GlobalQueue {
    /// Create a coordinator meeting every `period` cycles of `reference`.
    pub fn new(period: Cycles, reference: ClockRate) -> Self {
        debug!(period, %reference, "global queue created");
        GlobalQueue {
            sync: IntervalSynchronizer::new(period, reference, GlobalEvents::new()),
        }
    }

    /// Arm the rendezvous timer of `node` on its clock.
    pub fn add_participant(&self, node: NodeId, clock: &mut MainClock) -> Result<(), SyncError> {
        self.sync.register(node, clock)
    }

    /// Disarm the rendezvous timer of `node` and leave the barrier.
    pub fn remove_participant(&self, node: NodeId, clock: &mut MainClock) -> Result<(), SyncError> {
        self.sync.deregister(node, clock)
    }

    /// Schedule `handler` to run `ticks` rounds from now.
    ///
    /// Must not be called from inside a global handler; use the
    /// [`GlobalEvents`] the handler receives instead.
    pub fn schedule_global_event<F>(&self, ticks: u64, handler: F) -> EventId
    where
        F: FnOnce(&mut GlobalEvents) -> Result<(), SimError> + Send + 'static,
    {
        self.sync.barrier().with_action(|events| events.schedule(ticks, handler))
    }

    /// Cancel a pending global event.
    pub fn cancel_global_event(&self, id: EventId) {
        self.sync.barrier().with_action(|events| events.cancel(id));
    }

    /// Completed rounds (global ticks).
    pub fn global_time(&self) -> u64 {
        self.sync.global_time()
    }

    /// Global time in reference cycles.
    pub fn global_cycles(&self) -> Cycles {
        self.global_time() * self.sync.period()
    }

    pub fn period(&self) -> Cycles {
        self.sync.period()
    }

    /// Meet period in cycles of a clock running at `rate`.
    pub fn local_period(&self, rate: ClockRate) -> Cycles {
        self.sync.local_period(rate)
    }

    /// Nodes with an armed rendezvous timer.
    pub fn participants(&self) -> usize {
        self.sync.participants()
    }

    /// Global events fired so far.
    pub fn global_events_fired(&self) -> u64 {
        self.sync.barrier().with_action(|events| events.fired())
    }
}

impl Synchronizer for GlobalQueue {
    fn register(&self, node: NodeId, clock: &mut MainClock) -> Result<(), SyncError> {
        self.add_participant(node, clock)
    }

    fn deregister(&self, node: NodeId, clock: &mut MainClock) -> Result<(), SyncError> {
        self.remove_participant(node, clock)
    }

    fn wait_for_neighbors(&self, node: NodeId, time: Cycles) -> Result<(), SyncError> {
        self.sync.wait_for_neighbors(node, time)
    }

    fn global_time(&self) -> u64 {
        self.sync.global_time()
    }

    fn reference_rate(&self) -> ClockRate {
        self.sync.reference_rate()
    }

    fn stop(&self) {
        self.sync.stop();
    }

    fn snapshot(&self) -> BarrierSnapshot {
        self.sync.snapshot()
    }
}
