//! Periodic rendezvous driven by each node's own clock.

use crate::barrier::{Arrival, Barrier, BarrierSnapshot, RoundAction};
use crate::synchronizer::Synchronizer;
use avsim_clock::{EventId, MainClock};
use avsim_common::{ClockRate, Cycles, NodeId, SyncError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A barrier met every `period` reference cycles.
///
/// Each registered clock gets a periodic event firing every
/// `period` cycles scaled into that clock's rate; the event parks the
/// node at the barrier. Nodes therefore never drift more than one period
/// apart in simulated time.
pub struct IntervalSynchronizer<A> {
    barrier: Arc<Barrier<A>>,
    period: Cycles,
    reference: ClockRate,
    timers: Mutex<HashMap<NodeId, EventId>>,
}

impl<A: RoundAction + 'static> IntervalSynchronizer<A> {
    /// Create a synchronizer meeting every `period` cycles of `reference`.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn new(period: Cycles, reference: ClockRate, action: A) -> Self {
        assert!(period > 0, "synchronization period must be non-zero");
        IntervalSynchronizer {
            barrier: Arc::new(Barrier::new(action)),
            period,
            reference,
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn barrier(&self) -> &Barrier<A> {
        &self.barrier
    }

    /// Meet period in reference cycles.
    pub fn period(&self) -> Cycles {
        self.period
    }

    /// Meet period in cycles of a clock running at `rate` (at least one).
    pub fn local_period(&self, rate: ClockRate) -> Cycles {
        self.reference.scale(self.period, rate).max(1)
    }

    /// Number of nodes with an armed timer.
    pub fn participants(&self) -> usize {
        self.timers.lock().len()
    }
}

impl<A: RoundAction + 'static> Synchronizer for IntervalSynchronizer<A> {
    fn register(&self, node: NodeId, clock: &mut MainClock) -> Result<(), SyncError> {
        let mut timers = self.timers.lock();
        if timers.contains_key(&node) {
            return Ok(());
        }

        self.barrier.register(node);
        let barrier = self.barrier.clone();
        let timer = clock.register(move |clock| {
            if let Arrival::Detached { round } = barrier.arrive(node)? {
                debug!(%node, round, "detached from barrier, disarming timer");
                if let Some(me) = clock.current_event() {
                    clock.cancel(me);
                }
            }
            Ok(())
        });

        let period = self.local_period(clock.rate());
        clock.insert_periodic(timer, period);
        timers.insert(node, timer);
        debug!(%node, period, rate = %clock.rate(), "rendezvous timer armed");
        Ok(())
    }

    fn deregister(&self, node: NodeId, clock: &mut MainClock) -> Result<(), SyncError> {
        if let Some(timer) = self.timers.lock().remove(&node) {
            clock.cancel(timer);
        }
        self.barrier.deregister(node)
    }

    fn wait_for_neighbors(&self, node: NodeId, time: Cycles) -> Result<(), SyncError> {
        self.barrier.wait_for_neighbors(node, time)
    }

    fn global_time(&self) -> u64 {
        self.barrier.round()
    }

    fn reference_rate(&self) -> ClockRate {
        self.reference
    }

    fn stop(&self) {
        self.barrier.stop();
    }

    fn snapshot(&self) -> BarrierSnapshot {
        self.barrier.snapshot()
    }
}
