use crate::barrier::BarrierSnapshot;
use avsim_clock::MainClock;
use avsim_common::{ClockRate, Cycles, NodeId, SyncError};

/// Coordinates the clocks of concurrently running nodes.
///
/// Implementations are shared by every node thread of a run. `register` and
/// `deregister` take the node's own clock so the synchronizer can arm and
/// disarm its timer there; they must be called by the thread that owns the
/// clock (or before that thread starts).
pub trait Synchronizer: Send + Sync {
    /// Add `node` and arm its rendezvous timer on `clock`.
    fn register(&self, node: NodeId, clock: &mut MainClock) -> Result<(), SyncError>;

    /// Disarm the rendezvous timer of `node` and remove it.
    fn deregister(&self, node: NodeId, clock: &mut MainClock) -> Result<(), SyncError>;

    /// Block until every other participant has reached `time` (reference
    /// cycles) or is parked at the meet.
    fn wait_for_neighbors(&self, node: NodeId, time: Cycles) -> Result<(), SyncError>;

    /// Completed rounds.
    fn global_time(&self) -> u64;

    /// The clock rate periods and channel timestamps are expressed in.
    fn reference_rate(&self) -> ClockRate;

    /// Convert a node's local cycle count into reference cycles.
    fn to_global(&self, local: Cycles, rate: ClockRate) -> Cycles {
        rate.scale(local, self.reference_rate())
    }

    /// Interrupt every blocked participant; subsequent waits fail.
    fn stop(&self);

    /// Diagnostic view of the rendezvous state.
    fn snapshot(&self) -> BarrierSnapshot;
}
