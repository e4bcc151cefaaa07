use crate::barrier::BarrierSnapshot;
use crate::synchronizer::Synchronizer;
use avsim_clock::MainClock;
use avsim_common::{ClockRate, Cycles, InterruptCause, NodeId, SyncError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Synchronizer for a simulation with exactly one node.
///
/// There is nobody to wait for, so no timer is armed and channel waits
/// return at once.
pub struct SingleSynchronizer {
    node: Mutex<Option<NodeId>>,
    reference: ClockRate,
    stopped: AtomicBool,
}

impl SingleSynchronizer {
    pub fn new(reference: ClockRate) -> Self {
        SingleSynchronizer {
            node: Mutex::new(None),
            reference,
            stopped: AtomicBool::new(false),
        }
    }

    fn check(&self, node: NodeId) -> Result<(), SyncError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(SyncError::Interrupted {
                participant: node,
                cause: InterruptCause::Stopped,
            });
        }
        match *self.node.lock() {
            Some(registered) if registered == node => Ok(()),
            _ => Err(SyncError::UnknownParticipant { participant: node }),
        }
    }
}

impl Synchronizer for SingleSynchronizer {
    fn register(&self, node: NodeId, _clock: &mut MainClock) -> Result<(), SyncError> {
        let mut registered = self.node.lock();
        match *registered {
            Some(existing) if existing != node => Err(SyncError::ParticipantMismatch {
                expected: 1,
                found: 2,
            }),
            _ => {
                *registered = Some(node);
                Ok(())
            }
        }
    }

    fn deregister(&self, node: NodeId, _clock: &mut MainClock) -> Result<(), SyncError> {
        let mut registered = self.node.lock();
        if *registered == Some(node) {
            *registered = None;
            Ok(())
        } else {
            Err(SyncError::UnknownParticipant { participant: node })
        }
    }

    fn wait_for_neighbors(&self, node: NodeId, _time: Cycles) -> Result<(), SyncError> {
        self.check(node)
    }

    fn global_time(&self) -> u64 {
        0
    }

    fn reference_rate(&self) -> ClockRate {
        self.reference
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn snapshot(&self) -> BarrierSnapshot {
        let node = *self.node.lock();
        BarrierSnapshot {
            round: 0,
            goal: usize::from(node.is_some()),
            arrived: Vec::new(),
            sampling: Vec::new(),
            missing: node.into_iter().collect(),
            pending_joins: Vec::new(),
            pending_leaves: Vec::new(),
            interrupted: self.stopped.load(Ordering::Acquire),
        }
    }
}
