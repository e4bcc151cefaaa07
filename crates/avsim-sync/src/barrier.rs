//! The rendezvous barrier shared by all node threads.
//!
//! Participants *arrive* at the meet once per round. The thread whose
//! arrival completes the round runs the [`RoundAction`] while holding the
//! lock, bumps the round, and broadcasts; every other arrival sleeps on the
//! condition variable until the round number changes.
//!
//! Membership changes are resolved against the meet:
//!
//! - joining while anyone is parked is deferred to the next round boundary
//! - leaving while parked at the meet is deferred to the round boundary
//!   (the leaver is released with [`Arrival::Detached`])
//! - leaving while running drops the goal at once; if that leaves every
//!   remaining participant parked, the leaver completes the round itself
//!
//! Besides the meet, a participant can *sample* at a point in time with
//! [`Barrier::wait_for_neighbors`]. Samplers are released one at a time, in
//! `(time, arrival)` order, once every participant is either parked at the
//! meet or sampling.

use avsim_common::{InterruptCause, NodeId, SimError, SyncError};
use avsim_metrics::metric_defs;
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{debug, error, trace};

/// Work performed exactly once per completed round, under the barrier lock.
pub trait RoundAction: Send {
    /// Complete round `round` (the first round is 1).
    fn complete_round(&mut self, round: u64) -> Result<(), SimError>;
}

impl<F> RoundAction for F
where
    F: FnMut(u64) -> Result<(), SimError> + Send,
{
    fn complete_round(&mut self, round: u64) -> Result<(), SimError> {
        self(round)
    }
}

/// How an arrival at the meet ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// This caller completed the round and ran the action.
    Advanced { round: u64 },
    /// Another caller completed the round.
    Released { round: u64 },
    /// The caller was deregistered while parked; it left at this round boundary.
    Detached { round: u64 },
}

impl Arrival {
    /// The round that was completed.
    pub fn round(self) -> u64 {
        match self {
            Arrival::Advanced { round } | Arrival::Released { round } | Arrival::Detached { round } => {
                round
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Running,
    Meeting,
    Sampling { time: u64, seq: u64 },
}

struct State<A> {
    action: A,
    participants: BTreeMap<NodeId, Presence>,
    pending_joins: BTreeSet<NodeId>,
    pending_leaves: BTreeSet<NodeId>,
    meeting: usize,
    samplers: BTreeSet<(u64, u64, NodeId)>,
    round: u64,
    next_seq: u64,
    interrupt: Option<InterruptCause>,
    /// Per-participant wait histograms, labelled once at registration.
    wait_histograms: BTreeMap<NodeId, metrics::Histogram>,
}

impl<A> State<A> {
    fn goal(&self) -> usize {
        self.participants.len()
    }

    fn in_round(&self) -> bool {
        self.meeting > 0 || !self.samplers.is_empty()
    }

    fn interrupted(&self, participant: NodeId) -> Result<(), SyncError> {
        match &self.interrupt {
            Some(cause) => Err(SyncError::Interrupted {
                participant,
                cause: cause.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Point-in-time view of the barrier, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BarrierSnapshot {
    /// Completed rounds.
    pub round: u64,
    /// Registered participants.
    pub goal: usize,
    /// Participants parked at the meet.
    pub arrived: Vec<NodeId>,
    /// Participants parked in a channel wait.
    pub sampling: Vec<NodeId>,
    /// Participants the current round is waiting for.
    pub missing: Vec<NodeId>,
    /// Registrations deferred to the next round boundary.
    pub pending_joins: Vec<NodeId>,
    /// Deregistrations deferred to the next round boundary.
    pub pending_leaves: Vec<NodeId>,
    /// Set once the barrier has been stopped or aborted.
    pub interrupted: bool,
}

impl BarrierSnapshot {
    /// True if at least one participant is parked and some are missing.
    pub fn is_waiting(&self) -> bool {
        (!self.arrived.is_empty() || !self.sampling.is_empty()) && !self.missing.is_empty()
    }
}

/// A reusable barrier over a dynamic set of participants.
pub struct Barrier<A> {
    state: Mutex<State<A>>,
    released: Condvar,
}

impl<A: RoundAction> Barrier<A> {
    /// Create a barrier with no participants.
    pub fn new(action: A) -> Self {
        Barrier {
            state: Mutex::new(State {
                action,
                participants: BTreeMap::new(),
                pending_joins: BTreeSet::new(),
                pending_leaves: BTreeSet::new(),
                meeting: 0,
                samplers: BTreeSet::new(),
                round: 0,
                next_seq: 0,
                interrupt: None,
                wait_histograms: BTreeMap::new(),
            }),
            released: Condvar::new(),
        }
    }

    /// Completed rounds.
    pub fn round(&self) -> u64 {
        self.state.lock().round
    }

    /// Registered participants (excluding deferred joins).
    pub fn goal(&self) -> usize {
        self.state.lock().goal()
    }

    /// Run `f` with exclusive access to the round action.
    pub fn with_action<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        f(&mut self.state.lock().action)
    }

    /// Add a participant.
    ///
    /// Takes effect at once when nobody is parked, otherwise at the next
    /// round boundary. Registering a participant twice is a no-op.
    pub fn register(&self, participant: NodeId) {
        let mut state = self.state.lock();
        if state.pending_leaves.remove(&participant) {
            debug!(%participant, "deregistration cancelled");
            return;
        }
        if state.participants.contains_key(&participant) || state.pending_joins.contains(&participant)
        {
            return;
        }

        let histogram = metrics::histogram!(metric_defs::SYNC_WAIT.name, "node" => participant.to_string());
        state.wait_histograms.insert(participant, histogram);
        if state.in_round() {
            debug!(%participant, round = state.round, "registration deferred to round boundary");
            state.pending_joins.insert(participant);
        } else {
            debug!(%participant, round = state.round, "participant registered");
            state.participants.insert(participant, Presence::Running);
            metrics::gauge!(metric_defs::SYNC_PARTICIPANTS.name).set(state.goal() as f64);
        }
    }

    /// Remove a participant.
    ///
    /// A participant parked at the meet leaves at the round boundary. Any
    /// other participant leaves at once; if the round was only waiting for
    /// it, the calling thread completes the round.
    pub fn deregister(&self, participant: NodeId) -> Result<(), SyncError> {
        let mut state = self.state.lock();

        if state.pending_joins.remove(&participant) {
            state.wait_histograms.remove(&participant);
            debug!(%participant, "pending registration withdrawn");
            self.released.notify_all();
            return Ok(());
        }

        match state.participants.get(&participant).copied() {
            None => Err(SyncError::UnknownParticipant { participant }),
            Some(Presence::Meeting) => {
                debug!(%participant, round = state.round, "deregistration deferred to round boundary");
                state.pending_leaves.insert(participant);
                Ok(())
            }
            Some(presence) => {
                if let Presence::Sampling { time, seq } = presence {
                    state.samplers.remove(&(time, seq, participant));
                    self.released.notify_all();
                }
                state.participants.remove(&participant);
                state.wait_histograms.remove(&participant);
                debug!(%participant, round = state.round, goal = state.goal(), "participant deregistered");
                metrics::gauge!(metric_defs::SYNC_PARTICIPANTS.name).set(state.goal() as f64);

                if state.interrupt.is_some() {
                    return Ok(());
                }
                if state.meeting > 0 && state.meeting == state.goal() {
                    self.complete(&mut state).map(|_| ())
                } else {
                    self.release_sampler(&mut state);
                    Ok(())
                }
            }
        }
    }

    /// Park `participant` at the meet until the current round completes.
    ///
    /// A participant whose registration is still deferred first waits to be
    /// admitted, then arrives normally.
    pub fn arrive(&self, participant: NodeId) -> Result<Arrival, SyncError> {
        let started = Instant::now();
        let mut state = self.state.lock();

        while state.pending_joins.contains(&participant) {
            state.interrupted(participant)?;
            self.released.wait(&mut state);
        }
        state.interrupted(participant)?;

        match state.participants.get_mut(&participant) {
            None => return Err(SyncError::UnknownParticipant { participant }),
            Some(presence) => {
                debug_assert_eq!(*presence, Presence::Running, "{} arrived twice", participant);
                *presence = Presence::Meeting;
            }
        }
        state.meeting += 1;
        let wait = state.wait_histograms.get(&participant).cloned();

        let arrival = if state.meeting == state.goal() {
            Arrival::Advanced {
                round: self.complete(&mut state)?,
            }
        } else {
            self.release_sampler(&mut state);
            self.park(&mut state, participant)?
        };

        if let Some(wait) = wait {
            wait.record(started.elapsed().as_micros() as f64);
        }
        Ok(arrival)
    }

    /// Park `participant` in a channel wait at `time` until every other
    /// participant is parked at the meet or sampling at a later point.
    pub fn wait_for_neighbors(&self, participant: NodeId, time: u64) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        state.interrupted(participant)?;

        match state.participants.get(&participant).copied() {
            Some(Presence::Running) => {}
            None if state.pending_joins.contains(&participant) => return Ok(()),
            _ => return Err(SyncError::UnknownParticipant { participant }),
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let key = (time, seq, participant);
        state.samplers.insert(key);
        state
            .participants
            .insert(participant, Presence::Sampling { time, seq });
        self.release_sampler(&mut state);

        loop {
            if !state.samplers.contains(&key) {
                return Ok(());
            }
            if let Some(cause) = state.interrupt.clone() {
                state.samplers.remove(&key);
                if let Some(presence) = state.participants.get_mut(&participant) {
                    *presence = Presence::Running;
                }
                return Err(SyncError::Interrupted { participant, cause });
            }
            self.released.wait(&mut state);
        }
    }

    /// Interrupt every current and future wait with [`InterruptCause::Stopped`].
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.interrupt.is_none() {
            debug!(round = state.round, "barrier stopped");
            state.interrupt = Some(InterruptCause::Stopped);
        }
        self.released.notify_all();
    }

    /// True once [`stop`](Barrier::stop) was called or a round action failed.
    pub fn is_stopped(&self) -> bool {
        self.state.lock().interrupt.is_some()
    }

    pub fn snapshot(&self) -> BarrierSnapshot {
        let state = self.state.lock();
        let mut arrived = Vec::new();
        let mut sampling = Vec::new();
        let mut missing = Vec::new();
        for (&node, presence) in &state.participants {
            match presence {
                Presence::Meeting => arrived.push(node),
                Presence::Sampling { .. } => sampling.push(node),
                Presence::Running => missing.push(node),
            }
        }
        BarrierSnapshot {
            round: state.round,
            goal: state.goal(),
            arrived,
            sampling,
            missing,
            pending_joins: state.pending_joins.iter().copied().collect(),
            pending_leaves: state.pending_leaves.iter().copied().collect(),
            interrupted: state.interrupt.is_some(),
        }
    }

    /// Wait at the meet for the round to change.
    fn park(&self, state: &mut MutexGuard<'_, State<A>>, participant: NodeId) -> Result<Arrival, SyncError> {
        let round = state.round;
        loop {
            self.released.wait(state);

            if state.round != round {
                return Ok(if state.participants.contains_key(&participant) {
                    Arrival::Released { round: state.round }
                } else {
                    Arrival::Detached { round: state.round }
                });
            }
            if let Some(cause) = state.interrupt.clone() {
                if let Some(presence) = state.participants.get_mut(&participant) {
                    *presence = Presence::Running;
                }
                state.meeting -= 1;
                return Err(SyncError::Interrupted { participant, cause });
            }
        }
    }

    /// Complete the current round. Caller holds the lock and has checked
    /// that every participant is parked at the meet.
    fn complete(&self, state: &mut MutexGuard<'_, State<A>>) -> Result<u64, SyncError> {
        let round = state.round + 1;

        if let Err(err) = state.action.complete_round(round) {
            let reason = err.to_string();
            error!(round, %reason, "round action failed, aborting barrier");
            state.interrupt = Some(InterruptCause::Aborted {
                reason: reason.clone(),
            });
            self.released.notify_all();
            return Err(SyncError::ActionFailed { round, reason });
        }

        state.round = round;
        state.meeting = 0;
        for presence in state.participants.values_mut() {
            if *presence == Presence::Meeting {
                *presence = Presence::Running;
            }
        }

        let leaves = std::mem::take(&mut state.pending_leaves);
        for node in &leaves {
            state.participants.remove(node);
            state.wait_histograms.remove(node);
        }
        let joins = std::mem::take(&mut state.pending_joins);
        for node in &joins {
            state.participants.insert(*node, Presence::Running);
        }
        if !leaves.is_empty() || !joins.is_empty() {
            debug!(round, joined = joins.len(), left = leaves.len(), goal = state.goal(), "membership changed at round boundary");
            metrics::gauge!(metric_defs::SYNC_PARTICIPANTS.name).set(state.goal() as f64);
        }

        trace!(round, goal = state.goal(), "round complete");
        metrics::counter!(metric_defs::SYNC_ROUNDS.name).increment(1);

        self.release_sampler(state);
        self.released.notify_all();
        Ok(round)
    }

    /// Release the earliest sampler if nobody else can still move.
    fn release_sampler(&self, state: &mut MutexGuard<'_, State<A>>) {
        if state.samplers.is_empty() || state.meeting + state.samplers.len() != state.goal() {
            return;
        }
        if let Some((time, seq, node)) = state.samplers.pop_first() {
            trace!(%node, time, seq, "sampler released");
            if let Some(presence) = state.participants.get_mut(&node) {
                *presence = Presence::Running;
            }
            self.released.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn counting_barrier() -> (Arc<Barrier<impl RoundAction>>, Arc<AtomicU64>) {
        let count = Arc::new(AtomicU64::new(0));
        let inner = count.clone();
        let barrier = Arc::new(Barrier::new(move |_round: u64| -> Result<(), SimError> {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        (barrier, count)
    }

    /// Spin until `cond` holds on the snapshot, or panic after a few seconds.
    fn wait_until<A: RoundAction>(barrier: &Barrier<A>, cond: impl Fn(&BarrierSnapshot) -> bool) {
        for _ in 0..500 {
            if cond(&barrier.snapshot()) {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("condition not reached: {:?}", barrier.snapshot());
    }

    #[test]
    fn test_single_participant_advances_alone() {
        let (barrier, count) = counting_barrier();
        barrier.register(NodeId::new(1));

        assert_eq!(barrier.arrive(NodeId::new(1)), Ok(Arrival::Advanced { round: 1 }));
        assert_eq!(barrier.arrive(NodeId::new(1)), Ok(Arrival::Advanced { round: 2 }));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_participant() {
        let (barrier, _) = counting_barrier();
        assert_eq!(
            barrier.arrive(NodeId::new(9)),
            Err(SyncError::UnknownParticipant {
                participant: NodeId::new(9)
            })
        );
        assert!(barrier.deregister(NodeId::new(9)).is_err());
    }

    #[test]
    fn test_last_arrival_runs_action() {
        let (barrier, count) = counting_barrier();
        barrier.register(NodeId::new(1));
        barrier.register(NodeId::new(2));

        let b = barrier.clone();
        let waiter = thread::spawn(move || b.arrive(NodeId::new(1)));
        wait_until(&barrier, |s| s.arrived == vec![NodeId::new(1)]);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert_eq!(barrier.arrive(NodeId::new(2)), Ok(Arrival::Advanced { round: 1 }));
        assert_eq!(waiter.join().unwrap(), Ok(Arrival::Released { round: 1 }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deregister_running_completes_round() {
        let (barrier, count) = counting_barrier();
        for id in 1..=3 {
            barrier.register(NodeId::new(id));
        }

        let b = barrier.clone();
        let first = thread::spawn(move || b.arrive(NodeId::new(1)));
        let b = barrier.clone();
        let second = thread::spawn(move || b.arrive(NodeId::new(2)));
        wait_until(&barrier, |s| s.arrived.len() == 2);

        barrier.deregister(NodeId::new(3)).unwrap();
        assert_eq!(first.join().unwrap().map(Arrival::round), Ok(1));
        assert_eq!(second.join().unwrap().map(Arrival::round), Ok(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(barrier.goal(), 2);
    }

    #[test]
    fn test_deregister_sampler_withdraws_its_wait() {
        let (barrier, count) = counting_barrier();
        for id in 1..=3 {
            barrier.register(NodeId::new(id));
        }

        let b = barrier.clone();
        let parked = thread::spawn(move || b.arrive(NodeId::new(1)));
        wait_until(&barrier, |s| s.arrived.len() == 1);
        let b = barrier.clone();
        let sampler = thread::spawn(move || b.wait_for_neighbors(NodeId::new(2), 500));
        wait_until(&barrier, |s| s.sampling == vec![NodeId::new(2)]);

        barrier.deregister(NodeId::new(2)).unwrap();
        assert_eq!(sampler.join().unwrap(), Ok(()));
        let snapshot = barrier.snapshot();
        assert_eq!(snapshot.goal, 2);
        assert!(snapshot.sampling.is_empty());
        assert_eq!(snapshot.missing, vec![NodeId::new(3)]);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // the remaining running node can sample, then complete the round
        assert_eq!(barrier.wait_for_neighbors(NodeId::new(3), 100), Ok(()));
        assert_eq!(barrier.arrive(NodeId::new(3)), Ok(Arrival::Advanced { round: 1 }));
        assert_eq!(parked.join().unwrap(), Ok(Arrival::Released { round: 1 }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wait_histograms_follow_membership() {
        let (barrier, _) = counting_barrier();
        barrier.register(NodeId::new(1));
        barrier.register(NodeId::new(2));
        barrier.register(NodeId::new(2));
        assert_eq!(barrier.state.lock().wait_histograms.len(), 2);

        barrier.deregister(NodeId::new(2)).unwrap();
        let tracked: Vec<_> = barrier.state.lock().wait_histograms.keys().copied().collect();
        assert_eq!(tracked, vec![NodeId::new(1)]);
    }

    #[test]
    fn test_deregister_parked_is_deferred() {
        let (barrier, count) = counting_barrier();
        barrier.register(NodeId::new(1));
        barrier.register(NodeId::new(2));

        let b = barrier.clone();
        let leaver = thread::spawn(move || b.arrive(NodeId::new(1)));
        wait_until(&barrier, |s| s.arrived.len() == 1);

        barrier.deregister(NodeId::new(1)).unwrap();
        let snapshot = barrier.snapshot();
        assert_eq!(snapshot.goal, 2);
        assert_eq!(snapshot.pending_leaves, vec![NodeId::new(1)]);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert_eq!(barrier.arrive(NodeId::new(2)), Ok(Arrival::Advanced { round: 1 }));
        assert_eq!(leaver.join().unwrap(), Ok(Arrival::Detached { round: 1 }));
        assert_eq!(barrier.goal(), 1);
        assert_eq!(barrier.arrive(NodeId::new(2)), Ok(Arrival::Advanced { round: 2 }));
    }

    #[test]
    fn test_register_mid_round_is_deferred() {
        let (barrier, _) = counting_barrier();
        barrier.register(NodeId::new(1));
        barrier.register(NodeId::new(2));

        let b = barrier.clone();
        let parked = thread::spawn(move || b.arrive(NodeId::new(1)));
        wait_until(&barrier, |s| s.arrived.len() == 1);

        barrier.register(NodeId::new(3));
        assert_eq!(barrier.goal(), 2);

        // the newcomer waits to be admitted, then joins round 2
        let b = barrier.clone();
        let newcomer = thread::spawn(move || b.arrive(NodeId::new(3)));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(barrier.round(), 0);

        assert_eq!(barrier.arrive(NodeId::new(2)), Ok(Arrival::Advanced { round: 1 }));
        assert_eq!(parked.join().unwrap().map(Arrival::round), Ok(1));
        wait_until(&barrier, |s| s.goal == 3 && s.arrived == vec![NodeId::new(3)]);

        let b = barrier.clone();
        let again = thread::spawn(move || b.arrive(NodeId::new(1)));
        assert_eq!(barrier.arrive(NodeId::new(2)).map(Arrival::round), Ok(2));
        assert_eq!(newcomer.join().unwrap().map(Arrival::round), Ok(2));
        assert_eq!(again.join().unwrap().map(Arrival::round), Ok(2));
    }

    #[test]
    fn test_stop_interrupts_waiters() {
        let (barrier, count) = counting_barrier();
        barrier.register(NodeId::new(1));
        barrier.register(NodeId::new(2));

        let b = barrier.clone();
        let waiter = thread::spawn(move || b.arrive(NodeId::new(1)));
        wait_until(&barrier, |s| s.arrived.len() == 1);

        barrier.stop();
        assert_eq!(
            waiter.join().unwrap(),
            Err(SyncError::Interrupted {
                participant: NodeId::new(1),
                cause: InterruptCause::Stopped,
            })
        );
        assert!(barrier.arrive(NodeId::new(2)).is_err());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(barrier.snapshot().interrupted);
    }

    #[test]
    fn test_failed_action_aborts_waiters() {
        let barrier = Arc::new(Barrier::new(|_round: u64| -> Result<(), SimError> {
            Err(SimError::Config("global event failed".to_string()))
        }));
        barrier.register(NodeId::new(1));
        barrier.register(NodeId::new(2));

        let b = barrier.clone();
        let waiter = thread::spawn(move || b.arrive(NodeId::new(1)));
        wait_until(&barrier, |s| s.arrived.len() == 1);

        let err = barrier.arrive(NodeId::new(2)).unwrap_err();
        assert!(matches!(err, SyncError::ActionFailed { round: 1, .. }));
        assert!(matches!(
            waiter.join().unwrap(),
            Err(SyncError::Interrupted {
                cause: InterruptCause::Aborted { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_sampler_released_when_others_parked() {
        let (barrier, count) = counting_barrier();
        barrier.register(NodeId::new(1));
        barrier.register(NodeId::new(2));

        let b = barrier.clone();
        let sampler = thread::spawn(move || b.wait_for_neighbors(NodeId::new(1), 50));
        wait_until(&barrier, |s| s.sampling == vec![NodeId::new(1)]);

        // node 2 parks at the meet, which frees the sampler
        let b = barrier.clone();
        let meeter = thread::spawn(move || b.arrive(NodeId::new(2)));
        assert_eq!(sampler.join().unwrap(), Ok(()));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert_eq!(barrier.arrive(NodeId::new(1)), Ok(Arrival::Advanced { round: 1 }));
        assert_eq!(meeter.join().unwrap(), Ok(Arrival::Released { round: 1 }));
    }

    #[test]
    fn test_earliest_sampler_goes_first() {
        let (barrier, _) = counting_barrier();
        for id in 1..=3 {
            barrier.register(NodeId::new(id));
        }

        let b = barrier.clone();
        let late = thread::spawn(move || b.wait_for_neighbors(NodeId::new(1), 90));
        wait_until(&barrier, |s| s.sampling.len() == 1);
        let b = barrier.clone();
        let early = thread::spawn(move || b.wait_for_neighbors(NodeId::new(2), 10));
        wait_until(&barrier, |s| s.sampling.len() == 2);

        // node 3 sampling completes the set; node 2 (time 10) is released
        let b = barrier.clone();
        let third = thread::spawn(move || b.wait_for_neighbors(NodeId::new(3), 40));
        assert_eq!(early.join().unwrap(), Ok(()));
        let snapshot = barrier.snapshot();
        assert_eq!(snapshot.sampling, vec![NodeId::new(1), NodeId::new(3)]);
        assert_eq!(snapshot.missing, vec![NodeId::new(2)]);

        // node 2 reaches the meet: node 3 (time 40) goes next, then node 1
        let b = barrier.clone();
        let meet = thread::spawn(move || b.arrive(NodeId::new(2)));
        assert_eq!(third.join().unwrap(), Ok(()));
        assert!(!late.is_finished());

        let b = barrier.clone();
        let meet3 = thread::spawn(move || b.arrive(NodeId::new(3)));
        assert_eq!(late.join().unwrap(), Ok(()));
        assert_eq!(barrier.arrive(NodeId::new(1)).map(Arrival::round), Ok(1));
        assert!(meet.join().unwrap().is_ok());
        assert!(meet3.join().unwrap().is_ok());
    }
}
