//! Multi-threaded rendezvous tests.
//!
//! Every test spawns one OS thread per node, each owning its `MainClock`,
//! exactly as the runner does. Random work chunks and arrival delays come
//! from seeded ChaCha generators so failures reproduce.

use avsim_clock::MainClock;
use avsim_common::{ClockRate, Cycles, NodeId, SimError};
use avsim_sync::{Arrival, Barrier, GlobalQueue, Synchronizer};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

/// Register a clock per node, then run each on its own thread for its
/// `cycles`, advancing in random chunks, and deregister at the end.
fn run_nodes(queue: &Arc<GlobalQueue>, nodes: Vec<(NodeId, ClockRate, Cycles)>, seed: u64) -> Vec<MainClock> {
    let mut clocks = Vec::new();
    for (node, rate, cycles) in nodes {
        let mut clock = MainClock::new(node.to_string(), rate);
        queue.add_participant(node, &mut clock).unwrap();
        clocks.push((node, clock, cycles));
    }

    let handles: Vec<_> = clocks
        .into_iter()
        .map(|(node, mut clock, cycles)| {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(seed ^ node.get() as u64);
                while clock.count() < cycles {
                    let chunk = rng.gen_range(1..=37).min(cycles - clock.count());
                    clock.advance(chunk).unwrap();
                }
                queue.remove_participant(node, &mut clock).unwrap();
                clock
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_two_node_scenario() {
    let queue = Arc::new(GlobalQueue::new(100, ClockRate::MICA2));
    let fired = Arc::new(AtomicBool::new(false));
    let fired_at = Arc::new(AtomicU64::new(0));

    {
        let fired = fired.clone();
        let fired_at = fired_at.clone();
        queue.schedule_global_event(2, move |events| {
            fired_at.store(events.now(), Ordering::SeqCst);
            fired.store(true, Ordering::SeqCst);
            Ok(())
        });
    }

    // node A checks the flag between rendezvous points
    let observed = Arc::new(Mutex::new(Vec::new()));
    let mut a = MainClock::new("a", ClockRate::MICA2);
    for at in [150u64, 250] {
        let fired = fired.clone();
        let observed = observed.clone();
        a.schedule(at, move |clock| {
            observed
                .lock()
                .unwrap()
                .push((clock.count(), fired.load(Ordering::SeqCst)));
            Ok(())
        });
    }
    let mut b = MainClock::new("b", ClockRate::MICA2);
    queue.add_participant(NodeId::new(1), &mut a).unwrap();
    queue.add_participant(NodeId::new(2), &mut b).unwrap();

    let handles: Vec<_> = [(NodeId::new(1), a), (NodeId::new(2), b)]
        .into_iter()
        .map(|(node, mut clock)| {
            let queue = queue.clone();
            thread::spawn(move || {
                clock.advance(300)?;
                queue.remove_participant(node, &mut clock)?;
                Ok::<_, SimError>(clock.count())
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), 300);
    }
    assert_eq!(queue.global_time(), 3);
    assert_eq!(fired_at.load(Ordering::SeqCst), 2);
    assert_eq!(*observed.lock().unwrap(), vec![(150, false), (250, true)]);
}

#[test]
fn test_liveness_many_nodes() {
    const NODES: u32 = 8;
    const ROUNDS: u64 = 50;
    const PERIOD: Cycles = 64;

    let queue = Arc::new(GlobalQueue::new(PERIOD, ClockRate::MICA2));
    let nodes = (1..=NODES)
        .map(|id| (NodeId::new(id), ClockRate::MICA2, ROUNDS * PERIOD))
        .collect();

    let clocks = run_nodes(&queue, nodes, 0x5eed);
    assert_eq!(queue.global_time(), ROUNDS);
    assert_eq!(queue.participants(), 0);
    for clock in clocks {
        assert_eq!(clock.count(), ROUNDS * PERIOD);
        assert_eq!(clock.pending_events(), 0);
    }
}

#[test]
fn test_heterogeneous_rates_meet_in_reference_time() {
    let reference = ClockRate::new(8_000_000).unwrap();
    let slow = ClockRate::new(4_000_000).unwrap();
    let queue = Arc::new(GlobalQueue::new(100, reference));
    assert_eq!(queue.local_period(slow), 50);

    let nodes = vec![
        (NodeId::new(1), reference, 500),
        (NodeId::new(2), slow, 250),
    ];
    run_nodes(&queue, nodes, 7);
    assert_eq!(queue.global_time(), 5);
}

#[test]
fn test_early_leaver_does_not_stall_others() {
    let queue = Arc::new(GlobalQueue::new(100, ClockRate::MICA2));
    let nodes = vec![
        (NodeId::new(1), ClockRate::MICA2, 100),
        (NodeId::new(2), ClockRate::MICA2, 1000),
        (NodeId::new(3), ClockRate::MICA2, 450),
    ];
    run_nodes(&queue, nodes, 11);
    assert_eq!(queue.global_time(), 10);
}

#[test]
fn test_action_runs_exactly_once_per_round() {
    const NODES: u32 = 6;
    const ROUNDS: u64 = 40;

    let rounds_seen = Arc::new(Mutex::new(Vec::new()));
    let sink = rounds_seen.clone();
    let barrier = Arc::new(Barrier::new(move |round: u64| -> Result<(), SimError> {
        sink.lock().unwrap().push(round);
        Ok(())
    }));
    for id in 0..NODES {
        barrier.register(NodeId::new(id));
    }

    let handles: Vec<_> = (0..NODES)
        .map(|id| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(1000 + id as u64);
                let mut advanced = 0;
                for expected in 1..=ROUNDS {
                    thread::sleep(Duration::from_micros(rng.gen_range(0..300)));
                    let arrival = barrier.arrive(NodeId::new(id)).unwrap();
                    assert_eq!(arrival.round(), expected);
                    if matches!(arrival, Arrival::Advanced { .. }) {
                        advanced += 1;
                    }
                }
                advanced
            })
        })
        .collect();

    let advanced: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(advanced, ROUNDS);
    assert_eq!(*rounds_seen.lock().unwrap(), (1..=ROUNDS).collect::<Vec<_>>());
}

#[test]
fn test_channel_waits_do_not_deadlock() {
    const PERIOD: Cycles = 100;
    let queue = Arc::new(GlobalQueue::new(PERIOD, ClockRate::MICA2));

    let mut clocks = Vec::new();
    for id in 1..=3 {
        let node = NodeId::new(id);
        let mut clock = MainClock::new(node.to_string(), ClockRate::MICA2);
        queue.add_participant(node, &mut clock).unwrap();
        clocks.push((node, clock));
    }

    let handles: Vec<_> = clocks
        .into_iter()
        .map(|(node, mut clock)| {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(node.get() as u64);
                while clock.count() < 10 * PERIOD {
                    clock.advance(rng.gen_range(1..=30).min(10 * PERIOD - clock.count()))?;
                    if rng.gen_bool(0.5) {
                        queue.wait_for_neighbors(node, clock.count())?;
                    }
                }
                queue.remove_participant(node, &mut clock)?;
                Ok::<_, SimError>(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(queue.global_time(), 10);
}

#[test]
fn test_stop_interrupts_parked_nodes() {
    let queue = Arc::new(GlobalQueue::new(100, ClockRate::MICA2));
    let mut a = MainClock::new("a", ClockRate::MICA2);
    let mut b = MainClock::new("b", ClockRate::MICA2);
    queue.add_participant(NodeId::new(1), &mut a).unwrap();
    queue.add_participant(NodeId::new(2), &mut b).unwrap();

    let q = queue.clone();
    let parked = thread::spawn(move || a.advance(100));

    for _ in 0..500 {
        if queue.snapshot().arrived == vec![NodeId::new(1)] {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    q.stop();

    let err = parked.join().unwrap().unwrap_err();
    assert!(err.is_sync_fault());
    assert_eq!(queue.global_time(), 0);
    assert!(b.advance(100).is_err());
}
