//! Stall detection for node rendezvous.
//!
//! The watchdog runs on a background thread and periodically samples the
//! synchronizer's snapshot. If no round completes within the timeout while
//! some nodes are parked, it logs which nodes the round is waiting for. It
//! only reports; it never releases or times out a wait.

use avsim_common::NodeId;
use avsim_sync::{BarrierSnapshot, Synchronizer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Shared state between the session and the watchdog thread.
pub struct WatchdogState {
    /// Flag to signal the watchdog thread to stop.
    stop_flag: AtomicBool,
    /// Count of stall alerts fired.
    alert_count: AtomicU64,
    /// Node names for alerts.
    names: HashMap<NodeId, String>,
}

impl WatchdogState {
    pub fn new(names: HashMap<NodeId, String>) -> Self {
        WatchdogState {
            stop_flag: AtomicBool::new(false),
            alert_count: AtomicU64::new(0),
            names,
        }
    }

    /// Signal the watchdog to stop.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    pub fn should_stop(&self) -> bool {
        self.stop_flag.load(Ordering::Relaxed)
    }

    pub fn alert_count(&self) -> u64 {
        self.alert_count.load(Ordering::Relaxed)
    }

    fn increment_alert_count(&self) -> u64 {
        self.alert_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Display name of a node, falling back to its id.
    pub fn node_name(&self, node: NodeId) -> String {
        self.names
            .get(&node)
            .cloned()
            .unwrap_or_else(|| node.to_string())
    }

    fn names_of(&self, nodes: &[NodeId]) -> Vec<String> {
        nodes.iter().map(|&n| self.node_name(n)).collect()
    }

    fn alert(&self, snapshot: &BarrierSnapshot, stalled_for: Duration) {
        let alert = self.increment_alert_count();
        warn!(
            alert,
            round = snapshot.round,
            stalled_secs = stalled_for.as_secs_f64(),
            missing = ?self.names_of(&snapshot.missing),
            arrived = ?self.names_of(&snapshot.arrived),
            sampling = ?self.names_of(&snapshot.sampling),
            "rendezvous stalled: nodes have not arrived"
        );
    }
}

/// Watchdog thread handle.
pub struct Watchdog {
    state: Arc<WatchdogState>,
    thread_handle: Option<JoinHandle<()>>,
    timeout: Duration,
}

impl Watchdog {
    /// Start watching `sync`. Alerts fire at most once per stalled round.
    pub fn new(
        sync: Arc<dyn Synchronizer>,
        names: HashMap<NodeId, String>,
        timeout: Duration,
    ) -> std::io::Result<Self> {
        let state = Arc::new(WatchdogState::new(names));
        let watchdog_state = Arc::clone(&state);
        let check_interval = (timeout / 4).clamp(Duration::from_millis(1), Duration::from_millis(500));

        let thread_handle = thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || {
                let mut last_round = sync.snapshot().round;
                let mut last_progress = Instant::now();
                let mut alerted_round: Option<u64> = None;

                while !watchdog_state.should_stop() {
                    thread::sleep(check_interval);

                    let snapshot = sync.snapshot();
                    if snapshot.interrupted {
                        debug!("synchronizer interrupted, watchdog exiting");
                        break;
                    }
                    if snapshot.round != last_round {
                        last_round = snapshot.round;
                        last_progress = Instant::now();
                        continue;
                    }

                    let stalled_for = last_progress.elapsed();
                    if stalled_for >= timeout
                        && snapshot.is_waiting()
                        && alerted_round != Some(snapshot.round)
                    {
                        alerted_round = Some(snapshot.round);
                        watchdog_state.alert(&snapshot, stalled_for);
                    }
                }
            })?;

        Ok(Watchdog {
            state,
            thread_handle: Some(thread_handle),
            timeout,
        })
    }

    pub fn state(&self) -> &Arc<WatchdogState> {
        &self.state
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Stop the watchdog thread and wait for it to finish.
    pub fn stop(mut self) {
        self.state.stop();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.state.stop();
        // the thread notices the flag on its next check
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avsim_clock::MainClock;
    use avsim_common::ClockRate;
    use avsim_sync::GlobalQueue;

    fn wait_for(cond: impl Fn() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_node_name_fallback() {
        let state = WatchdogState::new(HashMap::from([(NodeId::new(1), "alpha".to_string())]));
        assert_eq!(state.node_name(NodeId::new(1)), "alpha");
        assert_eq!(state.node_name(NodeId::new(2)), "node:2");
    }

    #[test]
    fn test_alerts_once_on_stalled_round() {
        let queue = Arc::new(GlobalQueue::new(100, ClockRate::MICA2));
        let mut a = MainClock::new("a", ClockRate::MICA2);
        let mut b = MainClock::new("b", ClockRate::MICA2);
        queue.add_participant(NodeId::new(1), &mut a).unwrap();
        queue.add_participant(NodeId::new(2), &mut b).unwrap();

        let names = HashMap::from([
            (NodeId::new(1), "a".to_string()),
            (NodeId::new(2), "b".to_string()),
        ]);
        let watchdog = Watchdog::new(queue.clone(), names, Duration::from_millis(20)).unwrap();

        // a parks at the first meet; b never arrives
        let parked = thread::spawn(move || a.advance(100));
        wait_for(|| watchdog.state().alert_count() > 0);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(watchdog.state().alert_count(), 1);

        watchdog.stop();
        queue.stop();
        assert!(parked.join().unwrap().is_err());
    }

    #[test]
    fn test_quiet_when_nobody_waits() {
        let queue = Arc::new(GlobalQueue::new(100, ClockRate::MICA2));
        let watchdog = Watchdog::new(queue, HashMap::new(), Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(60));
        assert_eq!(watchdog.state().alert_count(), 0);
        watchdog.stop();
    }
}
