//! One simulation run.
//!
//! A [`Session`] owns everything shared by the node threads of a run: the
//! synchronizer (a [`GlobalQueue`] or, for a single node, a
//! [`SingleSynchronizer`]) and the radio channel. Nothing is process-wide,
//! so several sessions can run side by side.

use crate::node_thread::{spawn_node_thread, NodeReport, NodeStats, NodeThread, NodeThreadConfig};
use crate::program::program_for;
use crate::watchdog::Watchdog;
use avsim_clock::MainClock;
use avsim_common::{Cycles, InterruptCause, NodeId, SimError, SyncError};
use avsim_model::{ModelError, SimulationModel};
use avsim_radio::{FreeSpaceAir, RadioAir};
use avsim_sync::{GlobalEvents, GlobalHandler, GlobalQueue, SingleSynchronizer, Synchronizer};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("failed to register node: {0}")]
    Setup(#[from] SyncError),

    #[error("node {node} failed: {source}")]
    Node {
        node: String,
        #[source]
        source: SimError,
    },

    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("node thread {node} panicked: {message}")]
    Panicked { node: String, message: String },
}

/// Host-side knobs that are not part of the model.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Warn when no rendezvous completes for this long.
    pub watchdog: Option<Duration>,
    /// Log progress every this many rounds.
    pub progress_every: Option<u64>,
}

/// Outcome of a completed session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// Rendezvous rounds completed (global ticks).
    pub rounds: u64,
    pub global_events: u64,
    pub sync_period: Cycles,
    pub reference_hz: u64,
    /// Requested run length in reference cycles.
    pub cycles: Cycles,
    pub seed: u64,
    /// True if the run was stopped from outside before every node finished.
    pub stopped: bool,
    pub wall_seconds: f64,
    pub nodes: Vec<NodeStats>,
}

impl SessionReport {
    /// Simulated seconds per wall-clock second.
    pub fn speed(&self) -> f64 {
        let simulated = self.cycles as f64 / self.reference_hz as f64;
        if self.wall_seconds > 0.0 {
            simulated / self.wall_seconds
        } else {
            0.0
        }
    }
}

/// Stops a running session from another thread, e.g. a Ctrl-C handler.
#[derive(Clone)]
pub struct StopHandle {
    sync: Arc<dyn Synchronizer>,
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    /// Interrupt every node. The session then returns a partial report.
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.sync.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// A simulation run built from a model.
pub struct Session {
    model: SimulationModel,
    options: SessionOptions,
    sync: Arc<dyn Synchronizer>,
    queue: Option<Arc<GlobalQueue>>,
    air: Arc<FreeSpaceAir>,
    stop_requested: Arc<AtomicBool>,
}

impl Session {
    pub fn new(model: SimulationModel, options: SessionOptions) -> Result<Self, SessionError> {
        model.validate()?;
        let sim = &model.simulation;

        let queue = (model.nodes.len() > 1)
            .then(|| Arc::new(GlobalQueue::new(sim.sync_period, sim.reference)));
        let sync: Arc<dyn Synchronizer> = match &queue {
            Some(queue) => queue.clone(),
            None => Arc::new(SingleSynchronizer::new(sim.reference)),
        };
        let air = Arc::new(FreeSpaceAir::new(sync.clone()));

        Ok(Session {
            model,
            options,
            sync,
            queue,
            air,
            stop_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn model(&self) -> &SimulationModel {
        &self.model
    }

    /// The global queue of a multi-node session, for scheduling global events.
    pub fn global_queue(&self) -> Option<&Arc<GlobalQueue>> {
        self.queue.as_ref()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            sync: self.sync.clone(),
            requested: self.stop_requested.clone(),
        }
    }

    /// Run every node to the end of the simulation.
    ///
    /// All nodes are registered before any thread starts. The first fatal
    /// node error stops the synchronizer, which interrupts the others; the
    /// session still joins every thread before returning.
    pub fn run(self) -> Result<SessionReport, SessionError> {
        let sim = &self.model.simulation;
        let delays = self.model.start_delays();

        let mut nodes = Vec::with_capacity(self.model.nodes.len());
        let mut names = HashMap::new();
        for (index, (node_model, delay)) in self.model.nodes.iter().zip(delays).enumerate() {
            let node = NodeId::new(index as u32);
            let rate = node_model.clock;
            let mut clock = MainClock::new(node_model.name.clone(), rate);
            self.sync.register(node, &mut clock)?;
            self.air.add_radio(node, node_model.position, node_model.radio);
            names.insert(node, node_model.name.clone());

            let config = NodeThreadConfig {
                index,
                node,
                name: node_model.name.clone(),
                limit: sim.reference.scale(sim.cycles, rate),
                start_delay: sim.reference.scale(delay, rate),
            };
            debug!(
                node = %node_model.name,
                program = node_model.program.kind(),
                limit = config.limit,
                start_delay = config.start_delay,
                "node prepared"
            );
            nodes.push(NodeThread::new(
                config,
                clock,
                program_for(&node_model.program),
                self.sync.clone(),
                self.air.clone(),
            ));
        }

        if let (Some(queue), Some(every)) = (&self.queue, self.options.progress_every) {
            let total = sim.cycles / sim.sync_period;
            if every > 0 && every <= total {
                queue.schedule_global_event(every, progress_report(every, total));
            }
        }

        let watchdog = match self.options.watchdog {
            Some(timeout) => Some(Watchdog::new(self.sync.clone(), names, timeout)?),
            None => None,
        };

        info!(
            nodes = nodes.len(),
            cycles = sim.cycles,
            period = sim.sync_period,
            "session starting"
        );
        let started = Instant::now();
        let node_count = nodes.len();
        let (report_tx, report_rx) = crossbeam_channel::unbounded();
        let mut handles = Vec::with_capacity(node_count);
        let mut spawn_error = None;
        for node in nodes {
            match spawn_node_thread(node, report_tx.clone()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!(error = %e, "failed to spawn node thread, stopping the session");
                    self.sync.stop();
                    spawn_error = Some(e);
                    break;
                }
            }
        }
        drop(report_tx);

        let mut stats: Vec<Option<NodeStats>> = vec![None; node_count];
        let mut faults: Vec<(String, SimError)> = Vec::new();
        let mut panicked = None;
        for (index, report) in report_rx.iter() {
            match report {
                NodeReport::Finished(node_stats) => stats[index] = Some(node_stats),
                NodeReport::Failed {
                    stats: node_stats,
                    error,
                } => {
                    if !is_stop_request(&error) {
                        if faults.is_empty() {
                            error!(node = %node_stats.name, %error, "node failed, stopping the session");
                            self.sync.stop();
                        }
                        faults.push((node_stats.name.clone(), error));
                    }
                    stats[index] = Some(node_stats);
                }
                NodeReport::Panicked { name, message } => {
                    panicked.get_or_insert((name, message));
                }
            }
        }

        for handle in handles {
            let name = handle.name().to_string();
            if handle.join().is_err() {
                warn!(node = %name, "node thread exited abnormally");
            }
        }
        if let Some(watchdog) = watchdog {
            watchdog.stop();
        }

        if let Some(e) = spawn_error {
            return Err(SessionError::Spawn(e));
        }
        if let Some((node, message)) = panicked {
            return Err(SessionError::Panicked { node, message });
        }
        if let Some((node, source)) = root_fault(faults) {
            return Err(SessionError::Node { node, source });
        }

        let report = SessionReport {
            rounds: self.sync.global_time(),
            global_events: self.queue.as_ref().map_or(0, |q| q.global_events_fired()),
            sync_period: sim.sync_period,
            reference_hz: sim.reference.hz(),
            cycles: sim.cycles,
            seed: sim.seed,
            stopped: self.stop_requested.load(Ordering::SeqCst),
            wall_seconds: started.elapsed().as_secs_f64(),
            nodes: stats.into_iter().flatten().collect(),
        };
        info!(
            rounds = report.rounds,
            wall_seconds = report.wall_seconds,
            stopped = report.stopped,
            "session finished"
        );
        Ok(report)
    }
}

/// True for the interruption every node sees once the session is stopped.
fn is_stop_request(error: &SimError) -> bool {
    matches!(
        error,
        SimError::Sync(SyncError::Interrupted {
            cause: InterruptCause::Stopped,
            ..
        })
    )
}

/// The failure that caused the others: prefer one that is not itself an
/// interruption.
fn root_fault(faults: Vec<(String, SimError)>) -> Option<(String, SimError)> {
    let root = faults
        .iter()
        .position(|(_, e)| !matches!(e, SimError::Sync(SyncError::Interrupted { .. })))
        .unwrap_or(0);
    faults.into_iter().nth(root)
}

/// Global event logging progress every `every` rounds, re-arming itself
/// until `total` rounds.
fn progress_report(every: u64, total: u64) -> GlobalHandler {
    Box::new(move |events: &mut GlobalEvents| {
        let round = events.now();
        info!(round, total, "progress: {:.0}%", round as f64 * 100.0 / total as f64);
        if round + every <= total {
            events.schedule(every, progress_report(every, total));
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_request_is_not_a_fault() {
        let stopped: SimError = SyncError::Interrupted {
            participant: NodeId::new(1),
            cause: InterruptCause::Stopped,
        }
        .into();
        assert!(is_stop_request(&stopped));

        let aborted: SimError = SyncError::Interrupted {
            participant: NodeId::new(1),
            cause: InterruptCause::Aborted {
                reason: "boom".to_string(),
            },
        }
        .into();
        assert!(!is_stop_request(&aborted));
    }

    #[test]
    fn test_root_fault_prefers_cause_over_interruption() {
        let faults = vec![
            (
                "a".to_string(),
                SimError::from(SyncError::Interrupted {
                    participant: NodeId::new(0),
                    cause: InterruptCause::Aborted {
                        reason: "x".to_string(),
                    },
                }),
            ),
            (
                "b".to_string(),
                SimError::from(SyncError::ActionFailed {
                    round: 3,
                    reason: "x".to_string(),
                }),
            ),
        ];
        let (node, error) = root_fault(faults).unwrap();
        assert_eq!(node, "b");
        assert!(matches!(error, SimError::Sync(SyncError::ActionFailed { round: 3, .. })));
        assert!(root_fault(Vec::new()).is_none());
    }
}
