//! Per-node threads.
//!
//! Each simulated node runs on its own OS thread, owning its [`MainClock`]
//! and [`Program`]. Threads never exchange messages with each other: they
//! free-run between rendezvous points armed on their clocks by the
//! session's [`Synchronizer`], and touch shared state only through the
//! radio channel, which waits on the same synchronizer.
//!
//! ## Key Types
//!
//! - [`NodeThread`]: a node's clock, program and run limits
//! - [`NodeReport`]: the single report a thread sends when it exits
//! - [`NodeThreadHandle`]: join handle kept by the session

use crate::program::{NodeContext, Program, ProgramStats};
use avsim_clock::MainClock;
use avsim_common::{Cycles, NodeId, SimError};
use avsim_metrics::{metric_defs, MetricLabels};
use avsim_radio::RadioAir;
use avsim_sync::Synchronizer;
use crossbeam_channel::Sender;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info_span, warn};

// ============================================================================
// Node Reports (Node → Session)
// ============================================================================

/// What a node did during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub node: NodeId,
    pub name: String,
    pub program: &'static str,
    pub clock_hz: u64,
    /// Local cycles executed, including the start delay.
    pub cycles: Cycles,
    /// `cycles` in reference cycles.
    pub global_cycles: Cycles,
    /// Clock events fired, rendezvous timers included.
    pub events_fired: u64,
    pub radio: ProgramStats,
    /// Why the node stopped early, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Report sent by a node thread when it exits. Every thread sends exactly one.
#[derive(Debug)]
pub enum NodeReport {
    /// The node reached the end of the run.
    Finished(NodeStats),

    /// The node stopped on an error.
    Failed { stats: NodeStats, error: SimError },

    /// The node's thread panicked. The synchronizer has been stopped.
    Panicked { name: String, message: String },
}

// ============================================================================
// Node Thread
// ============================================================================

/// Run parameters of one node thread.
#[derive(Debug, Clone)]
pub struct NodeThreadConfig {
    /// Position of the node in the model; reports are keyed by it.
    pub index: usize,
    pub node: NodeId,
    pub name: String,
    /// Local cycle count at which the node stops.
    pub limit: Cycles,
    /// Local cycles slept before the program's first step.
    pub start_delay: Cycles,
}

/// A node ready to run on its own thread.
///
/// The clock must already be registered with `sync` and the radio attached
/// to `air`; the thread deregisters both when it exits.
pub struct NodeThread {
    config: NodeThreadConfig,
    clock: MainClock,
    program: Box<dyn Program>,
    sync: Arc<dyn Synchronizer>,
    air: Arc<dyn RadioAir>,
}

impl NodeThread {
    pub fn new(
        config: NodeThreadConfig,
        clock: MainClock,
        program: Box<dyn Program>,
        sync: Arc<dyn Synchronizer>,
        air: Arc<dyn RadioAir>,
    ) -> Self {
        Self {
            config,
            clock,
            program,
            sync,
            air,
        }
    }

    pub fn config(&self) -> &NodeThreadConfig {
        &self.config
    }

    /// Sleep through the start delay, then step the program until the clock
    /// reaches the limit.
    pub fn run(&mut self) -> Result<(), SimError> {
        let limit = self.config.limit;
        self.clock.advance(self.config.start_delay.min(limit))?;

        while self.clock.count() < limit {
            let consumed = {
                let mut ctx = NodeContext::new(
                    self.config.node,
                    &self.clock,
                    self.sync.as_ref(),
                    self.air.as_ref(),
                );
                self.program.step(&mut ctx)?
            };
            let remaining = limit - self.clock.count();
            self.clock.advance(consumed.clamp(1, remaining))?;
        }
        Ok(())
    }

    /// Leave the synchronizer and the air, record metrics, and turn the
    /// outcome of [`run`](Self::run) into a report.
    pub fn finish(mut self, outcome: Result<(), SimError>) -> NodeReport {
        let node = self.config.node;
        let mut outcome = outcome;

        if let Err(e) = self.sync.deregister(node, &mut self.clock) {
            match outcome {
                Ok(()) => outcome = Err(e.into()),
                Err(_) => debug!(%node, error = %e, "deregistration after failure"),
            }
        }
        self.air.remove_radio(node);

        let labels = MetricLabels::new(self.config.name.as_str(), self.program.kind()).to_labels();
        metrics::counter!(metric_defs::CLOCK_CYCLES.name, &labels).increment(self.clock.count());
        metrics::counter!(metric_defs::CLOCK_EVENTS_FIRED.name, &labels)
            .increment(self.clock.events_fired());

        let mut stats = self.stats();
        match outcome {
            Ok(()) => {
                debug!(%node, cycles = stats.cycles, "node finished");
                NodeReport::Finished(stats)
            }
            Err(error) => {
                stats.error = Some(error.to_string());
                NodeReport::Failed { stats, error }
            }
        }
    }

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            node: self.config.node,
            name: self.config.name.clone(),
            program: self.program.kind(),
            clock_hz: self.clock.rate().hz(),
            cycles: self.clock.count(),
            global_cycles: self.sync.to_global(self.clock.count(), self.clock.rate()),
            events_fired: self.clock.events_fired(),
            radio: self.program.stats(),
            error: None,
        }
    }
}

// ============================================================================
// Node Thread Handle
// ============================================================================

/// Handle to a spawned node thread.
pub struct NodeThreadHandle {
    name: String,
    thread: JoinHandle<()>,
}

impl NodeThreadHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the thread to exit.
    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

/// Spawn `node` on a thread named `node-{name}`. Its report is sent on
/// `report_tx` tagged with the node's index.
pub fn spawn_node_thread(
    node: NodeThread,
    report_tx: Sender<(usize, NodeReport)>,
) -> std::io::Result<NodeThreadHandle> {
    let name = node.config.name.clone();
    let thread = thread::Builder::new()
        .name(format!("node-{}", name))
        .spawn(move || node_thread_main(node, report_tx))?;

    Ok(NodeThreadHandle { name, thread })
}

fn node_thread_main(mut node: NodeThread, report_tx: Sender<(usize, NodeReport)>) {
    let index = node.config.index;
    let name = node.config.name.clone();
    let sync = node.sync.clone();
    let span = info_span!("node", name = %name, id = %node.config.node);
    let _enter = span.enter();

    let report = match panic::catch_unwind(AssertUnwindSafe(move || {
        let outcome = node.run();
        node.finish(outcome)
    })) {
        Ok(report) => report,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(node = %name, panic = %message, "node thread panicked, stopping the session");
            sync.stop();
            NodeReport::Panicked { name, message }
        }
    };

    if report_tx.send((index, report)).is_err() {
        warn!("session stopped listening before the node reported");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
