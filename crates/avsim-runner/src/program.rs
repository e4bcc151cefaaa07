//! Node workloads.
//!
//! A [`Program`] stands where an instruction interpreter would: each step
//! does some work against the radio and reports how many cycles it took.
//! The node loop feeds those cycles to the node's clock, which is where
//! rendezvous with the other nodes happen.

use avsim_clock::MainClock;
use avsim_common::{Cycles, NodeId, SimError};
use avsim_model::ProgramModel;
use avsim_radio::{RadioAir, RSSI_BUSY};
use avsim_sync::Synchronizer;
use serde::Serialize;

/// Radio activity of one program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgramStats {
    /// Bytes put on the air.
    pub transmitted: u64,
    /// RSSI samples taken.
    pub samples: u64,
    /// Samples that found the channel busy.
    pub busy_samples: u64,
    /// Bytes recovered from the channel.
    pub received: u64,
    /// Most recent byte recovered.
    pub last_byte: Option<u8>,
}

/// What a program can see and touch while stepping.
pub struct NodeContext<'a> {
    node: NodeId,
    clock: &'a MainClock,
    sync: &'a dyn Synchronizer,
    air: &'a dyn RadioAir,
}

impl<'a> NodeContext<'a> {
    pub fn new(
        node: NodeId,
        clock: &'a MainClock,
        sync: &'a dyn Synchronizer,
        air: &'a dyn RadioAir,
    ) -> Self {
        NodeContext {
            node,
            clock,
            sync,
            air,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Local cycle count.
    pub fn now(&self) -> Cycles {
        self.clock.count()
    }

    /// Current time in reference cycles, the timebase of the channel.
    pub fn global_now(&self) -> Cycles {
        self.sync.to_global(self.clock.count(), self.clock.rate())
    }

    pub fn transmit(&self, data: u8) -> Result<(), SimError> {
        Ok(self.air.write_channel(self.node, data, self.global_now())?)
    }

    pub fn sample(&self) -> Result<u16, SimError> {
        Ok(self.air.sample_channel(self.node, self.global_now())?)
    }

    pub fn read(&self) -> Result<Option<u8>, SimError> {
        Ok(self.air.read_channel(self.node, self.global_now())?)
    }
}

/// A workload driven by a node thread.
pub trait Program: Send {
    /// Short name for logs and metric labels.
    fn kind(&self) -> &'static str;

    /// Do one unit of work and return the local cycles it consumed.
    ///
    /// The caller clamps the result to the end of the run, so a program
    /// with nothing left to do may return [`Cycles::MAX`].
    fn step(&mut self, ctx: &mut NodeContext<'_>) -> Result<Cycles, SimError>;

    fn stats(&self) -> ProgramStats;
}

/// Build the program a node model asks for.
pub fn program_for(model: &ProgramModel) -> Box<dyn Program> {
    match *model {
        ProgramModel::Idle => Box::new(Idle),
        ProgramModel::Beacon { interval, data } => Box::new(Beacon::new(interval, data)),
        ProgramModel::Listener { interval } => Box::new(Listener::new(interval)),
    }
}

/// Sleeps through the run.
#[derive(Debug, Default)]
pub struct Idle;

impl Program for Idle {
    fn kind(&self) -> &'static str {
        "idle"
    }

    fn step(&mut self, _ctx: &mut NodeContext<'_>) -> Result<Cycles, SimError> {
        Ok(Cycles::MAX)
    }

    fn stats(&self) -> ProgramStats {
        ProgramStats::default()
    }
}

/// Transmits the same byte at a fixed interval, starting immediately.
#[derive(Debug)]
pub struct Beacon {
    interval: Cycles,
    data: u8,
    stats: ProgramStats,
}

impl Beacon {
    pub fn new(interval: Cycles, data: u8) -> Self {
        Beacon {
            interval,
            data,
            stats: ProgramStats::default(),
        }
    }
}

impl Program for Beacon {
    fn kind(&self) -> &'static str {
        "beacon"
    }

    fn step(&mut self, ctx: &mut NodeContext<'_>) -> Result<Cycles, SimError> {
        ctx.transmit(self.data)?;
        self.stats.transmitted += 1;
        Ok(self.interval)
    }

    fn stats(&self) -> ProgramStats {
        self.stats
    }
}

/// Samples the channel at a fixed interval and reads a byte whenever the
/// channel is busy.
#[derive(Debug)]
pub struct Listener {
    interval: Cycles,
    stats: ProgramStats,
}

impl Listener {
    pub fn new(interval: Cycles) -> Self {
        Listener {
            interval,
            stats: ProgramStats::default(),
        }
    }
}

impl Program for Listener {
    fn kind(&self) -> &'static str {
        "listener"
    }

    fn step(&mut self, ctx: &mut NodeContext<'_>) -> Result<Cycles, SimError> {
        self.stats.samples += 1;
        if ctx.sample()? == RSSI_BUSY {
            self.stats.busy_samples += 1;
            if let Some(byte) = ctx.read()? {
                self.stats.received += 1;
                self.stats.last_byte = Some(byte);
            }
        }
        Ok(self.interval)
    }

    fn stats(&self) -> ProgramStats {
        self.stats
    }
}
