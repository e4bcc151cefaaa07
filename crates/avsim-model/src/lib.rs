//! # avsim-model
//!
//! The YAML simulation model: run parameters plus one entry per node.
//!
//! ```yaml
//! simulation:
//!   sync_period: 6106      # reference cycles between rendezvous
//!   cycles: 737280         # run length in reference cycles
//!   seed: 42
//!   stagger_start: 1000    # extra start delay per node index
//!   random_start: { min: 0, max: 5000 }
//! nodes:
//!   - name: beacon-a
//!     clock_hz: 7372800
//!     position: { x: 0.0, y: 0.0 }
//!     radio: { power: 15 }
//!     program: { type: beacon, interval: 61060, data: 165 }
//! ```

use avsim_common::{ClockRate, Cycles};
use avsim_radio::{Position, RadioSettings, BYTE_PERIOD};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("model has no nodes")]
    NoNodes,

    #[error("duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("sync_period must be non-zero")]
    ZeroPeriod,

    #[error("clock rate of {0} must be non-zero")]
    ZeroClockRate(String),

    #[error("program interval of node {0} must be non-zero")]
    ZeroInterval(String),

    #[error("random_start interval is inverted: min {min} > max {max}")]
    InvertedStartInterval { min: Cycles, max: Cycles },
}

// ============================================================================
// Model types
// ============================================================================

/// A complete simulation description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationModel {
    pub simulation: SimulationSettings,
    pub nodes: Vec<NodeModel>,
}

/// Run-wide parameters. Cycle counts are in reference cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Cycles between rendezvous of all node threads.
    #[serde(default = "default_sync_period")]
    pub sync_period: Cycles,
    /// Clock rate that periods and channel timestamps are expressed in.
    #[serde(default, rename = "reference_hz")]
    pub reference: ClockRate,
    /// Run length.
    pub cycles: Cycles,
    #[serde(default)]
    pub seed: u64,
    /// Start delay added per node index.
    #[serde(default)]
    pub stagger_start: Cycles,
    /// Uniformly random start delay per node.
    #[serde(default)]
    pub random_start: Option<StartInterval>,
}

fn default_sync_period() -> Cycles {
    BYTE_PERIOD
}

/// Inclusive interval of start delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartInterval {
    pub min: Cycles,
    pub max: Cycles,
}

/// One simulated node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeModel {
    pub name: String,
    #[serde(default, rename = "clock_hz")]
    pub clock: ClockRate,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub radio: RadioSettings,
    #[serde(default)]
    pub program: ProgramModel,
}

/// The workload a node runs. Intervals are in the node's local cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgramModel {
    /// Sleeps until the end of the run.
    #[default]
    Idle,
    /// Transmits `data` every `interval` cycles.
    Beacon {
        interval: Cycles,
        #[serde(default)]
        data: u8,
    },
    /// Samples the channel every `interval` cycles.
    Listener { interval: Cycles },
}

impl ProgramModel {
    /// Short name for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ProgramModel::Idle => "idle",
            ProgramModel::Beacon { .. } => "beacon",
            ProgramModel::Listener { .. } => "listener",
        }
    }
}

// ============================================================================
// Loading and validation
// ============================================================================

/// Read and validate a model file.
pub fn load_model(path: impl AsRef<Path>) -> Result<SimulationModel, ModelError> {
    let text = std::fs::read_to_string(path)?;
    parse_model(&text)
}

/// Parse and validate a model from YAML text.
pub fn parse_model(yaml: &str) -> Result<SimulationModel, ModelError> {
    let model: SimulationModel = serde_yaml::from_str(yaml)?;
    model.validate()?;
    Ok(model)
}

impl SimulationModel {
    pub fn validate(&self) -> Result<(), ModelError> {
        let sim = &self.simulation;
        if self.nodes.is_empty() {
            return Err(ModelError::NoNodes);
        }
        if sim.sync_period == 0 {
            return Err(ModelError::ZeroPeriod);
        }
        if sim.reference.hz() == 0 {
            return Err(ModelError::ZeroClockRate("the reference clock".to_string()));
        }
        if let Some(StartInterval { min, max }) = sim.random_start {
            if min > max {
                return Err(ModelError::InvertedStartInterval { min, max });
            }
        }

        let mut names = HashSet::new();
        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(ModelError::DuplicateNode(node.name.clone()));
            }
            if node.clock.hz() == 0 {
                return Err(ModelError::ZeroClockRate(format!("node {}", node.name)));
            }
            match node.program {
                ProgramModel::Beacon { interval: 0, .. } | ProgramModel::Listener { interval: 0 } => {
                    return Err(ModelError::ZeroInterval(node.name.clone()));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Start delay of every node in reference cycles, in node order.
    ///
    /// Node `i` waits `i * stagger_start` plus, if configured, a uniform
    /// draw from `random_start` seeded by the model seed.
    pub fn start_delays(&self) -> Vec<Cycles> {
        let sim = &self.simulation;
        let mut rng = ChaCha8Rng::seed_from_u64(sim.seed);
        (0..self.nodes.len() as u64)
            .map(|i| {
                let random = match sim.random_start {
                    Some(StartInterval { min, max }) => rng.gen_range(min..=max),
                    None => 0,
                };
                i * sim.stagger_start + random
            })
            .collect()
    }

    /// Node names in model order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }
}
