//! # avsim-common
//!
//! Types shared by every AVSim crate: node identity, cycle counts, clock
//! rates and the error taxonomy used across the clock, synchronization and
//! radio layers.

mod error;

pub use error::{InterruptCause, SimError, SyncError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A count of clock cycles (ticks of a node's local clock).
pub type Cycles = u64;

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;

// ============================================================================
// Node Identity
// ============================================================================

/// Identifier of a simulated node (and of the thread that drives it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new node ID.
    pub const fn new(id: u32) -> Self {
        NodeId(id)
    }

    /// The raw numeric ID.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

// ============================================================================
// Clock Rate
// ============================================================================

/// The frequency of a node's main clock.
///
/// Periods configured in reference cycles are scaled into each node's local
/// cycles with [`ClockRate::scale`], so nodes running at different
/// frequencies still meet at the same points in simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClockRate {
    hz: u64,
}

impl ClockRate {
    /// Clock rate of the Mica2 ATmega128 (7.3728 MHz).
    pub const MICA2: ClockRate = ClockRate { hz: 7_372_800 };

    /// Create a clock rate. Returns `None` for a zero frequency.
    pub const fn new(hz: u64) -> Option<Self> {
        if hz == 0 {
            None
        } else {
            Some(ClockRate { hz })
        }
    }

    /// The frequency in hertz.
    pub const fn hz(self) -> u64 {
        self.hz
    }

    /// Convert `cycles` at this rate into cycles at rate `to`, rounding down.
    pub fn scale(self, cycles: Cycles, to: ClockRate) -> Cycles {
        if self.hz == to.hz {
            return cycles;
        }
        ((cycles as u128 * to.hz as u128) / self.hz as u128) as Cycles
    }

    /// Convert milliseconds into cycles at this rate.
    pub fn millis_to_cycles(self, millis: f64) -> Cycles {
        (millis * self.hz as f64 / 1000.0) as Cycles
    }

    /// Convert cycles at this rate into milliseconds.
    pub fn cycles_to_millis(self, cycles: Cycles) -> f64 {
        cycles as f64 * 1000.0 / self.hz as f64
    }
}

impl Default for ClockRate {
    fn default() -> Self {
        ClockRate::MICA2
    }
}

impl fmt::Display for ClockRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.hz)
    }
}
