//! Error types shared across the simulator.

use crate::NodeId;
use std::fmt;
use thiserror::Error;

/// Why a blocked participant was woken without its wait completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptCause {
    /// The host stopped the synchronizer (shutdown, Ctrl-C, fatal error elsewhere).
    Stopped,
    /// The shared round action failed on another participant's thread.
    Aborted {
        /// Description of the failure.
        reason: String,
    },
}

impl fmt::Display for InterruptCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptCause::Stopped => write!(f, "synchronizer stopped"),
            InterruptCause::Aborted { reason } => write!(f, "round aborted: {}", reason),
        }
    }
}

/// Synchronization faults.
///
/// These are fatal to a simulation run: a barrier that loses a participant or
/// heals the wrong way desynchronizes node clocks, so they are reported and
/// never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// A blocked wait was interrupted.
    #[error("wait of {participant} was interrupted: {cause}")]
    Interrupted {
        /// The participant whose wait was interrupted.
        participant: NodeId,
        /// Why the wait ended.
        cause: InterruptCause,
    },

    /// The caller is not registered with the synchronizer.
    #[error("{participant} is not registered with the synchronizer")]
    UnknownParticipant {
        /// The unregistered caller.
        participant: NodeId,
    },

    /// The synchronizer does not support the requested number of participants.
    #[error("participant count mismatch: expected at most {expected}, found {found}")]
    ParticipantMismatch {
        /// Supported number of participants.
        expected: usize,
        /// Number of participants requested.
        found: usize,
    },

    /// The shared action of a round failed.
    #[error("action of round {round} failed: {reason}")]
    ActionFailed {
        /// The round whose action failed.
        round: u64,
        /// Description of the failure.
        reason: String,
    },
}

/// Errors raised while simulating nodes.
#[derive(Debug, Error)]
pub enum SimError {
    /// Synchronization fault (fatal to the run).
    #[error("synchronization fault: {0}")]
    Sync(#[from] SyncError),

    /// A node's program failed.
    #[error("program error on {node}: {message}")]
    Program {
        /// The node whose program failed.
        node: NodeId,
        /// Description of the failure.
        message: String,
    },

    /// Invalid runtime configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SimError {
    /// Returns true if this error is a synchronization fault.
    pub fn is_sync_fault(&self) -> bool {
        matches!(self, SimError::Sync(_))
    }
}
