use avsim_common::{NodeId, SimError, SyncError};
use thiserror::Error;

/// Errors raised by the radio channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RadioError {
    /// Waiting for neighbors failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The node has no radio attached to this air.
    #[error("{node} has no radio on this channel")]
    UnknownRadio {
        node: NodeId,
    },
}

impl From<RadioError> for SimError {
    fn from(err: RadioError) -> Self {
        match err {
            RadioError::Sync(err) => SimError::Sync(err),
            RadioError::UnknownRadio { node } => SimError::Program {
                node,
                message: "radio is not attached to the channel".to_string(),
            },
        }
    }
}
