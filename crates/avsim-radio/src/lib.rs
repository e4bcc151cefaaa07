//! # avsim-radio
//!
//! The shared radio channel. Transmissions are timestamped in reference
//! cycles; every channel access first waits on the run's
//! [`Synchronizer`](avsim_sync::Synchronizer) so that all neighbors have
//! written everything they will write before the sampled instant.
//!
//! - [`propagation`]: free-space power formulas and [`Position`]
//! - [`LocalAir`]: one radio's neighbors and audible transmissions
//! - [`RadioAir`] / [`FreeSpaceAir`]: the channel shared by all radios

mod error;
mod free_space;
mod local_air;
pub mod propagation;

pub use error::RadioError;
pub use free_space::{FreeSpaceAir, RadioAir, RadioSettings};
pub use local_air::{
    LocalAir, Neighbor, Transmission, BIT_PERIOD, BYTE_PERIOD, HALF_BIT_PERIOD, RSSI_BUSY,
    RSSI_IDLE, SAMPLE_WINDOW,
};
pub use propagation::Position;
