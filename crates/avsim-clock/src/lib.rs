//! # avsim-clock
//!
//! Per-node timekeeping for AVSim.
//!
//! - [`DeltaQueue`]: the delta-encoded event timeline shared by node clocks
//!   and the global synchronization queue
//! - [`MainClock`]: a node's cycle counter with registered event handlers
//! - [`EventId`] / [`EventTable`]: generational handles for registered events

mod delta_queue;
mod event;
mod main_clock;

pub use delta_queue::{DeltaQueue, Footprint, Pending};
pub use event::{EventId, EventTable};
pub use main_clock::{EventHandler, MainClock};
