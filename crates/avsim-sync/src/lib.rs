//! # avsim-sync
//!
//! Keeps independently running node threads within one period of each other.
//!
//! Each node thread owns a [`MainClock`](avsim_clock::MainClock) and free-runs
//! between rendezvous points. A [`Synchronizer`] arms a periodic timer on
//! every registered clock; when it fires, the node parks at a shared
//! [`Barrier`] until every participant has arrived.
//!
//! - [`Barrier`]: the meet itself, generic over the per-round [`RoundAction`]
//! - [`IntervalSynchronizer`]: periodic meets with clock-rate scaling
//! - [`GlobalQueue`]: an interval synchronizer whose round action advances a
//!   global event queue by one tick
//! - [`SingleSynchronizer`]: a pass-through for one-node simulations

mod barrier;
mod global_queue;
mod interval;
mod single;
mod synchronizer;

pub use barrier::{Arrival, Barrier, BarrierSnapshot, RoundAction};
pub use global_queue::{GlobalEvents, GlobalHandler, GlobalQueue};
pub use interval::IntervalSynchronizer;
pub use single::SingleSynchronizer;
pub use synchronizer::Synchronizer;
