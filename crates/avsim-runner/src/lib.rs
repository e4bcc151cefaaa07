//! # avsim-runner
//!
//! Runs a simulation model with one OS thread per node.
//!
//! - [`Session`]: owns the synchronizer and radio channel of one run
//! - [`NodeThread`]: a node's clock and [`Program`] on its own thread
//! - [`Watchdog`]: reports rendezvous rounds that stop making progress
//!
//! ```no_run
//! use avsim_runner::{Session, SessionOptions};
//!
//! let model = avsim_model::load_model("demos/beacon_pair.yaml").unwrap();
//! let report = Session::new(model, SessionOptions::default()).unwrap().run().unwrap();
//! println!("{} rounds", report.rounds);
//! ```

pub mod node_thread;
pub mod program;
pub mod session;
pub mod watchdog;

pub use node_thread::{NodeReport, NodeStats, NodeThread, NodeThreadConfig};
pub use program::{program_for, Beacon, Idle, Listener, NodeContext, Program, ProgramStats};
pub use session::{Session, SessionError, SessionOptions, SessionReport, StopHandle};
pub use watchdog::Watchdog;
