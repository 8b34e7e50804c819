//! Basic-block and branch coverage for bytecode method bodies.
//!
//! At instrumentation time, an [`Instrumenter`] discovers the basic blocks of each method, and inserts one counter
//! increment on every way into every block. At run time, the inserted increments call into a [`Collector`], which
//! counts hits from any number of threads without blocking, and periodically hands a [`Snapshot`] of the counts to a
//! sink.
//!
//! [`Instrumenter`]: ./instrument/struct.Instrumenter.html
//! [`Collector`]: ./collector/struct.Collector.html
//! [`Snapshot`]: ./snapshot/struct.Snapshot.html

#![recursion_limit="128"] // needed for error_chain.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;
#[cfg(feature = "serde_json")]
extern crate serde_json;
#[cfg(feature = "toml")]
extern crate toml;
extern crate arc_swap;
extern crate byteorder;
extern crate petgraph;
extern crate fixedbitset;

pub mod error;
pub mod insn;
pub mod asm;
pub mod offsets;
pub mod block;
pub mod builder;
pub mod resolve;
pub mod insert;
pub mod graph;
pub mod report;
pub mod instrument;
pub mod guard;
pub mod snapshot;
pub mod config;
pub mod collector;

pub use collector::{disable, enable, global, hit, hit_tagged, new_slot, save_results, Collector};
pub use config::Config;
pub use error::{ErrorKind, Result};
pub use graph::BlockGraph;
pub use guard::{clear_expected_caller, set_expected_caller, ReentryGuard};
pub use insert::SlotAllocator;
pub use insn::{Insn, InsnList, Label, Method, Slot};
pub use instrument::{InstrumentOutcome, Instrumenter};
pub use report::MethodCoverage;
pub use snapshot::{ResultSink, Snapshot};
