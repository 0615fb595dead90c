//! OBT Chain Compiler Library
//!
//! Compiles the three-part On/By/To attribute micro-syntax into executable
//! chains of bound instructions and runs them when a node-level event fires.
//!
//! # Architecture
//!
//! This library is a stateless compiler plus interpreter:
//! - Splits raw attribute text into On/By/To groups
//! - Parses event names, instruction calls, target queries and updates
//! - Resolves instruction names against caller-supplied tables at bind time
//! - Links cells sharing one two-region data stack per chain
//! - Runs chains synchronously until an instruction suspends, then hands the
//!   remainder back to the host as a future
//!
//! The library does NOT:
//! - Own a node tree or an event loop
//! - Ship a DOM or math instruction library
//! - Execute chains concurrently
//!
//! Nodes, selectors and event delivery are reached through the
//! [`NodeFinder`] and [`EventHub`] traits.
//!
//! # Example Usage
//!
//! ```no_run
//! use obt_core::{control, BuilderConfig, Builder, ChainStore, ObtAttrs, Pbs};
//! use obt_core::{EventHub, NodeFinder, NodeId};
//! use std::rc::Rc;
//!
//! fn setup(finder: Rc<dyn NodeFinder>, hub: &dyn EventHub) -> obt_core::Result<()> {
//!     let mut pbs = Pbs::new();
//!     pbs.on.merge(&control::table())?;
//!
//!     let builder = Builder::new(pbs, finder, BuilderConfig::new());
//!     let mut store = ChainStore::new();
//!
//!     let attrs = ObtAttrs::new("click|push(1) push(2)");
//!     let summary = builder.build(NodeId(1), &attrs, hub, &mut store)?;
//!     println!("{} listeners bound", summary.bound);
//!     Ok(())
//! }
//! ```

// Public modules
pub mod binder;
pub mod builder;
pub mod chain;
pub mod config;
pub mod control;
pub mod evo;
pub mod host;
pub mod parser;
pub mod pbs;
pub mod spliter;
pub mod stack;
pub mod types;

// Re-export main types for convenience
pub use binder::{bind, bind_stored, BindCount, ChainStore, RebindOptions};
pub use builder::{BuildSummary, Builder, GroupError, ObtAttrs};
pub use chain::{Chain, Continuation, Fired, Outcome};
pub use config::BuilderConfig;
pub use evo::{Event, Evo};
pub use host::{DiagnosticSink, EventHub, LogSink, NodeFinder};
pub use parser::{Call, Evn, Query, QueryFilter, ToParts, Update};
pub use pbs::{Extent, Instruction, InstructionTable, Pbs, Rejection, Ret};
pub use stack::Stack;
pub use types::{NodeId, ObtError, Phase, Result, Timestamp, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: the control set resolves through a table
        let mut pbs = Pbs::new();
        pbs.by.merge(&control::table()).unwrap();
        assert!(pbs.resolve(Phase::By, "push").is_ok());
        assert!(pbs.resolve(Phase::On, "push").is_err());
    }
}
