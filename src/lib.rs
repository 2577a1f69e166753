//! Enumeration of the acyclic derivations ("plans") of a target item in a
//! hypergraph whose edges turn a list of source items into one target item.
//!
//! A [`Search`] prunes and indexes a [`Hypergraph`] once; each call to
//! [`Search::search`] yields a [`SearchInstance`] that produces every plan for
//! one target exactly once, without ever building a cyclic derivation.

pub mod error;
pub mod hypergraph;
pub mod plan;
pub mod reader;
pub mod search;
pub mod visualization;

pub use error::{Error, Result};
pub use hypergraph::{index::GraphIndex, Hyperedge, Hypergraph, Item};
pub use plan::{Plan, PlanError};
pub use search::{Search, SearchConfig, SearchInstance};
