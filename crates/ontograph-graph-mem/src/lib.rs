//! In-process property graph for the Ontograph synchronizer.
//!
//! Vertices are keyed by `node_id` and relationships by
//! `(start_node_id, end_node_id, relationship_type)`, so every write is a
//! `MERGE`: replaying it leaves the graph as it was.

mod graph;

pub mod error;

pub use error::{Error, Result};
pub use graph::MemoryGraph;
