//! Core types and trait definitions for the Ontograph knowledge graph engine.
//!
//! This crate is deliberately free of database, graph-store and HTTP
//! dependencies. Backends implement [`store::KnowledgeStore`] and
//! [`store::GraphStore`]; the engine drives them through those traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod codec;
pub mod document;
pub mod error;
pub mod external;
pub mod graph;
pub mod ontology;
pub mod project;
pub mod schema;
pub mod store;
pub mod validate;
pub mod version;

pub use error::{Error, Result};
