//! SQLite backend for the Ontograph knowledge store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write passes through a
//! [`StatementInterceptor`](rewrite::StatementInterceptor) before it is
//! prepared; the default one rewrites INSERTs that carry semi-structured
//! values.

mod encode;
mod schema;
mod store;

pub mod error;
pub mod rewrite;

pub use error::{Error, Result};
pub use store::SqliteStore;
