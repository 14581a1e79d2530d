//! SQLite backend for the TSOAM member store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Multi-statement writes run inside
//! `BEGIN IMMEDIATE` transactions, which serialise writers across processes
//! sharing the same file.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
